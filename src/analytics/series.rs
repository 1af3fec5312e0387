//! Series builder.
//!
//! Reshapes filtered records into per-member series aligned to a shared time
//! axis. Slots are matched on the exact timestamp; a member with no record at
//! an axis point gets `None` there, never zero, so charts can span the gap.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::models::{Metric, MetricRecord, SelectedEntities, SeriesPoint};

/// One member's values aligned to the time axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSeries {
    pub member: String,
    pub values: Vec<Option<u64>>,
}

impl MemberSeries {
    /// Pair each value with its axis timestamp
    pub fn points(&self, axis: &[DateTime<Utc>]) -> Vec<SeriesPoint> {
        axis.iter()
            .zip(&self.values)
            .map(|(timestamp, value)| SeriesPoint {
                timestamp: *timestamp,
                value: *value,
            })
            .collect()
    }
}

/// All members' series for a single metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSeries {
    pub metric: Metric,
    pub axis: Vec<DateTime<Utc>>,
    pub series: Vec<MemberSeries>,
}

/// Sorted, de-duplicated timestamps across the records
pub fn time_axis(records: &[&MetricRecord]) -> Vec<DateTime<Utc>> {
    records
        .iter()
        .map(|r| r.updated_at)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Selected members (in selection order) that have at least one record
pub fn present_members(selected: &SelectedEntities, records: &[&MetricRecord]) -> Vec<String> {
    selected
        .iter()
        .filter(|member| records.iter().any(|r| r.member == *member))
        .map(str::to_string)
        .collect()
}

/// Lookup of the first record for each (member, timestamp) pair.
///
/// Records arrive in sorted Dataset order, so "first" is deterministic.
struct SlotIndex<'a> {
    slots: HashMap<(&'a str, DateTime<Utc>), &'a MetricRecord>,
}

impl<'a> SlotIndex<'a> {
    fn new(records: &[&'a MetricRecord]) -> Self {
        let mut slots = HashMap::with_capacity(records.len());
        for record in records {
            slots
                .entry((record.member.as_str(), record.updated_at))
                .or_insert(*record);
        }
        Self { slots }
    }

    fn get(&self, member: &str, timestamp: DateTime<Utc>) -> Option<&'a MetricRecord> {
        self.slots.get(&(member, timestamp)).copied()
    }
}

fn build_with_index(
    index: &SlotIndex<'_>,
    axis: &[DateTime<Utc>],
    members: &[String],
    metric: Metric,
) -> MetricSeries {
    let series = members
        .iter()
        .map(|member| MemberSeries {
            member: member.clone(),
            values: axis
                .iter()
                .map(|ts| index.get(member, *ts).map(|r| r.value(metric)))
                .collect(),
        })
        .collect();

    MetricSeries {
        metric,
        axis: axis.to_vec(),
        series,
    }
}

/// Build the aligned series for one metric
pub fn build_series(records: &[&MetricRecord], members: &[String], metric: Metric) -> MetricSeries {
    let axis = time_axis(records);
    let index = SlotIndex::new(records);
    build_with_index(&index, &axis, members, metric)
}

/// Build series for every metric over the same axis
pub fn build_all_series(records: &[&MetricRecord], members: &[String]) -> Vec<MetricSeries> {
    let axis = time_axis(records);
    let index = SlotIndex::new(records);
    Metric::ALL
        .iter()
        .map(|metric| build_with_index(&index, &axis, members, *metric))
        .collect()
}
