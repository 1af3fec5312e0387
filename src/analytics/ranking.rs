//! 動画ごとのランキング集計
//!
//! サマリー行を動画キーでグループ化し、再生回数の降順で安定ソートして
//! 各グループ先頭を `is_top` とする。同数の場合は入力順で先にある行が勝つ。

use serde::Serialize;
use std::collections::HashMap;

use crate::models::SummaryRecord;

/// 1つの動画キーに属するランキング済みの行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedGroup {
    pub video_key: String,
    /// 再生回数の降順（先頭が is_top）
    pub rows: Vec<SummaryRecord>,
}

impl RankedGroup {
    pub fn top(&self) -> Option<&SummaryRecord> {
        self.rows.first()
    }
}

/// 動画キーでグループ化してランキング
///
/// グループの並びは各キーが最初に現れた順。
pub fn rank_groups(records: &[SummaryRecord]) -> Vec<RankedGroup> {
    let mut groups: Vec<RankedGroup> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let index = *positions.entry(record.video_key.as_str()).or_insert_with(|| {
            groups.push(RankedGroup {
                video_key: record.video_key.clone(),
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[index].rows.push(SummaryRecord {
            is_top: false,
            ..record.clone()
        });
    }

    for group in &mut groups {
        // sort_by は安定ソート
        group.rows.sort_by(|a, b| b.view_count.cmp(&a.view_count));
        if let Some(first) = group.rows.first_mut() {
            first.is_top = true;
        }
    }

    groups
}

/// 入力順のまま `is_top` を付与した行を返す（表の表示順）
pub fn rank_summary(records: &[SummaryRecord]) -> Vec<SummaryRecord> {
    let mut top_index: HashMap<&str, usize> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        top_index
            .entry(record.video_key.as_str())
            .and_modify(|best| {
                // 厳密に大きい場合のみ置き換え（同数は先勝ち）
                if record.view_count > records[*best].view_count {
                    *best = i;
                }
            })
            .or_insert(i);
    }

    records
        .iter()
        .enumerate()
        .map(|(i, record)| SummaryRecord {
            is_top: top_index.get(record.video_key.as_str()) == Some(&i),
            ..record.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(member: &str, video_key: &str, views: u64) -> SummaryRecord {
        SummaryRecord {
            member: member.to_string(),
            video_key: video_key.to_string(),
            view_count: views,
            like_count: views / 10,
            like_ratio: "10%".to_string(),
            is_top: false,
        }
    }

    #[test]
    fn test_higher_view_count_is_top() {
        let ranked = rank_summary(&[row("A", "V1", 500), row("B", "V1", 900)]);
        assert!(!ranked[0].is_top);
        assert!(ranked[1].is_top);
        assert_eq!(ranked[1].view_count, 900);
    }

    #[test]
    fn test_groups_follow_first_appearance() {
        let records = vec![
            row("A", "V2", 1),
            row("B", "V1", 5),
            row("C", "V2", 3),
            row("D", "V3", 0),
        ];
        let groups = rank_groups(&records);
        let keys: Vec<_> = groups.iter().map(|g| g.video_key.as_str()).collect();
        assert_eq!(keys, vec!["V2", "V1", "V3"]);
        assert_eq!(groups[0].top().map(|r| r.member.as_str()), Some("C"));
        assert_eq!(groups[0].rows[1].member, "A");
    }

    #[test]
    fn test_ties_keep_input_order() {
        let records = vec![row("A", "V1", 700), row("B", "V1", 700), row("C", "V1", 100)];
        let groups = rank_groups(&records);
        assert_eq!(groups[0].rows[0].member, "A");
        assert!(groups[0].rows[0].is_top);
        assert!(!groups[0].rows[1].is_top);

        let flat = rank_summary(&records);
        assert_eq!(flat.iter().filter(|r| r.is_top).count(), 1);
        assert!(flat[0].is_top);
    }

    #[test]
    fn test_exactly_one_top_with_max_views_per_group() {
        let records: Vec<SummaryRecord> = (0..30u64)
            .map(|i| row(&format!("m{i}"), &format!("V{}", i % 4), (i * 37) % 11))
            .collect();

        for group in rank_groups(&records) {
            let tops: Vec<_> = group.rows.iter().filter(|r| r.is_top).collect();
            assert_eq!(tops.len(), 1);
            assert!(group.rows.iter().all(|r| tops[0].view_count >= r.view_count));
        }

        let flat = rank_summary(&records);
        for key in ["V0", "V1", "V2", "V3"] {
            let group: Vec<_> = flat.iter().filter(|r| r.video_key == key).collect();
            let tops: Vec<_> = group.iter().filter(|r| r.is_top).collect();
            assert_eq!(tops.len(), 1);
            assert!(group.iter().all(|r| tops[0].view_count >= r.view_count));
        }
    }

    #[test]
    fn test_flat_and_grouped_agree() {
        let records = vec![row("A", "V1", 3), row("B", "V2", 8), row("C", "V1", 9)];
        let flat = rank_summary(&records);
        for group in rank_groups(&records) {
            let top = group.top().unwrap();
            assert!(flat
                .iter()
                .any(|r| r.is_top && r.member == top.member && r.video_key == group.video_key));
        }
    }

    #[test]
    fn test_incoming_is_top_is_ignored() {
        let mut stale = row("A", "V1", 1);
        stale.is_top = true;
        let ranked = rank_summary(&[stale, row("B", "V1", 2)]);
        assert!(!ranked[0].is_top);
        assert!(ranked[1].is_top);
    }

    #[test]
    fn test_empty_input() {
        assert!(rank_groups(&[]).is_empty());
        assert!(rank_summary(&[]).is_empty());
    }
}
