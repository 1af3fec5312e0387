//! 時間窓とメンバー選択によるフィルタリング

use chrono::{DateTime, Utc};

use crate::models::{MetricRecord, SelectedEntities, TimeWindow};

/// 時間窓内かどうか（`All` は常に true）
pub fn within_window(record: &MetricRecord, window: TimeWindow, now: DateTime<Utc>) -> bool {
    match window.cutoff(now) {
        Some(cutoff) => record.updated_at >= cutoff,
        None => true,
    }
}

/// Dataset を時間窓と選択メンバーで絞り込む
///
/// 元の Dataset は変更せず、順序を保った参照列を返す。
/// 選択が空なら結果も空（描画対象なし）。
pub fn filter_records<'a>(
    dataset: &'a [MetricRecord],
    window: TimeWindow,
    selected: &SelectedEntities,
    now: DateTime<Utc>,
) -> Vec<&'a MetricRecord> {
    if selected.is_empty() {
        return Vec::new();
    }

    let filtered: Vec<&MetricRecord> = dataset
        .iter()
        .filter(|record| within_window(record, window, now))
        .filter(|record| selected.contains(&record.member))
        .collect();

    tracing::debug!(
        window = %window,
        cutoff = ?window.cutoff(now),
        total = dataset.len(),
        filtered = filtered.len(),
        "🔍 Records filtered"
    );

    filtered
}
