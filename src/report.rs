//! 描画面向けのビュー構築
//!
//! チャートライブラリが受け取る形（ラベル列 + メンバーごとのデータセット）と、
//! 端末表示用のテキスト表を作る。描画そのものは行わない。

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;
use std::fmt::Write as _;

use crate::config::DashboardConfig;
use crate::dashboard::{ChartData, SyncStatus};
use crate::models::{Metric, SummaryRecord};

/// 1メンバー分のデータセット
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    pub label: String,
    pub border_color: String,
    /// 線色に透過度 `20` を付けた塗り色
    pub background_color: String,
    /// `null` は欠損（ゼロではない）
    pub data: Vec<Option<u64>>,
    pub span_gaps: bool,
}

/// 1指標分のチャート
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartView {
    pub metric: Metric,
    pub title: String,
    pub video_name: String,
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

fn display_offset(utc_offset_hours: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_hours.clamp(-23, 23) * 3600).unwrap_or_else(|| Utc.fix())
}

/// 軸ラベル（`MM-DD HH:MM`）
pub fn format_axis_label(ts: DateTime<Utc>, utc_offset_hours: i32) -> String {
    ts.with_timezone(&display_offset(utc_offset_hours))
        .format("%m-%d %H:%M")
        .to_string()
}

/// 3桁区切り
pub fn format_number(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// 指標ごとのチャートビューを構築
pub fn chart_views(
    chart: &ChartData,
    config: &DashboardConfig,
    utc_offset_hours: i32,
) -> Vec<ChartView> {
    let video_name = config.display_name(&chart.source).to_string();

    chart
        .series
        .iter()
        .map(|metric_series| ChartView {
            metric: metric_series.metric,
            title: metric_series.metric.title().to_string(),
            video_name: video_name.clone(),
            labels: metric_series
                .axis
                .iter()
                .map(|ts| format_axis_label(*ts, utc_offset_hours))
                .collect(),
            datasets: metric_series
                .series
                .iter()
                .map(|s| {
                    let color = config.color_for(&s.member);
                    ChartDataset {
                        label: s.member.clone(),
                        border_color: color.to_string(),
                        background_color: format!("{color}20"),
                        data: s.values.clone(),
                        span_gaps: true,
                    }
                })
                .collect(),
        })
        .collect()
}

/// サマリー表の表示行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub video_name: String,
    pub member: String,
    pub views: String,
    pub likes: String,
    pub like_ratio: String,
    pub is_top: bool,
    /// 次の行と動画キーが異なる（グループ区切り）
    pub group_end: bool,
}

/// ランキング済みのサマリー行を表示行に変換（入力順を保持）
pub fn summary_rows(records: &[SummaryRecord], config: &DashboardConfig) -> Vec<SummaryRow> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| SummaryRow {
            video_name: config.display_name(&r.video_key).to_string(),
            member: r.member.clone(),
            views: format_number(r.view_count),
            likes: format_number(r.like_count),
            like_ratio: r.like_ratio.clone(),
            is_top: r.is_top,
            group_end: records
                .get(i + 1)
                .is_some_and(|next| next.video_key != r.video_key),
        })
        .collect()
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{text}{}", " ".repeat(width.saturating_sub(len)))
}

/// 端末用のサマリー表
pub fn render_summary_table(rows: &[SummaryRow]) -> String {
    const HEADERS: [&str; 5] = ["Video", "Member", "Views", "Likes", "Like %"];

    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|r| {
            [
                r.video_name.clone(),
                if r.is_top {
                    format!("{} ♛", r.member)
                } else {
                    r.member.clone()
                },
                r.views.clone(),
                r.likes.clone(),
                r.like_ratio.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let line = |cols: &[String]| {
        cols.iter()
            .zip(widths)
            .map(|(c, w)| pad(c, w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let _ = writeln!(out, "{}", line(&HEADERS.map(String::from)));
    for (row, display) in cells.iter().zip(rows) {
        let _ = writeln!(out, "{}", line(row));
        if display.group_end {
            let _ = writeln!(out, "{}", "-".repeat(widths.iter().sum::<usize>() + 8));
        }
    }
    out
}

/// 端末用：各メンバーの最新値
pub fn render_chart_summary(views: &[ChartView]) -> String {
    let mut out = String::new();
    for view in views {
        let _ = writeln!(out, "{} ({})", view.title, view.video_name);
        if view.datasets.is_empty() {
            let _ = writeln!(out, "  (no data)");
            continue;
        }
        for dataset in &view.datasets {
            // 欠損をまたいで最後に観測された値
            let latest = dataset
                .data
                .iter()
                .enumerate()
                .rev()
                .find_map(|(i, v)| v.map(|v| (i, v)));
            let observed = dataset.data.iter().filter(|v| v.is_some()).count();
            match latest {
                Some((i, value)) => {
                    let _ = writeln!(
                        out,
                        "  {}  {}  @ {}  ({} points)",
                        pad(&dataset.label, 12),
                        format_number(value),
                        view.labels.get(i).map(String::as_str).unwrap_or("-"),
                        observed
                    );
                }
                None => {
                    let _ = writeln!(out, "  {}  -", pad(&dataset.label, 12));
                }
            }
        }
    }
    out
}

/// ステータス行（最新データ時刻付き）
pub fn status_line(
    status: &SyncStatus,
    latest: Option<DateTime<Utc>>,
    utc_offset_hours: i32,
) -> String {
    match latest {
        Some(ts) => format!(
            "{status} | Latest data: {}",
            format_axis_label(ts, utc_offset_hours)
        ),
        None => status.to_string(),
    }
}
