//! エンゲージメント指標のデータモデル
//!
//! シートから取り込んだ時系列レコード、時間窓、選択メンバー、
//! サマリー行など、パイプライン全体で共有する値型を定義します。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// 1行分のエンゲージメント記録（パース後は不変）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// メンバー識別子
    pub member: String,
    /// 動画ID
    pub video_id: String,
    /// 更新時刻
    pub updated_at: DateTime<Utc>,
    /// 再生回数
    pub view_count: u64,
    /// 高評価数
    pub like_count: u64,
    /// コメント数
    pub comment_count: u64,
}

impl MetricRecord {
    /// 指定メトリクスの値を取得
    pub fn value(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Views => self.view_count,
            Metric::Likes => self.like_count,
            Metric::Comments => self.comment_count,
        }
    }
}

/// updated_at 昇順に並んだレコード列
///
/// 同期ループが所有し、変更のあるフェッチごとに丸ごと差し替える。
pub type Dataset = Arc<[MetricRecord]>;

/// レコード列を安定ソートして Dataset に変換
///
/// 同一時刻のレコードは入力順を保つ。
pub fn into_dataset(mut records: Vec<MetricRecord>) -> Dataset {
    records.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
    Arc::from(records)
}

/// グラフ化する指標の種類
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[display("views")]
    Views,
    #[display("likes")]
    Likes,
    #[display("comments")]
    Comments,
}

impl Metric {
    /// 全指標（チャート表示順）
    pub const ALL: [Metric; 3] = [Metric::Views, Metric::Likes, Metric::Comments];

    /// チャートのタイトル
    pub fn title(&self) -> &'static str {
        match self {
            Metric::Views => "View Count",
            Metric::Likes => "Like Count",
            Metric::Comments => "Comment Count",
        }
    }
}

/// 相対的な時間窓
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
pub enum TimeWindow {
    #[serde(rename = "6h")]
    #[display("6h")]
    SixHours,
    #[serde(rename = "12h")]
    #[display("12h")]
    TwelveHours,
    #[serde(rename = "1d", alias = "24h")]
    #[display("1d")]
    OneDay,
    #[serde(rename = "3d")]
    #[display("3d")]
    ThreeDays,
    #[default]
    #[serde(rename = "7d")]
    #[display("7d")]
    SevenDays,
    #[serde(rename = "all")]
    #[display("all")]
    All,
}

impl TimeWindow {
    /// 全ての選択肢（狭い順）
    pub const ALL: [TimeWindow; 6] = [
        TimeWindow::SixHours,
        TimeWindow::TwelveHours,
        TimeWindow::OneDay,
        TimeWindow::ThreeDays,
        TimeWindow::SevenDays,
        TimeWindow::All,
    ];

    /// 窓の長さ（`All` はカットオフなし）
    pub fn duration(&self) -> Option<Duration> {
        match self {
            TimeWindow::SixHours => Some(Duration::hours(6)),
            TimeWindow::TwelveHours => Some(Duration::hours(12)),
            TimeWindow::OneDay => Some(Duration::days(1)),
            TimeWindow::ThreeDays => Some(Duration::days(3)),
            TimeWindow::SevenDays => Some(Duration::days(7)),
            TimeWindow::All => None,
        }
    }

    /// `now` 基準のカットオフ時刻
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|d| now - d)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown time window '{0}' (expected one of 6h, 12h, 1d, 3d, 7d, all)")]
pub struct ParseTimeWindowError(pub String);

impl FromStr for TimeWindow {
    type Err = ParseTimeWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "6h" => Ok(TimeWindow::SixHours),
            "12h" => Ok(TimeWindow::TwelveHours),
            "1d" | "24h" => Ok(TimeWindow::OneDay),
            "3d" => Ok(TimeWindow::ThreeDays),
            "7d" => Ok(TimeWindow::SevenDays),
            "all" => Ok(TimeWindow::All),
            other => Err(ParseTimeWindowError(other.to_string())),
        }
    }
}

/// ユーザーが選択したメンバー集合（挿入順を保持）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectedEntities(Vec<String>);

impl SelectedEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.0.iter().any(|m| m == member)
    }

    /// 追加（既に含まれていれば false）
    pub fn insert(&mut self, member: impl Into<String>) -> bool {
        let member = member.into();
        if self.contains(&member) {
            return false;
        }
        self.0.push(member);
        true
    }

    pub fn remove(&mut self, member: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|m| m != member);
        self.0.len() != before
    }

    /// 選択状態を反転し、反転後に選択されていれば true を返す
    pub fn toggle(&mut self, member: &str) -> bool {
        if self.remove(member) {
            false
        } else {
            self.0.push(member.to_string());
            true
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for SelectedEntities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut selected = SelectedEntities::new();
        for member in iter {
            selected.insert(member);
        }
        selected
    }
}

/// 時間軸上の1点（`value` が None なら欠損）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<u64>,
}

/// サマリー表の1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub member: String,
    pub video_key: String,
    pub view_count: u64,
    pub like_count: u64,
    /// シート上の表記をそのまま保持（例: "3.2%"）
    pub like_ratio: String,
    /// ランキング集計で付与される
    #[serde(default)]
    pub is_top: bool,
}
