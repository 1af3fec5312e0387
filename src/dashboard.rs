//! Dashboard application state.
//!
//! All mutable state (the Dataset, filter selections, current source, sync
//! status and summary rows) lives in one [`DashboardState`] that is shared by
//! the sync loop and user actions through accessor methods. Locks are never
//! held across `.await`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::analytics::{build_all_series, filter_records, present_members, MetricSeries};
use crate::api::FailureKind;
use crate::config::DashboardConfig;
use crate::models::{Dataset, MetricRecord, SelectedEntities, SummaryRecord, TimeWindow};

/// 同期状態（ステータス表示用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced {
        records: usize,
        changed: bool,
        at: DateTime<Utc>,
    },
    Failed {
        #[serde(serialize_with = "serialize_kind")]
        kind: FailureKind,
        message: String,
    },
}

fn serialize_kind<S: serde::Serializer>(kind: &FailureKind, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(kind)
}

impl SyncStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, SyncStatus::Failed { .. })
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "Idle"),
            SyncStatus::Syncing => write!(f, "Syncing..."),
            SyncStatus::Synced { records, .. } => write!(f, "✓ Synced ({records} records)"),
            SyncStatus::Failed { kind, message } => match kind {
                FailureKind::NotConfigured => write!(f, "⚠ Not configured: {message}"),
                FailureKind::Transport => write!(f, "⚠ Connection error: {message}"),
                FailureKind::EmptyOrInvalidPayload => write!(f, "⚠ No data: {message}"),
            },
        }
    }
}

/// Dataset 差し替えの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Changed,
    Unchanged,
    /// より新しいフェッチが発行済みのため破棄
    Stale,
}

/// 件数または内容が異なれば変更あり
pub fn dataset_changed(current: &[MetricRecord], incoming: &[MetricRecord]) -> bool {
    current.len() != incoming.len() || current != incoming
}

/// チャート描画用の派生データ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartData {
    pub source: String,
    pub window: TimeWindow,
    pub members: Vec<String>,
    /// 指標ごと（views, likes, comments）
    pub series: Vec<MetricSeries>,
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug)]
struct Inner {
    dataset: Dataset,
    current_source: String,
    time_window: TimeWindow,
    selected: SelectedEntities,
    status: SyncStatus,
    summary: Vec<SummaryRecord>,
    /// 現在の Dataset を生成した取得本文
    payload: Option<String>,
}

/// 共有アプリケーション状態
#[derive(Debug, Clone)]
pub struct DashboardState {
    inner: Arc<RwLock<Inner>>,
    /// 最後に発行したフェッチのシーケンス番号
    issued: Arc<AtomicU64>,
}

impl DashboardState {
    /// 設定の既定値で初期化（選択状態は永続化しない）
    pub fn new(config: &DashboardConfig) -> Self {
        let defaults = &config.default_settings;
        Self {
            inner: Arc::new(RwLock::new(Inner {
                dataset: Arc::from(Vec::new()),
                current_source: defaults.current_source.clone(),
                time_window: defaults.current_time_range,
                selected: config.default_selection(),
                status: SyncStatus::Idle,
                summary: Vec::new(),
                payload: None,
            })),
            issued: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn dataset(&self) -> Dataset {
        Arc::clone(&self.inner.read().dataset)
    }

    pub fn current_source(&self) -> String {
        self.inner.read().current_source.clone()
    }

    /// ソースを切り替え、変化があれば true
    ///
    /// 切替前に発行済みのフェッチはシーケンス番号を進めて無効化する。
    pub fn set_current_source(&self, source: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.current_source == source {
            return false;
        }
        inner.current_source = source.to_string();
        self.issued.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub fn time_window(&self) -> TimeWindow {
        self.inner.read().time_window
    }

    pub fn set_time_window(&self, window: TimeWindow) {
        self.inner.write().time_window = window;
    }

    pub fn selected(&self) -> SelectedEntities {
        self.inner.read().selected.clone()
    }

    pub fn set_selected(&self, selected: SelectedEntities) {
        self.inner.write().selected = selected;
    }

    /// メンバーの選択を反転し、反転後に選択中なら true
    pub fn toggle_member(&self, member: &str) -> bool {
        self.inner.write().selected.toggle(member)
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.read().status.clone()
    }

    pub fn set_status(&self, status: SyncStatus) {
        self.inner.write().status = status;
    }

    pub fn summary(&self) -> Vec<SummaryRecord> {
        self.inner.read().summary.clone()
    }

    pub fn set_summary(&self, rows: Vec<SummaryRecord>) {
        self.inner.write().summary = rows;
    }

    /// 新しいフェッチのシーケンス番号を発行
    pub fn begin_fetch(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, seq: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == seq
    }

    /// 最新のフェッチ結果であれば Dataset を差し替える
    pub fn apply_dataset(&self, seq: u64, incoming: Dataset) -> ApplyOutcome {
        self.apply(seq, None, incoming)
    }

    /// 取得本文付きで Dataset を差し替える
    ///
    /// 本文が前回と同一なら解析結果に関わらず `Unchanged`。解析不能な時刻は
    /// 毎回「現在時刻」になるため、レコード比較だけでは変化ありと誤判定する。
    pub fn apply_payload(&self, seq: u64, payload: &str, incoming: Dataset) -> ApplyOutcome {
        self.apply(seq, Some(payload), incoming)
    }

    fn apply(&self, seq: u64, payload: Option<&str>, incoming: Dataset) -> ApplyOutcome {
        let mut inner = self.inner.write();
        if !self.is_latest(seq) {
            return ApplyOutcome::Stale;
        }
        let same_payload = payload.is_some() && inner.payload.as_deref() == payload;
        inner.payload = payload.map(str::to_string);
        if same_payload || !dataset_changed(&inner.dataset, &incoming) {
            return ApplyOutcome::Unchanged;
        }
        inner.dataset = incoming;
        ApplyOutcome::Changed
    }

    /// 最新のフェッチであればステータスを更新し、true を返す
    pub fn set_status_if_latest(&self, seq: u64, status: SyncStatus) -> bool {
        let mut inner = self.inner.write();
        if !self.is_latest(seq) {
            return false;
        }
        inner.status = status;
        true
    }

    /// Dataset 内の最新更新時刻
    pub fn latest_update(&self) -> Option<DateTime<Utc>> {
        // 昇順ソート済みなので末尾が最新
        self.inner.read().dataset.last().map(|r| r.updated_at)
    }

    /// 現在のフィルタでチャート用データを構築
    pub fn chart_data(&self, now: DateTime<Utc>) -> ChartData {
        let (dataset, source, window, selected) = {
            let inner = self.inner.read();
            (
                Arc::clone(&inner.dataset),
                inner.current_source.clone(),
                inner.time_window,
                inner.selected.clone(),
            )
        };

        let filtered = filter_records(&dataset, window, &selected, now);
        let members = present_members(&selected, &filtered);
        let series = if filtered.is_empty() {
            Vec::new()
        } else {
            build_all_series(&filtered, &members)
        };

        ChartData {
            source,
            window,
            members,
            series,
        }
    }
}
