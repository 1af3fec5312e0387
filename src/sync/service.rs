// 定期同期サービス
//
// 起動時に1回、その後は一定間隔でCSVを取得し、変更があれば
// Dataset を差し替えて DataChanged を通知する。失敗はステータスとして
// 報告し、ループ自体は止めない。

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;

use super::broadcaster::{DashboardEvent, StateBroadcaster};
use crate::analytics::rank_summary;
use crate::api::{check_payload, CsvSource, FailureKind, FetchError};
use crate::config::{DashboardConfig, SyncConfig};
use crate::dashboard::{ApplyOutcome, DashboardState, SyncStatus};
use crate::io::{parse_summary, CsvParser};
use crate::models::{into_dataset, Dataset, SummaryRecord};

/// 同期失敗の分類とメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&FetchError> for SyncFailure {
    fn from(error: &FetchError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// 解析済みの取得結果
struct Fetched {
    body: String,
    dataset: Dataset,
    rejected: usize,
}

/// 1回の同期の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Changed { records: usize, rejected: usize },
    Unchanged { records: usize },
    /// 新しいフェッチが発行済みのため破棄
    Stale { seq: u64 },
    Failed(SyncFailure),
}

/// 同期サービス
pub struct SyncService {
    source: Arc<dyn CsvSource>,
    config: Arc<DashboardConfig>,
    parser: CsvParser,
    state: DashboardState,
    broadcaster: StateBroadcaster,
    interval: Duration,
    refresh: Notify,
}

impl SyncService {
    pub fn new(
        source: Arc<dyn CsvSource>,
        config: Arc<DashboardConfig>,
        sync_config: &SyncConfig,
        state: DashboardState,
    ) -> Self {
        Self {
            source,
            config,
            parser: CsvParser::new().with_utc_offset_hours(sync_config.utc_offset_hours),
            state,
            broadcaster: StateBroadcaster::new(),
            interval: sync_config.interval(),
            refresh: Notify::new(),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &StateBroadcaster {
        &self.broadcaster
    }

    fn publish_status(&self, seq: u64, status: SyncStatus) -> bool {
        if self.state.set_status_if_latest(seq, status.clone()) {
            self.broadcaster.broadcast(DashboardEvent::StatusChanged(status));
            true
        } else {
            false
        }
    }

    /// 即時同期を要求（ソース切替・手動更新）
    pub fn request_sync(&self) {
        self.refresh.notify_one();
    }

    /// ソースを切り替えて即時同期を要求
    pub fn select_source(&self, source: &str) {
        if self.state.set_current_source(source) {
            tracing::info!(source = %source, "🔀 Source switched");
        }
        self.request_sync();
    }

    /// 1回同期する
    pub async fn sync_once(&self) -> SyncOutcome {
        let seq = self.state.begin_fetch();
        self.sync_with_sequence(seq).await
    }

    /// 発行済みシーケンス番号で同期する
    ///
    /// 応答が届いた時点で `seq` が最新でなければ結果を破棄する。
    pub async fn sync_with_sequence(&self, seq: u64) -> SyncOutcome {
        let source_key = self.state.current_source();
        self.publish_status(seq, SyncStatus::Syncing);

        let outcome = match self.fetch_dataset(&source_key).await {
            Ok(Fetched {
                body,
                dataset,
                rejected,
            }) => {
                let records = dataset.len();
                match self.state.apply_payload(seq, &body, dataset) {
                    ApplyOutcome::Stale => SyncOutcome::Stale { seq },
                    ApplyOutcome::Changed => {
                        self.broadcaster
                            .broadcast(DashboardEvent::DataChanged { records });
                        SyncOutcome::Changed { records, rejected }
                    }
                    ApplyOutcome::Unchanged => SyncOutcome::Unchanged { records },
                }
            }
            Err(e) => SyncOutcome::Failed(SyncFailure::from(&e)),
        };

        match &outcome {
            SyncOutcome::Changed { records, .. } | SyncOutcome::Unchanged { records } => {
                let changed = matches!(outcome, SyncOutcome::Changed { .. });
                self.publish_status(
                    seq,
                    SyncStatus::Synced {
                        records: *records,
                        changed,
                        at: Utc::now(),
                    },
                );
                tracing::info!(source = %source_key, records, changed, "✅ Sync completed");
            }
            SyncOutcome::Failed(failure) => {
                if self.publish_status(
                    seq,
                    SyncStatus::Failed {
                        kind: failure.kind,
                        message: failure.message.clone(),
                    },
                ) {
                    match failure.kind {
                        FailureKind::NotConfigured => {
                            tracing::debug!(source = %source_key, "⏸️ {}", failure.message)
                        }
                        _ => tracing::warn!(
                            source = %source_key,
                            kind = %failure.kind,
                            "❌ Sync failed: {}",
                            failure.message
                        ),
                    }
                } else {
                    tracing::debug!(seq, "Discarding failure from superseded fetch");
                    return SyncOutcome::Stale { seq };
                }
            }
            SyncOutcome::Stale { seq } => {
                tracing::debug!(seq, "⏭️ Discarding response from superseded fetch");
            }
        }

        outcome
    }

    async fn fetch_dataset(&self, source_key: &str) -> Result<Fetched, FetchError> {
        let endpoint =
            self.config
                .endpoint_for(source_key)
                .ok_or_else(|| FetchError::NotConfigured {
                    source_key: source_key.to_string(),
                })?;

        let body = self.source.fetch_csv(endpoint).await?;
        check_payload(&body)?;

        let report = self.parser.parse(&body, Utc::now());
        if report.rejected_count() > 0 || report.lenient_timestamps > 0 {
            tracing::warn!(
                source = %source_key,
                accepted = report.accepted_count(),
                rejected = report.rejected_count(),
                lenient_timestamps = report.lenient_timestamps,
                "⚠️ Some rows were dropped or normalized"
            );
            for row in report.rejected.iter().take(5) {
                tracing::debug!(line = row.line, reason = %row.reason, "Row rejected");
            }
        } else {
            tracing::debug!(
                source = %source_key,
                accepted = report.accepted_count(),
                "📊 Payload parsed"
            );
        }

        if report.records.is_empty() {
            return Err(FetchError::NoValidRows);
        }

        let rejected = report.rejected_count();
        Ok(Fetched {
            dataset: into_dataset(report.records),
            rejected,
            body,
        })
    }

    /// サマリー表を取得してランキングを付与する
    pub async fn load_summary(&self) -> Result<Vec<SummaryRecord>, FetchError> {
        let endpoint = self
            .config
            .summary_endpoint()
            .ok_or_else(|| FetchError::NotConfigured {
                source_key: "summary".to_string(),
            })?;

        let body = self.source.fetch_csv(endpoint).await?;
        check_payload(&body)?;

        let rows = rank_summary(&parse_summary(&body));
        tracing::info!(rows = rows.len(), "📋 Summary loaded");
        self.state.set_summary(rows.clone());
        self.broadcaster
            .broadcast(DashboardEvent::SummaryLoaded { rows: rows.len() });
        Ok(rows)
    }

    /// 定期同期ループ
    ///
    /// 最初の tick は即時に発火するため起動時同期を兼ねる。`shutdown` に
    /// 送信されるか送信側が破棄されると終了する。
    pub async fn run(&self, mut shutdown: mpsc::UnboundedReceiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            source = %self.state.current_source(),
            "🚀 Sync loop started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("🛑 Shutdown signal received, stopping sync loop");
                    break;
                }
                _ = interval.tick() => {
                    self.sync_once().await;
                }
                _ = self.refresh.notified() => {
                    self.sync_once().await;
                    // 手動同期の直後に定期同期が重ならないようにする
                    interval.reset();
                }
            }
        }
    }
}
