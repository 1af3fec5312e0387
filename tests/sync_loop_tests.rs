//! 同期ループの統合テスト（モックCSVソース使用）

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use trendsync::{
    api::{CsvSource, FailureKind, FetchError},
    config::{DashboardConfig, DefaultSettings, SyncConfig, UrlConfig},
    DashboardEvent, DashboardState, SyncOutcome, SyncService, SyncStatus,
};

const OLD: &str = "member,video_id,updated_at,view_count\nA,v,2024-01-01T00:00:00Z,1\n";
const NEW: &str = "member,video_id,updated_at,view_count\nA,v,2024-01-01T00:00:00Z,2\n";

fn dashboard_config() -> DashboardConfig {
    DashboardConfig {
        default_settings: DefaultSettings {
            current_source: "day1".to_string(),
            selected_members: vec!["A".to_string()],
            ..DefaultSettings::default()
        },
        urls: UrlConfig {
            sheets_urls: BTreeMap::from([
                ("day1".to_string(), "mem://day1".to_string()),
                ("day2".to_string(), "mem://day2".to_string()),
            ]),
            ..UrlConfig::default()
        },
        ..DashboardConfig::default()
    }
}

fn service_with(source: impl CsvSource + 'static) -> Arc<SyncService> {
    let config = dashboard_config();
    let state = DashboardState::new(&config);
    Arc::new(SyncService::new(
        Arc::new(source),
        Arc::new(config),
        &SyncConfig::default(),
        state,
    ))
}

/// 最初の呼び出しだけ解放されるまで応答を保留するソース
struct GatedSource {
    calls: Arc<AtomicUsize>,
    release: Arc<Notify>,
}

#[async_trait]
impl CsvSource for GatedSource {
    async fn fetch_csv(&self, _endpoint: &str) -> Result<String, FetchError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.release.notified().await;
            Ok(OLD.to_string())
        } else {
            Ok(NEW.to_string())
        }
    }
}

/// 呼び出し回数を数え、ソースごとに固定の応答を返すソース
struct CountingSource {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CsvSource for CountingSource {
    async fn fetch_csv(&self, endpoint: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match endpoint {
            "mem://day1" => Ok(OLD.to_string()),
            "mem://day2" => Ok("<!DOCTYPE html><html>login</html>".to_string()),
            other => Err(FetchError::Status {
                status: 404,
                url: other.to_string(),
            }),
        }
    }
}

#[tokio::test]
async fn test_late_response_from_superseded_fetch_is_discarded() {
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());
    let service = service_with(GatedSource {
        calls: Arc::clone(&calls),
        release: Arc::clone(&release),
    });

    let older = service.state().begin_fetch();
    let slow = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.sync_with_sequence(older).await })
    };
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        service.sync_once().await,
        SyncOutcome::Changed { records: 1, .. }
    ));

    release.notify_one();
    assert_eq!(slow.await.unwrap(), SyncOutcome::Stale { seq: older });

    // 新しいフェッチの結果と状態が残る
    assert_eq!(service.state().dataset()[0].view_count, 2);
    assert!(matches!(
        service.state().status(),
        SyncStatus::Synced { records: 1, .. }
    ));
}

#[tokio::test]
async fn test_source_switch_discards_in_flight_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());
    let service = service_with(GatedSource {
        calls: Arc::clone(&calls),
        release: Arc::clone(&release),
    });

    let pending = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.sync_once().await })
    };
    while calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    // day1 の応答待ちの間に day2 へ切り替える
    service.select_source("day2");
    release.notify_one();

    let outcome = pending.await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Stale { .. }), "{outcome:?}");
    assert!(service.state().dataset().is_empty());
    assert_eq!(service.state().current_source(), "day2");
}

#[tokio::test]
async fn test_run_loop_syncs_at_startup_and_on_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let service = service_with(CountingSource {
        calls: Arc::clone(&calls),
    });
    let mut events = service.broadcaster().subscribe();

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    let runner = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run(shutdown_rx).await })
    };

    // 起動時同期
    let changed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(DashboardEvent::DataChanged { records }) = events.recv().await {
                break records;
            }
        }
    })
    .await
    .expect("startup sync should publish DataChanged");
    assert_eq!(changed, 1);

    // ソース切替で即時同期され、HTML応答はエラーとして報告される
    service.select_source("day2");
    let failure = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(DashboardEvent::StatusChanged(SyncStatus::Failed { kind, .. })) =
                events.recv().await
            {
                break kind;
            }
        }
    })
    .await
    .expect("source switch should trigger a sync");
    assert_eq!(failure, FailureKind::EmptyOrInvalidPayload);
    assert!(calls.load(Ordering::SeqCst) >= 2);

    // 失敗しても直前の Dataset は保持される
    assert_eq!(service.state().dataset().len(), 1);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("loop should stop after shutdown")
        .unwrap();
}

#[test]
fn test_run_loop_stops_when_sender_dropped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let service = service_with(CountingSource {
        calls: Arc::clone(&calls),
    });

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel::<()>();
    drop(shutdown_tx);

    tokio_test::block_on(service.run(shutdown_rx));
    assert!(calls.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn test_unconfigured_source_is_reported() {
    let service = service_with(CountingSource {
        calls: Arc::new(AtomicUsize::new(0)),
    });
    service.select_source("day9");

    let outcome = service.sync_once().await;
    let SyncOutcome::Failed(failure) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(failure.kind, FailureKind::NotConfigured);
    assert!(service.state().status().to_string().starts_with("⚠ Not configured"));
}
