//! ログ初期化

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{project_dirs, LogConfig};
use crate::error::{TrendsyncError, TrendsyncResult};

/// ログディレクトリを解決（未設定ならXDGデータディレクトリ配下の logs/）
pub fn resolve_log_dir(config: &LogConfig) -> Option<PathBuf> {
    config
        .log_dir
        .clone()
        .or_else(|| project_dirs().map(|dirs| dirs.data_dir().join("logs")))
}

/// `RUST_LOG` → 指定レベル → info の順でフィルタを決定
fn build_filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// ロギングを初期化
///
/// ファイル出力が有効な場合は日次ローテーションのファイルにも書き込み、
/// 返された [`WorkerGuard`] が生きている間だけバッファがフラッシュされる。
pub fn init_logging(
    config: &LogConfig,
    level_override: Option<&str>,
) -> TrendsyncResult<Option<WorkerGuard>> {
    let filter = build_filter(level_override.or(Some(config.log_level.as_str())));

    let mut file_info = None;
    let mut guard = None;
    let mut file_layer = None;

    if config.enable_file_logging {
        let dir = resolve_log_dir(config)
            .ok_or_else(|| TrendsyncError::Logging("no log directory available".to_string()))?;
        std::fs::create_dir_all(&dir).map_err(|e| {
            TrendsyncError::Logging(format!("cannot create {}: {e}", dir.display()))
        })?;
        let removed = prune_log_files(&dir, &config.log_file_prefix, config.max_log_files)?;

        let appender = tracing_appender::rolling::daily(&dir, &config.log_file_prefix);
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        file_layer = Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        );
        guard = Some(worker_guard);
        // サブスクライバー初期化後に出力する
        file_info = Some((dir, removed));
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| TrendsyncError::Logging(e.to_string()))?;

    if let Some((dir, removed)) = file_info {
        tracing::info!(dir = %dir.display(), removed, "📝 File logging enabled");
    }

    Ok(guard)
}

/// `prefix*` に一致する古いログを削除し、新しい順に `keep` 件だけ残す
///
/// 日次ローテーションのファイル名は日付サフィックスを持つため、
/// 名前順がそのまま時系列順になる。
pub fn prune_log_files(dir: &Path, prefix: &str, keep: u32) -> TrendsyncResult<usize> {
    let pattern = format!(
        "{}/{}*",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(prefix)
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| TrendsyncError::Logging(format!("invalid log pattern: {e}")))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let excess = files.len().saturating_sub(keep as usize);
    let mut removed = 0;
    for path in files.into_iter().take(excess) {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("failed to remove old log {}: {e}", path.display()),
        }
    }
    Ok(removed)
}
