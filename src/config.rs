//! アプリケーション設定管理モジュール
//!
//! XDGディレクトリ上の `config.toml` を既定とし、Web版ダッシュボードの
//! `config.json`（camelCase）もそのまま読み込める。

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{SelectedEntities, TimeWindow};

/// 色が設定されていないメンバーのチャート色
pub const DEFAULT_MEMBER_COLOR: &str = "#64B5F6";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to get project directories")]
    NoProjectDirs,
}

/// 起動時の既定値
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultSettings {
    #[serde(alias = "currentSource")]
    pub current_source: String,
    #[serde(alias = "currentTimeRange")]
    pub current_time_range: TimeWindow,
    #[serde(alias = "selectedMembers")]
    pub selected_members: Vec<String>,
}

/// データ取得先URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlConfig {
    #[serde(alias = "summarySheetUrl")]
    pub summary_sheet_url: String,
    /// ソースキー → CSVエクスポートURL
    #[serde(alias = "sheetsUrls")]
    pub sheets_urls: BTreeMap<String, String>,
}

/// ダッシュボード設定（config.json と同じ構造）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    #[serde(alias = "defaultSettings")]
    pub default_settings: DefaultSettings,
    /// メンバー → 表示色
    #[serde(alias = "memberColors")]
    pub member_colors: BTreeMap<String, String>,
    /// ソース/動画キー → 表示名
    #[serde(alias = "videoNames")]
    pub video_names: BTreeMap<String, String>,
    pub urls: UrlConfig,
}

impl DashboardConfig {
    /// ソースのエンドポイント（未設定・空文字は None）
    pub fn endpoint_for(&self, source: &str) -> Option<&str> {
        self.urls
            .sheets_urls
            .get(source)
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
    }

    /// 設定済みのソースキー一覧
    pub fn sources(&self) -> Vec<&str> {
        self.urls.sheets_urls.keys().map(String::as_str).collect()
    }

    pub fn summary_endpoint(&self) -> Option<&str> {
        Some(self.urls.summary_sheet_url.trim()).filter(|url| !url.is_empty())
    }

    pub fn color_for(&self, member: &str) -> &str {
        self.member_colors
            .get(member)
            .map(String::as_str)
            .unwrap_or(DEFAULT_MEMBER_COLOR)
    }

    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.video_names.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn default_selection(&self) -> SelectedEntities {
        self.default_settings.selected_members.iter().cloned().collect()
    }
}

/// 同期ループ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// ポーリング間隔（秒）
    pub interval_secs: u64,
    /// HTTPリクエストのタイムアウト（秒）
    pub request_timeout_secs: u64,
    /// タイムゾーン表記のない時刻に適用するUTCオフセット（時間）
    pub utc_offset_hours: i32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            request_timeout_secs: 30,
            utc_offset_hours: 0,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// ログ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// カスタムログディレクトリ（Noneの場合はXDGデフォルト使用）
    pub log_dir: Option<PathBuf>,
    /// ログレベル (trace/debug/info/warn/error)
    pub log_level: String,
    /// ファイル出力有効化
    pub enable_file_logging: bool,
    /// 保存するログファイル数上限
    pub max_log_files: u32,
    /// ログファイル名のプレフィックス
    pub log_file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_level: "info".to_string(),
            enable_file_logging: false,
            max_log_files: 30,
            log_file_prefix: "trendsync.log".to_string(),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dashboard: DashboardConfig,
    pub sync: SyncConfig,
    pub log: LogConfig,
}

/// XDGプロジェクトディレクトリ
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "trendsync", "trendsync")
}

/// 設定管理マネージャー
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// XDG既定パスの設定マネージャーを作成
    pub fn new() -> Result<Self, ConfigError> {
        let project_dirs = project_dirs().ok_or(ConfigError::NoProjectDirs)?;
        let config_path = project_dirs.config_dir().join("config.toml");
        debug!("Config file path: {}", config_path.display());
        Ok(Self { config_path })
    }

    /// 任意パスの設定マネージャーを作成
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn is_json(&self) -> bool {
        self.config_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    /// 設定を読み込み（ファイルがなければデフォルト）
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_path.exists() {
            info!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_path).map_err(|source| ConfigError::Read {
            path: self.config_path.clone(),
            source,
        })?;

        let config = if self.is_json() {
            // JSON はダッシュボード設定単体（camelCase の config.json）
            let dashboard: DashboardConfig =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                    path: self.config_path.clone(),
                    message: e.to_string(),
                })?;
            AppConfig {
                dashboard,
                ..AppConfig::default()
            }
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: self.config_path.clone(),
                message: e.to_string(),
            })?
        };

        info!("✅ Configuration loaded from: {}", self.config_path.display());
        Ok(config)
    }

    /// 設定を読み込み、失敗した場合は警告を出してデフォルトを返す
    pub fn load_or_default(&self) -> AppConfig {
        let (config, error) = load_with_fallback(Ok(self));
        if let Some(reason) = error {
            warn!("設定読み込みエラー、デフォルト設定を使用: {}", reason);
        }
        config
    }

    /// 設定を保存（TOML）
    pub fn save_config(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.config_path, content).map_err(|source| ConfigError::Write {
            path: self.config_path.clone(),
            source,
        })?;

        info!("💾 Configuration saved to: {}", self.config_path.display());
        Ok(())
    }
}

/// 設定マネージャーの作成または読み込みに失敗した場合はデフォルト設定を返す
///
/// 失敗理由はロギング初期化後に出力できるよう呼び出し側へ返す。
pub fn load_with_fallback(
    manager: Result<&ConfigManager, &ConfigError>,
) -> (AppConfig, Option<String>) {
    match manager.map(ConfigManager::load_config) {
        Ok(Ok(config)) => (config, None),
        Ok(Err(e)) => (AppConfig::default(), Some(e.to_string())),
        Err(e) => (AppConfig::default(), Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DASHBOARD_JSON: &str = r##"{
        "defaultSettings": {
            "currentSource": "day1",
            "currentTimeRange": "3d",
            "selectedMembers": ["Alice", "Bob"]
        },
        "memberColors": { "Alice": "#FF0000" },
        "videoNames": { "day1": "Day One MV", "V1": "First Video" },
        "urls": {
            "summarySheetUrl": "https://example.com/summary.csv",
            "sheetsUrls": { "day1": "https://example.com/day1.csv", "day2": "" }
        }
    }"##;

    #[test]
    fn test_load_camel_case_json() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, DASHBOARD_JSON).unwrap();

        let config = ConfigManager::with_path(&path).load_config().unwrap();
        let dashboard = &config.dashboard;
        assert_eq!(dashboard.default_settings.current_source, "day1");
        assert_eq!(dashboard.default_settings.current_time_range, TimeWindow::ThreeDays);
        assert_eq!(
            dashboard.default_selection().iter().collect::<Vec<_>>(),
            vec!["Alice", "Bob"]
        );
        assert_eq!(dashboard.endpoint_for("day1"), Some("https://example.com/day1.csv"));
        assert_eq!(dashboard.endpoint_for("day2"), None);
        assert_eq!(dashboard.endpoint_for("day9"), None);
        assert_eq!(dashboard.summary_endpoint(), Some("https://example.com/summary.csv"));
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_lookups_fall_back() {
        let config = DashboardConfig {
            member_colors: BTreeMap::from([("A".to_string(), "#123456".to_string())]),
            video_names: BTreeMap::from([("V1".to_string(), "Video One".to_string())]),
            ..DashboardConfig::default()
        };
        assert_eq!(config.color_for("A"), "#123456");
        assert_eq!(config.color_for("B"), DEFAULT_MEMBER_COLOR);
        assert_eq!(config.display_name("V1"), "Video One");
        assert_eq!(config.display_name("V2"), "V2");
        assert_eq!(config.summary_endpoint(), None);
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.dashboard.default_settings.current_time_range, TimeWindow::SevenDays);
        assert!(config.dashboard.default_selection().is_empty());
        assert_eq!(config.sync.interval(), Duration::from_secs(60));
        assert_eq!(config.log.log_level, "info");
    }

    #[test]
    fn test_toml_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("nested").join("config.toml"));

        let mut original = AppConfig::default();
        original.dashboard.default_settings.current_source = "day2".to_string();
        original.dashboard.default_settings.current_time_range = TimeWindow::All;
        original
            .dashboard
            .urls
            .sheets_urls
            .insert("day2".to_string(), "https://example.com/2.csv".to_string());
        original.sync.interval_secs = 15;

        manager.save_config(&original).unwrap();
        let loaded = manager.load_config().unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("partial.toml");
        fs::write(
            &path,
            r#"
[dashboard.default_settings]
current_source = "day1"

[sync]
utc_offset_hours = 8
"#,
        )
        .unwrap();

        let config = ConfigManager::with_path(&path).load_config().unwrap();
        assert_eq!(config.dashboard.default_settings.current_source, "day1");
        assert_eq!(config.sync.utc_offset_hours, 8);
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = tempdir().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("missing.toml"));
        assert_eq!(manager.load_config().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_corrupted_file_errors_but_fallback_succeeds() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("corrupted.json");
        fs::write(&path, "{ not json").unwrap();

        let manager = ConfigManager::with_path(&path);
        let err = manager.load_config().unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
        assert_eq!(manager.load_or_default(), AppConfig::default());
    }

    #[test]
    fn test_fallback_without_project_dirs() {
        let (config, error) = load_with_fallback(Err(&ConfigError::NoProjectDirs));
        assert_eq!(config, AppConfig::default());
        assert!(error.unwrap().contains("project directories"));

        let temp_dir = tempdir().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("missing.toml"));
        assert_eq!(load_with_fallback(Ok(&manager)), (AppConfig::default(), None));
    }

    #[test]
    fn test_json_accepts_24h_window() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "defaultSettings": { "currentTimeRange": "24h" } }"#).unwrap();

        let config = ConfigManager::with_path(&path).load_config().unwrap();
        assert_eq!(
            config.dashboard.default_settings.current_time_range,
            TimeWindow::OneDay
        );
    }
}
