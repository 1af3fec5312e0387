//! ログイン状態フラグの保存
//!
//! ダッシュボード表示前のUX上のゲートであり、認証ではない。
//! `is_logged_in` / `current_user` / `remember_me` の3項目のみ保持する。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::project_dirs;

/// ユーザー名が未設定の場合の表示名
pub const DEFAULT_DISPLAY_NAME: &str = "User";

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("Not logged in; run `trendsync login <name>` first")]
    NotLoggedIn,
    #[error("Session store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupted session file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Failed to serialize session: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to get project directories")]
    NoProjectDirs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub is_logged_in: bool,
    pub current_user: Option<String>,
    pub remember_me: bool,
}

impl SessionState {
    pub fn display_name(&self) -> &str {
        self.current_user
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
    }
}

/// ファイルに保存するセッションストア
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new() -> Result<Self, SessionError> {
        let dirs = project_dirs().ok_or(SessionError::NoProjectDirs)?;
        Ok(Self::with_path(dirs.data_dir().join("session.toml")))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }

    pub fn load(&self) -> Result<SessionState, SessionError> {
        if !self.path.exists() {
            return Ok(SessionState::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        toml::from_str(&content).map_err(|e| SessionError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        let content = toml::to_string_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        fs::write(&self.path, content).map_err(|e| self.io_error(e))
    }

    pub fn login(&self, user: &str, remember_me: bool) -> Result<SessionState, SessionError> {
        let state = SessionState {
            is_logged_in: true,
            current_user: Some(user.trim().to_string()).filter(|u| !u.is_empty()),
            remember_me,
        };
        self.save(&state)?;
        info!(user = %state.display_name(), "🔓 Logged in");
        Ok(state)
    }

    /// 3項目すべてを削除
    pub fn logout(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_error(e)),
        }
        info!("🔒 Logged out");
        Ok(())
    }

    /// ログイン済みでなければ `NotLoggedIn`
    pub fn require_login(&self) -> Result<SessionState, SessionError> {
        let state = self.load()?;
        if state.is_logged_in {
            Ok(state)
        } else {
            Err(SessionError::NotLoggedIn)
        }
    }
}
