//! Crate-wide error type.
//!
//! Module-specific errors (`FetchError`, `ConfigError`, `SessionError`) convert
//! into [`TrendsyncError`] so callers at the edges can use a single result type.

use thiserror::Error;

use crate::api::sheets::FetchError;
use crate::config::ConfigError;
use crate::session::SessionError;

#[derive(Error, Debug)]
pub enum TrendsyncError {
    /// Remote source failure
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Configuration could not be read or written
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Session flag store failure or missing login
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Logging could not be initialized
    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

pub type TrendsyncResult<T> = Result<T, TrendsyncError>;
