//! I/O utilities for sheet exports.
//!
//! This module turns raw delimited text into typed records: metric time series
//! via [`csv::CsvParser`] and summary rows via [`summary::parse_summary`].

pub mod csv;
pub mod summary;

// Re-export commonly used types and functions
pub use csv::{
    write_records, ColumnMap, CsvParser, ParseReport, RejectReason, RejectedRow, RowPolicy,
};
pub use summary::parse_summary;
