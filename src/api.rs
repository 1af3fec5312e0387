pub mod sheets; // スプレッドシートCSVエクスポート取得

pub use sheets::{check_payload, looks_like_html, CsvSource, FailureKind, FetchError, HttpCsvSource};
