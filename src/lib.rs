pub mod analytics;
pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod io;
pub mod logging;
pub mod models;
pub mod report;
pub mod session;
pub mod sync;

// Re-export the main error types for convenience
pub use api::FetchError;
pub use config::ConfigError;
pub use error::{TrendsyncError, TrendsyncResult};
pub use session::SessionError;

// Re-export the data model
pub use models::{
    into_dataset, Dataset, Metric, MetricRecord, SelectedEntities, SeriesPoint, SummaryRecord,
    TimeWindow,
};

// Re-export the pipeline entry points
pub use api::{CsvSource, HttpCsvSource};
pub use dashboard::{ChartData, DashboardState, SyncStatus};
pub use io::CsvParser;
pub use sync::{DashboardEvent, SyncOutcome, SyncService};
