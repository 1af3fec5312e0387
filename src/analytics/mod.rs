pub mod filter;
pub mod ranking;
pub mod series;

pub use filter::{filter_records, within_window};
pub use ranking::{rank_groups, rank_summary, RankedGroup};
pub use series::{
    build_all_series, build_series, present_members, time_axis, MemberSeries, MetricSeries,
};
