pub mod config;
pub mod error;
pub mod evaluate;
pub mod limits;
pub mod report;
pub mod sink;

pub use config::Config;
pub use error::{Result, TrackerError};
pub use evaluate::{evaluate, evaluate_all, ContributionInput, ContributionStatus, Status};
pub use limits::{ContributionKind, LimitTable, YearLimits};
pub use report::{Report, ReportRow, COLUMNS};
pub use sink::{excel::ExcelSink, run_sinks, sheets::GoogleSheetsSink, ReportSink};
