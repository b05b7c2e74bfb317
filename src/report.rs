use rust_decimal::Decimal;
use time::{format_description::BorrowedFormatItem, macros::format_description, Date};

use crate::error::Result;
use crate::evaluate::{ContributionStatus, Status};

static REPORT_DATE_FMT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

pub const COLUMNS: [&str; 5] = [
    "Contribution Type",
    "Contributed To Date ($)",
    "Status",
    "Amount ($)",
    "Contribution Limit ($)",
];

/// Zero-based index of the "Status" column, the one that gets
/// highlighted when a limit is exceeded.
pub const STATUS_COLUMN: usize = 2;

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub contribution_type: &'static str,
    pub contributed: Decimal,
    pub status: &'static str,
    pub amount: Decimal,
    pub limit: Decimal,
    pub exceeded: bool,
}

impl From<&ContributionStatus> for ReportRow {
    fn from(status: &ContributionStatus) -> Self {
        Self {
            contribution_type: status.kind.label(),
            contributed: status.contributed,
            status: status.status.label(),
            amount: status.display_amount(),
            limit: status.limit,
            exceeded: status.status == Status::Exceeded,
        }
    }
}

/// The shaped output record handed unchanged to every configured sink.
/// `sheet_name` is the report identity: re-running on the same day
/// replaces the destination section of the same name.
#[derive(Debug, Clone)]
pub struct Report {
    pub year: i32,
    pub sheet_name: String,
    pub rows: Vec<ReportRow>,
}

impl Report {
    pub fn new(year: i32, statuses: &[ContributionStatus], run_date: Date) -> Result<Self> {
        Ok(Self {
            year,
            sheet_name: sheet_name(year, run_date)?,
            rows: statuses.iter().map(ReportRow::from).collect(),
        })
    }
}

pub fn sheet_name(year: i32, run_date: Date) -> Result<String> {
    Ok(format!("{year}_Summary_{}", run_date.format(REPORT_DATE_FMT)?))
}
