use rust_decimal::Decimal;

use crate::error::{Result, TrackerError};
use crate::limits::{ContributionKind, LimitTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Remaining,
    Exceeded,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Self::Remaining => "Remaining Contribution",
            Self::Exceeded => "Exceeded Contribution",
        }
    }
}

/// Core comparison: signed remaining headroom. The status is decided on
/// the raw difference; rounding to cents is display-only, so a sub-cent
/// overage still counts as exceeded.
pub fn evaluate(contributed: Decimal, limit: Decimal) -> (Status, Decimal) {
    let raw = limit - contributed;
    let remaining = raw.round_dp(2);
    if raw >= Decimal::ZERO {
        (Status::Remaining, remaining)
    } else {
        (Status::Exceeded, remaining)
    }
}

#[derive(Debug, Clone)]
pub struct ContributionInput {
    pub year: i32,
    pub hsa_contributed: Decimal,
    pub retirement_contributed: Decimal,
    pub family: bool,
}

impl ContributionInput {
    pub fn new(
        year: i32,
        hsa_contributed: Decimal,
        retirement_contributed: Decimal,
        family: bool,
    ) -> Result<Self> {
        if hsa_contributed < Decimal::ZERO || retirement_contributed < Decimal::ZERO {
            return Err(TrackerError::Configuration(
                "contributed amounts must be non-negative".to_string(),
            ));
        }
        Ok(Self {
            year,
            hsa_contributed,
            retirement_contributed,
            family,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ContributionStatus {
    pub kind: ContributionKind,
    pub contributed: Decimal,
    pub limit: Decimal,
    pub remaining: Decimal,
    pub status: Status,
}

impl ContributionStatus {
    pub fn evaluate(kind: ContributionKind, contributed: Decimal, limit: Decimal) -> Self {
        let (status, remaining) = evaluate(contributed, limit);
        Self {
            kind,
            contributed,
            limit,
            remaining,
            status,
        }
    }

    pub fn display_amount(&self) -> Decimal {
        self.remaining.abs()
    }

    pub fn summary(&self) -> String {
        format!("{}: ${:.2}", self.status.label(), self.display_amount())
    }
}

/// Resolves the year's limits and evaluates both contribution types,
/// in fixed [HSA, 401(k)] order.
pub fn evaluate_all(
    input: &ContributionInput,
    table: &LimitTable,
) -> Result<[ContributionStatus; 2]> {
    let limits = table.for_year(input.year)?;
    let hsa_kind = ContributionKind::hsa(input.family);
    Ok([
        ContributionStatus::evaluate(hsa_kind, input.hsa_contributed, limits.for_kind(hsa_kind)),
        ContributionStatus::evaluate(
            ContributionKind::Retirement401k,
            input.retirement_contributed,
            limits.for_kind(ContributionKind::Retirement401k),
        ),
    ])
}
