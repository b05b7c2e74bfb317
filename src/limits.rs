use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::error::{Result, TrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionKind {
    HsaIndividual,
    HsaFamily,
    Retirement401k,
}

impl ContributionKind {
    pub fn hsa(family: bool) -> Self {
        if family {
            Self::HsaFamily
        } else {
            Self::HsaIndividual
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::HsaIndividual => "HSA Individual",
            Self::HsaFamily => "HSA Family",
            Self::Retirement401k => "401(k) Individual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct YearLimits {
    pub hsa_individual: Decimal,
    pub hsa_family: Decimal,
    pub retirement_401k: Decimal,
}

impl YearLimits {
    pub fn for_kind(&self, kind: ContributionKind) -> Decimal {
        match kind {
            ContributionKind::HsaIndividual => self.hsa_individual,
            ContributionKind::HsaFamily => self.hsa_family,
            ContributionKind::Retirement401k => self.retirement_401k,
        }
    }
}

/// Annual contribution limits keyed by plan year. Immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct LimitTable {
    years: BTreeMap<i32, YearLimits>,
}

impl LimitTable {
    /// IRS limits the tool ships with. A `limits_file` in the run
    /// configuration takes precedence so new plan years can be added
    /// without a rebuild.
    pub fn builtin() -> Self {
        let mut years = BTreeMap::new();
        years.insert(
            2024,
            YearLimits {
                hsa_individual: dec!(4150),
                hsa_family: dec!(8300),
                retirement_401k: dec!(23000),
            },
        );
        years.insert(
            2025,
            YearLimits {
                hsa_individual: dec!(4300),
                hsa_family: dec!(8600),
                retirement_401k: dec!(24000),
            },
        );
        Self { years }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            TrackerError::Configuration(format!(
                "failed to read limits file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let table: Self = serde_saphyr::from_str(yaml)
            .map_err(|e| TrackerError::Configuration(format!("invalid limits file: {e}")))?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        for (year, limits) in &self.years {
            for kind in [
                ContributionKind::HsaIndividual,
                ContributionKind::HsaFamily,
                ContributionKind::Retirement401k,
            ] {
                if limits.for_kind(kind) <= Decimal::ZERO {
                    return Err(TrackerError::Configuration(format!(
                        "limit for {} in {year} must be positive",
                        kind.label()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn for_year(&self, year: i32) -> Result<&YearLimits> {
        self.years
            .get(&year)
            .ok_or(TrackerError::UnsupportedYear(year))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_seeded_years() {
        let table = LimitTable::builtin();
        assert_eq!(table.for_year(2024).unwrap().hsa_individual, dec!(4150));
        assert_eq!(table.for_year(2025).unwrap().retirement_401k, dec!(24000));
    }

    #[test]
    fn unsupported_year_is_rejected() {
        let table = LimitTable::builtin();
        match table.for_year(2026) {
            Err(TrackerError::UnsupportedYear(2026)) => {}
            other => panic!("expected UnsupportedYear, got {other:?}"),
        }
    }

    #[test]
    fn family_flag_selects_family_limit() {
        let table = LimitTable::builtin();
        let limits = table.for_year(2025).unwrap();
        assert_eq!(limits.for_kind(ContributionKind::hsa(true)), dec!(8600));
        assert_eq!(limits.for_kind(ContributionKind::hsa(false)), dec!(4300));
    }

    #[test]
    fn table_loads_from_yaml() {
        let yaml = "\
2026:
  hsa_individual: 4400
  hsa_family: 8750
  retirement_401k: 24500
";
        let table = LimitTable::from_yaml(yaml).unwrap();
        assert_eq!(table.for_year(2026).unwrap().hsa_family, dec!(8750));
        assert!(matches!(
            table.for_year(2024),
            Err(TrackerError::UnsupportedYear(2024))
        ));
    }

    #[test]
    fn non_positive_limits_are_rejected() {
        let yaml = "\
2026:
  hsa_individual: 0
  hsa_family: 8750
  retirement_401k: 24500
";
        assert!(matches!(
            LimitTable::from_yaml(yaml),
            Err(TrackerError::Configuration(_))
        ));
    }
}
