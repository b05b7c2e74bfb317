use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, TrackerError};

/// Run configuration, loaded from `input.yaml` by default. At least one
/// destination (local directory or Google Sheet) must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub file_path: Option<PathBuf>,
    pub google_sheet_url: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub limits_file: Option<PathBuf>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            TrackerError::Configuration(format!(
                "failed to read configuration {}: {e}",
                path.display()
            ))
        })?;
        let config = Self::from_yaml(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_saphyr::from_str(yaml)
            .map_err(|e| TrackerError::Configuration(format!("invalid configuration: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_path.is_none() && self.google_sheet_url.is_none() {
            return Err(TrackerError::Configuration(
                "at least one of 'file_path' or 'google_sheet_url' must be specified".to_string(),
            ));
        }
        if let Some(url) = &self.google_sheet_url {
            crate::sink::sheets::spreadsheet_id_from(url)?;
            if self.credentials_file.is_none() {
                return Err(TrackerError::Configuration(
                    "'credentials_file' is required when 'google_sheet_url' is set".to_string(),
                ));
            }
        }
        Ok(())
    }
}
