//! Configuration types for searchlift.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::drivers::csv::CsvConfig;
use crate::drivers::elasticsearch::EsConfig;
use crate::drivers::kv::KvConfig;
use crate::error::{Error, Result};

/// Main migration configuration: one source driver, one target driver, and
/// the transfer tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Driver documents are read from.
    pub source: DriverConfig,
    /// Driver documents are written to.
    pub target: DriverConfig,
    /// Transfer tunables.
    #[serde(default)]
    pub options: TransferOptions,
}

/// Driver selection, tagged by driver id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DriverConfig {
    /// Elasticsearch cluster over scroll/bulk HTTP.
    #[serde(rename = "elasticsearch")]
    Elasticsearch(EsConfig),
    /// CSV file sink.
    #[serde(rename = "csv")]
    Csv(CsvConfig),
    /// Stub key-value driver.
    #[serde(rename = "kv")]
    Kv(KvConfig),
}

impl DriverConfig {
    /// The driver id this configuration selects.
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::Elasticsearch(_) => "elasticsearch",
            Self::Csv(_) => "csv",
            Self::Kv(_) => "kv",
        }
    }
}

/// Transfer tunables shared by both drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Documents requested per page and written per bulk request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Consecutive transport failures tolerated per operation before the
    /// run aborts.
    #[serde(default = "default_errors_allowed")]
    pub errors_allowed: u32,
    /// Skip writing documents to the target (metadata still replicates).
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            errors_allowed: default_errors_allowed(),
            dry_run: false,
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_errors_allowed() -> u32 {
    3
}

impl MigrationConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Driver-specific option checks live in each driver's
    /// `verify_options`; this only covers the shared tunables.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.options.batch_size == 0 {
            return Err(Error::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.options.errors_allowed == 0 {
            return Err(Error::Config(
                "errors_allowed must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let options = TransferOptions::default();
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.errors_allowed, 3);
        assert!(!options.dry_run);
    }

    #[test]
    fn yaml_parse_full_config() {
        let yaml = r"
source:
  type: elasticsearch
  url: http://localhost:9200
  index: products
target:
  type: csv
  file: out.csv
  separator: ';'
options:
  batch_size: 500
";
        let config: MigrationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.source.id(), "elasticsearch");
        assert_eq!(config.target.id(), "csv");
        assert_eq!(config.options.batch_size, 500);
        assert_eq!(config.options.errors_allowed, 3);

        match config.target {
            DriverConfig::Csv(csv) => {
                assert_eq!(csv.separator, ";");
                assert!(!csv.append);
            }
            other => panic!("unexpected target driver: {}", other.id()),
        }
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let yaml = "
source:
  type: kv
target:
  type: kv
options:
  batch_size: 0
";
        let config: MigrationConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_errors_allowed() {
        let yaml = "
source:
  type: kv
target:
  type: kv
options:
  errors_allowed: 0
";
        let config: MigrationConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
