//! CSV sink driver: maps document fields to stable columns.
//!
//! The column layout is derived once from the replicated mappings and stays
//! fixed for the whole run, which is what makes append runs against an
//! existing file safe: rows written today line up with a header written
//! last week as long as the mapping walk saw the fields in the same order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

use crate::drivers::{
    BackendStats, Batch, Document, Driver, DriverInfo, Metadata, OptionDef, Role,
};
use crate::error::{Error, Result};

/// Configuration for the CSV sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvConfig {
    /// File the data is exported to.
    pub file: PathBuf,
    /// Separator between columns.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Skip the header row.
    #[serde(default)]
    pub no_header: bool,
    /// Force every non-numeric value into quotes.
    #[serde(default)]
    pub quote_everything: bool,
    /// Strip whitespace from the beginning/end of values.
    #[serde(default)]
    pub trim_data: bool,
    /// Escape quotes as `\"` instead of the doubled-quote convention.
    #[serde(default)]
    pub unix_quotes: bool,
    /// Append to an existing file instead of overwriting it.
    #[serde(default)]
    pub append: bool,
}

fn default_separator() -> String {
    ",".to_string()
}

/// Run-scoped assignment of stable column positions to observed field names.
///
/// Once a field has a column it keeps it for the rest of the run; new fields
/// append at the end. Cleared by [`Driver::reset`].
#[derive(Debug, Default)]
pub struct PropertyMap {
    columns: HashMap<String, usize>,
}

impl PropertyMap {
    /// Returns the field's column, assigning the next free one on first
    /// sight. The flag is true when the field was newly assigned.
    pub fn assign(&mut self, field: &str) -> (usize, bool) {
        if let Some(&index) = self.columns.get(field) {
            return (index, false);
        }
        let index = self.columns.len();
        self.columns.insert(field.to_string(), index);
        (index, true)
    }

    /// Column index of a known field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    /// Number of assigned columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no columns have been assigned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Forgets all assignments.
    pub fn clear(&mut self) {
        self.columns.clear();
    }
}

/// CSV sink driver. Export only.
pub struct CsvDriver {
    config: CsvConfig,
    columns: PropertyMap,
}

impl CsvDriver {
    /// Creates the driver with an empty column map.
    #[must_use]
    pub fn new(config: CsvConfig) -> Self {
        Self {
            config,
            columns: PropertyMap::default(),
        }
    }

    /// Escapes one value for embedding in a delimited row.
    ///
    /// Absent values become the empty string and numeric values pass through
    /// byte-for-byte (never quoted, never trimmed). Structured values are
    /// serialized to compact JSON first, then trimming and quoting apply
    /// like for any other text.
    #[must_use]
    pub fn escape(&self, value: &Value) -> String {
        let text = match value {
            Value::Null => return String::new(),
            Value::Number(n) => return n.to_string(),
            Value::String(s) if s.is_empty() => return String::new(),
            Value::String(s) if is_numeric(s) => return s.clone(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            other => serde_json::to_string(other).unwrap_or_default(),
        };

        let text = if self.config.trim_data {
            text.trim().to_string()
        } else {
            text
        };

        let needs_quotes = self.config.quote_everything
            || text.contains('\n')
            || text.contains('"')
            || text.contains(self.config.separator.as_str());
        if !needs_quotes {
            return text;
        }

        let escaped = if self.config.unix_quotes {
            text.replace('"', "\\\"")
        } else {
            text.replace('"', "\"\"")
        };
        format!("\"{escaped}\"")
    }

    fn file_is_missing_or_empty(&self) -> bool {
        std::fs::metadata(&self.config.file).map_or(true, |m| m.len() == 0)
    }
}

fn is_numeric(s: &str) -> bool {
    s.trim().parse::<f64>().map_or(false, f64::is_finite)
}

#[async_trait]
impl Driver for CsvDriver {
    fn info(&self) -> DriverInfo {
        DriverInfo {
            id: "csv",
            name: "CSV Driver",
            version: "1.0",
            description: "A CSV driver to export data that maps all fields to columns",
            options: vec![
                OptionDef {
                    name: "file",
                    abbr: "f",
                    help: "The file to which the data should be exported",
                    flag: false,
                    default: None,
                    required: true,
                },
                OptionDef {
                    name: "separator",
                    abbr: "s",
                    help: "The separator to use between columns",
                    flag: false,
                    default: Some(","),
                    required: false,
                },
                OptionDef {
                    name: "no_header",
                    abbr: "h",
                    help: "Whether to include a header row or not",
                    flag: true,
                    default: Some("false"),
                    required: false,
                },
                OptionDef {
                    name: "quote_everything",
                    abbr: "q",
                    help: "Whether to force all values to be encapsulated in quotes",
                    flag: true,
                    default: Some("false"),
                    required: false,
                },
                OptionDef {
                    name: "trim_data",
                    abbr: "t",
                    help: "Whether to strip whitespace from the beginning/end of values",
                    flag: true,
                    default: Some("false"),
                    required: false,
                },
                OptionDef {
                    name: "unix_quotes",
                    abbr: "c",
                    help: "Whether to escape quotes as \\\" instead of the standard \"\"",
                    flag: true,
                    default: Some("false"),
                    required: false,
                },
                OptionDef {
                    name: "append",
                    abbr: "a",
                    help: "If the file exists, append to it instead of overwriting",
                    flag: true,
                    default: Some("false"),
                    required: false,
                },
            ],
        }
    }

    fn verify_options(&self, role: Role) -> Vec<String> {
        let mut errors = Vec::new();

        match role {
            Role::Source => {
                errors.push("The CSV driver doesn't support import operations".to_string());
            }
            Role::Target => {
                if self.config.separator.is_empty() {
                    errors
                        .push("Separator is empty, the resulting file would not be a CSV".to_string());
                }
                if self.config.file.exists() {
                    info!(
                        "Warning: {} already exists, duplicate entries might occur",
                        self.config.file.display()
                    );
                }
            }
        }

        errors
    }

    async fn reset(&mut self) -> Result<()> {
        self.columns.clear();
        Ok(())
    }

    async fn source_stats(&self) -> Result<BackendStats> {
        Err(Error::Unsupported {
            driver: "csv",
            operation: "import operations",
        })
    }

    async fn target_stats(&self) -> Result<BackendStats> {
        Ok(BackendStats {
            version: "1.0.0".to_string(),
            cluster_status: "green".to_string(),
            docs: None,
        })
    }

    async fn get_meta(&mut self) -> Result<Metadata> {
        Err(Error::Unsupported {
            driver: "csv",
            operation: "import operations",
        })
    }

    async fn put_meta(&mut self, meta: &Metadata) -> Result<()> {
        if !self.config.append {
            std::fs::write(&self.config.file, "")?;
        }

        let separator = self.config.separator.clone();
        let mut header = if self.config.quote_everything {
            format!("\"index\"{separator}\"type\"")
        } else {
            format!("index{separator}type")
        };

        for (_, _, field) in meta.fields() {
            let (_, newly_assigned) = self.columns.assign(field);
            if newly_assigned {
                header.push_str(&separator);
                header.push_str(&self.escape(&Value::String(field.to_string())));
            }
        }

        // Writing the header only into a missing or empty file keeps append
        // runs from repeating it mid-file.
        if !self.config.no_header && self.file_is_missing_or_empty() {
            std::fs::write(&self.config.file, format!("{header}\n"))?;
        }

        Ok(())
    }

    async fn get_data(&mut self) -> Result<Batch> {
        Err(Error::Unsupported {
            driver: "csv",
            operation: "import operations",
        })
    }

    async fn put_data(&mut self, docs: &[Document]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.file)?;
        let mut writer = BufWriter::new(file);

        for doc in docs {
            let mut cells = vec![String::new(); self.columns.len()];
            for (field, value) in &doc.source {
                // Fields the mapping never declared have no column; the row
                // layout must not widen past the header.
                if let Some(index) = self.columns.get(field) {
                    cells[index] = self.escape(value);
                }
            }

            let mut row = self.escape(&Value::String(doc.index.clone()));
            row.push_str(&self.config.separator);
            row.push_str(&self.escape(&Value::String(doc.doc_type.clone())));
            for cell in cells {
                row.push_str(&self.config.separator);
                row.push_str(&cell);
            }
            writeln!(writer, "{row}")?;
        }

        writer.flush()?;
        Ok(())
    }

    async fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "csv_tests.rs"]
mod tests;
