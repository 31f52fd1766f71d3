//! Driver contract and the drivers implementing it.
//!
//! A driver is one end of a migration: a backend that can hand out documents
//! and schema metadata (source role), accept them (target role), or both.
//! The pipeline only ever talks to [`Driver`]; backend specifics stay inside
//! the implementations.

pub mod csv;
pub mod elasticsearch;
pub mod kv;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{DriverConfig, TransferOptions};
use crate::error::Result;

/// Insertion-ordered JSON object, the shape mappings and settings travel in.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Which end of the migration a driver is being used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The driver documents are read from.
    Source,
    /// The driver documents are written to.
    Target,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// One configuration option a driver recognizes, as declared by
/// [`Driver::info`].
#[derive(Debug, Clone)]
pub struct OptionDef {
    /// Option name as it appears in the config file.
    pub name: &'static str,
    /// Single-letter abbreviation.
    pub abbr: &'static str,
    /// Help text.
    pub help: &'static str,
    /// Whether this is a boolean flag rather than a valued option.
    pub flag: bool,
    /// Default value rendered as text, if any.
    pub default: Option<&'static str>,
    /// Whether the option must be provided.
    pub required: bool,
}

/// Driver identity and its declared option schema.
#[derive(Debug, Clone)]
pub struct DriverInfo {
    /// Stable driver id, also the config `type` tag.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Driver version.
    pub version: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Options the driver recognizes.
    pub options: Vec<OptionDef>,
}

/// Backend health and identity, for display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStats {
    /// Backend software version.
    pub version: String,
    /// Cluster health indicator (e.g. `green`).
    pub cluster_status: String,
    /// Total documents visible to this driver, when cheap to obtain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<u64>,
}

/// A record read from or written to a backend. Created per fetched batch and
/// discarded once the corresponding write completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Namespace (index) the document lives in.
    #[serde(rename = "_index")]
    pub index: String,
    /// Sub-namespace (type) within the index.
    #[serde(rename = "_type", default = "default_doc_type")]
    pub doc_type: String,
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Document version, when the backend reports one.
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Routing key, when present.
    #[serde(rename = "_routing", default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Parent document id, when present.
    #[serde(rename = "_parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Field name to value mapping.
    #[serde(rename = "_source", default)]
    pub source: JsonMap,
}

fn default_doc_type() -> String {
    "_doc".to_string()
}

/// How much of the cluster a metadata call covers, and therefore which parts
/// of [`Metadata`] are populated and how target replication is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaScope {
    /// Every index in the cluster.
    All,
    /// One index, settings and mappings.
    Index,
    /// One type within one index, mapping only.
    Type,
}

impl std::fmt::Display for MetaScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Index => write!(f, "index"),
            Self::Type => write!(f, "type"),
        }
    }
}

/// Schema metadata for one or more indices.
///
/// `mappings` maps index name → type name → field name → field definition;
/// `settings` maps index name → backend-specific settings. Which of the two
/// is populated follows from [`Metadata::scope`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Coverage of this metadata.
    #[serde(default)]
    pub scope: MetaScope,
    /// Index → type → field → definition.
    #[serde(default)]
    pub mappings: JsonMap,
    /// Index → settings.
    #[serde(default)]
    pub settings: JsonMap,
}

impl Default for MetaScope {
    fn default() -> Self {
        Self::All
    }
}

impl Metadata {
    /// Iterates `(index, type, field)` triples in mapping walk order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.mappings.iter().flat_map(|(index, types)| {
            types
                .as_object()
                .into_iter()
                .flat_map(move |types| {
                    types.iter().flat_map(move |(doc_type, fields)| {
                        fields.as_object().into_iter().flat_map(move |fields| {
                            fields
                                .keys()
                                .map(move |field| (index.as_str(), doc_type.as_str(), field.as_str()))
                        })
                    })
                })
        })
    }
}

/// One page of documents from a source driver.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Documents in this page. Empty means the source is exhausted.
    pub docs: Vec<Document>,
    /// Total documents matching the query, as reported by the backend.
    pub total: u64,
}

/// The capability set every backend implements.
///
/// Operations a driver cannot perform in a given role fail with
/// [`crate::Error::Unsupported`]; they never silently no-op.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Declares identity and the recognized option schema. No side effects.
    fn info(&self) -> DriverInfo;

    /// Validates resolved options for the given role. A non-empty list of
    /// messages aborts the run before any I/O.
    fn verify_options(&self, role: Role) -> Vec<String>;

    /// Clears per-run state (cursors, column maps). Idempotent; callable
    /// before any other operation.
    async fn reset(&mut self) -> Result<()>;

    /// Backend health/identity when acting as a source.
    async fn source_stats(&self) -> Result<BackendStats>;

    /// Backend health/identity when acting as a target.
    async fn target_stats(&self) -> Result<BackendStats>;

    /// Reads schema metadata from the backend.
    async fn get_meta(&mut self) -> Result<Metadata>;

    /// Replicates schema metadata into the backend.
    async fn put_meta(&mut self, meta: &Metadata) -> Result<()>;

    /// Fetches the next page of documents. An empty batch signals
    /// exhaustion.
    async fn get_data(&mut self) -> Result<Batch>;

    /// Writes one batch of documents. The caller controls batch size.
    async fn put_data(&mut self, docs: &[Document]) -> Result<()>;

    /// Releases held resources. A no-op is permitted.
    async fn end(&mut self) -> Result<()>;
}

/// Builds the driver described by `config`.
#[must_use]
pub fn create_driver(config: &DriverConfig, options: &TransferOptions) -> Box<dyn Driver> {
    match config {
        DriverConfig::Elasticsearch(cfg) => {
            Box::new(elasticsearch::EsDriver::new(cfg.clone(), options))
        }
        DriverConfig::Csv(cfg) => Box::new(csv::CsvDriver::new(cfg.clone())),
        DriverConfig::Kv(cfg) => Box::new(kv::KvDriver::new(cfg.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_wire_names_roundtrip() {
        let raw = json!({
            "_index": "products",
            "_type": "item",
            "_id": "42",
            "_version": 3,
            "_source": {"name": "chair", "price": 20}
        });

        let doc: Document = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.index, "products");
        assert_eq!(doc.doc_type, "item");
        assert_eq!(doc.version, Some(3));
        assert_eq!(doc.source["name"], "chair");

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["_id"], "42");
        assert!(back.get("_routing").is_none());
    }

    #[test]
    fn document_defaults_type_when_absent() {
        let doc: Document =
            serde_json::from_value(json!({"_index": "a", "_id": "1", "_source": {}})).unwrap();
        assert_eq!(doc.doc_type, "_doc");
    }

    #[test]
    fn meta_scope_serde_is_lowercase() {
        assert_eq!(serde_json::to_value(MetaScope::All).unwrap(), json!("all"));
        let scope: MetaScope = serde_json::from_value(json!("type")).unwrap();
        assert_eq!(scope, MetaScope::Type);
    }

    #[test]
    fn metadata_fields_walk_preserves_order() {
        let meta = Metadata {
            scope: MetaScope::Index,
            mappings: serde_json::from_value(json!({
                "shop": {
                    "item": {"name": {"type": "string"}, "price": {"type": "long"}},
                    "order": {"total": {"type": "double"}}
                }
            }))
            .unwrap(),
            settings: JsonMap::new(),
        };

        let fields: Vec<_> = meta.fields().collect();
        assert_eq!(
            fields,
            vec![
                ("shop", "item", "name"),
                ("shop", "item", "price"),
                ("shop", "order", "total"),
            ]
        );
    }

    #[test]
    fn create_driver_dispatches_on_type_tag() {
        let options = TransferOptions::default();

        let csv: DriverConfig =
            serde_yaml::from_str("type: csv\nfile: out.csv").unwrap();
        assert_eq!(create_driver(&csv, &options).info().id, "csv");

        let es: DriverConfig =
            serde_yaml::from_str("type: elasticsearch\nurl: http://localhost:9200").unwrap();
        assert_eq!(create_driver(&es, &options).info().id, "elasticsearch");

        let kv: DriverConfig = serde_yaml::from_str("type: kv").unwrap();
        assert_eq!(create_driver(&kv, &options).info().id, "kv");
    }
}
