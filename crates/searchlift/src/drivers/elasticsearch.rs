//! Elasticsearch driver: scroll-based bulk reads, bulk writes, and index
//! metadata replication.
//!
//! The read path opens a scan search with a scroll cursor and pages through
//! the result set; the write path ships batches through `_bulk`. Both
//! directions retry transient transport failures with a fixed delay up to
//! the configured ceiling, each with its own counter. A scroll cursor is
//! only valid for [`SCROLL_WINDOW`] on the server; the engine never restarts
//! an expired scroll.

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TransferOptions;
use crate::drivers::{
    BackendStats, Batch, Document, Driver, DriverInfo, JsonMap, MetaScope, Metadata, OptionDef,
    Role,
};
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryPolicy};

/// Server-side validity window requested for scroll cursors.
pub const SCROLL_WINDOW: &str = "5m";

/// Cap on pooled connections per host, bounding metadata fan-out.
const MAX_SOCKETS: usize = 30;

/// Meta-fields requested alongside every document body.
const META_FIELDS: [&str; 7] = [
    "_source",
    "_timestamp",
    "_version",
    "_routing",
    "_percolate",
    "_parent",
    "_ttl",
];

/// Configuration for the Elasticsearch driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsConfig {
    /// Cluster URL (e.g. `http://localhost:9200`).
    pub url: String,
    /// Restrict the run to one index. On the target side this renames the
    /// destination index.
    #[serde(default)]
    pub index: Option<String>,
    /// Restrict the run to one type within `index`. On the target side this
    /// renames the destination type.
    #[serde(default)]
    pub doc_type: Option<String>,
    /// Query body documents must match; defaults to `match_all`.
    #[serde(default)]
    pub query: Option<Value>,
    /// Treat an unparseable search response as an empty page instead of
    /// failing the run.
    #[serde(default)]
    pub lenient_parse: bool,
}

/// Search response for both the scan request and subsequent scroll pages.
#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Option<HitsContainer>,
}

#[derive(Debug, Deserialize)]
struct HitsContainer {
    #[serde(default)]
    total: TotalHits,
    #[serde(default)]
    hits: Vec<Document>,
}

/// Old clusters report `total` as a bare number, newer ones as an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object {
        value: u64,
    },
}

impl Default for TotalHits {
    fn default() -> Self {
        Self::Count(0)
    }
}

impl TotalHits {
    fn value(&self) -> u64 {
        match self {
            Self::Count(n) | Self::Object { value: n } => *n,
        }
    }
}

/// One parsed page of the scroll, before cursor bookkeeping.
struct ScrollPage {
    scroll_id: Option<String>,
    docs: Vec<Document>,
    total: u64,
}

/// Elasticsearch driver, usable as source and target.
pub struct EsDriver {
    config: EsConfig,
    client: Client,
    batch_size: usize,
    retry: RetryPolicy,
    scroll_id: Option<String>,
}

impl EsDriver {
    /// Creates a driver with a pooled HTTP client sized for metadata
    /// fan-out.
    #[must_use]
    pub fn new(config: EsConfig, options: &TransferOptions) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(MAX_SOCKETS)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            config,
            client,
            batch_size: options.batch_size,
            retry: RetryPolicy::new(options.errors_allowed),
            scroll_id: None,
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Builds the scan query body, scoped by the configured index/type.
    fn build_query(&self) -> Value {
        let query = self
            .config
            .query
            .clone()
            .unwrap_or_else(|| json!({ "match_all": {} }));

        let mut body = json!({
            "fields": META_FIELDS,
            "size": self.batch_size,
            "query": query.clone(),
        });

        if let Some(index) = &self.config.index {
            body["query"] = json!({
                "indices": {
                    "indices": [index],
                    "query": query,
                    "no_match_query": "none",
                }
            });
            if let Some(doc_type) = &self.config.doc_type {
                body["filter"] = json!({ "type": { "value": doc_type } });
            }
        }

        body
    }

    /// Issues one page request: the initial scan when no cursor is held,
    /// otherwise the next scroll page for the held cursor.
    async fn fetch_page(&self, scroll_id: Option<&str>) -> Result<ScrollPage> {
        const OP: &str = "fetching data";
        let base = self.base_url();

        let request = match scroll_id {
            Some(cursor) => self
                .client
                .post(format!("{base}/_search/scroll?scroll={SCROLL_WINDOW}"))
                .body(cursor.to_string()),
            None => self
                .client
                .post(format!(
                    "{base}/_search?search_type=scan&scroll={SCROLL_WINDOW}"
                ))
                .json(&self.build_query()),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(OP, &e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(OP, &e))?;

        if !status.is_success() {
            return Err(Error::Backend {
                status: status.as_u16(),
                message: text,
            });
        }

        let parsed: ScrollResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) if self.config.lenient_parse => {
                warn!("treating unparseable search response as empty page: {}", e);
                return Ok(ScrollPage {
                    scroll_id: None,
                    docs: Vec::new(),
                    total: 0,
                });
            }
            Err(e) => {
                return Err(Error::MalformedResponse {
                    operation: OP,
                    message: e.to_string(),
                })
            }
        };

        let (docs, total) = match parsed.hits {
            Some(hits) => (hits.hits, hits.total.value()),
            None => (Vec::new(), 0),
        };

        Ok(ScrollPage {
            scroll_id: parsed.scroll_id,
            docs,
            total,
        })
    }

    /// Renders a batch as newline-delimited bulk actions. Target-side
    /// index/type overrides apply here.
    fn render_bulk(&self, docs: &[Document]) -> Result<String> {
        let mut body = String::new();

        for doc in docs {
            let index = self.config.index.as_deref().unwrap_or(&doc.index);
            let doc_type = self.config.doc_type.as_deref().unwrap_or(&doc.doc_type);

            let mut action = JsonMap::new();
            action.insert("_index".to_string(), json!(index));
            action.insert("_type".to_string(), json!(doc_type));
            action.insert("_id".to_string(), json!(doc.id));
            if let Some(version) = doc.version {
                action.insert("_version".to_string(), json!(version));
                action.insert("version_type".to_string(), json!("external"));
            }
            if let Some(routing) = &doc.routing {
                action.insert("_routing".to_string(), json!(routing));
            }
            if let Some(parent) = &doc.parent {
                action.insert("_parent".to_string(), json!(parent));
            }

            body.push_str(&serde_json::to_string(&json!({ "index": action }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&doc.source)?);
            body.push('\n');
        }

        Ok(body)
    }

    /// `PUT /{index}` with settings and mappings; non-success is an error.
    async fn create_index(&self, index: &str, body: Value) -> Result<()> {
        const OP: &str = "creating index";
        let url = format!("{}/{}", self.base_url(), index);

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(OP, &e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(OP, &e))?;

        if !status.is_success() {
            return Err(Error::Backend {
                status: status.as_u16(),
                message: text,
            });
        }
        debug!("created index {}", index);
        Ok(())
    }

    async fn get_json(&self, operation: &'static str, url: &str) -> Result<JsonMap> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transport(operation, &e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(operation, &e))?;

        if !status.is_success() {
            return Err(Error::Backend {
                status: status.as_u16(),
                message: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| Error::MalformedResponse {
            operation,
            message: e.to_string(),
        })
    }

    async fn fetch_stats(&self) -> Result<BackendStats> {
        let base = self.base_url();

        let root = self.get_json("reading stats", base).await?;
        let version = root
            .get("version")
            .and_then(|v| v.get("number"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let health = self
            .get_json("reading stats", &format!("{base}/_cluster/health"))
            .await?;
        let cluster_status = health
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let count_url = match &self.config.index {
            Some(index) => format!("{base}/{index}/_count"),
            None => format!("{base}/_count"),
        };
        let docs = self
            .get_json("reading stats", &count_url)
            .await
            .ok()
            .and_then(|c| c.get("count").and_then(Value::as_u64));

        Ok(BackendStats {
            version,
            cluster_status,
            docs,
        })
    }
}

/// Re-wraps a normalized type map for index creation: each type's fields go
/// back under `properties`.
fn mappings_body(types: &Value) -> Value {
    let mut out = JsonMap::new();
    if let Some(types) = types.as_object() {
        for (doc_type, fields) in types {
            out.insert(doc_type.clone(), json!({ "properties": fields }));
        }
    }
    Value::Object(out)
}

/// Normalizes a `_mapping` response to index → type → field → definition,
/// stripping the `mappings` and `properties` wrappers where present.
fn normalize_mappings(raw: JsonMap) -> JsonMap {
    let mut out = JsonMap::new();

    for (index, value) in raw {
        let types = value
            .as_object()
            .map(|obj| match obj.get("mappings").and_then(Value::as_object) {
                Some(inner) => inner.clone(),
                None => obj.clone(),
            })
            .unwrap_or_default();

        let mut normalized = JsonMap::new();
        for (doc_type, mapping) in types {
            let fields = mapping
                .as_object()
                .and_then(|m| m.get("properties"))
                .cloned()
                .unwrap_or(mapping);
            normalized.insert(doc_type, fields);
        }
        out.insert(index, Value::Object(normalized));
    }

    out
}

/// Normalizes a `_settings` response to index → settings.
fn normalize_settings(raw: JsonMap) -> JsonMap {
    let mut out = JsonMap::new();

    for (index, value) in raw {
        let settings = value
            .as_object()
            .and_then(|obj| obj.get("settings"))
            .cloned()
            .unwrap_or(value);
        out.insert(index, settings);
    }

    out
}

#[async_trait]
impl Driver for EsDriver {
    fn info(&self) -> DriverInfo {
        DriverInfo {
            id: "elasticsearch",
            name: "Elasticsearch Driver",
            version: "1.0",
            description: "A driver that exports and imports data and mappings over scroll/bulk HTTP",
            options: vec![
                OptionDef {
                    name: "url",
                    abbr: "u",
                    help: "The cluster to connect to",
                    flag: false,
                    default: None,
                    required: true,
                },
                OptionDef {
                    name: "index",
                    abbr: "i",
                    help: "The index to restrict the run to (renames the destination on the target side)",
                    flag: false,
                    default: None,
                    required: false,
                },
                OptionDef {
                    name: "doc_type",
                    abbr: "t",
                    help: "The type within the index to restrict the run to",
                    flag: false,
                    default: None,
                    required: false,
                },
                OptionDef {
                    name: "query",
                    abbr: "q",
                    help: "Query body documents must match",
                    flag: false,
                    default: Some("{\"match_all\":{}}"),
                    required: false,
                },
                OptionDef {
                    name: "lenient_parse",
                    abbr: "l",
                    help: "Treat unparseable search responses as empty pages instead of failing",
                    flag: true,
                    default: Some("false"),
                    required: false,
                },
            ],
        }
    }

    fn verify_options(&self, _role: Role) -> Vec<String> {
        let mut errors = Vec::new();

        if !self.config.url.starts_with("http://") && !self.config.url.starts_with("https://") {
            errors.push(format!(
                "Invalid URL scheme in '{}', expected http or https",
                self.config.url
            ));
        }
        if self.config.doc_type.is_some() && self.config.index.is_none() {
            errors.push("doc_type requires index to be set".to_string());
        }

        errors
    }

    async fn reset(&mut self) -> Result<()> {
        self.scroll_id = None;
        Ok(())
    }

    async fn source_stats(&self) -> Result<BackendStats> {
        self.fetch_stats().await
    }

    async fn target_stats(&self) -> Result<BackendStats> {
        self.fetch_stats().await
    }

    async fn get_meta(&mut self) -> Result<Metadata> {
        const OP: &str = "reading metadata";
        info!("Reading mapping from {}", self.config.url);
        let base = self.base_url();

        let mapping_url = match (&self.config.index, &self.config.doc_type) {
            (Some(index), Some(doc_type)) => format!("{base}/{index}/{doc_type}/_mapping"),
            (Some(index), None) => format!("{base}/{index}/_mapping"),
            _ => format!("{base}/_mapping"),
        };
        let mappings = normalize_mappings(self.get_json(OP, &mapping_url).await?);

        let scope = if self.config.doc_type.is_some() {
            MetaScope::Type
        } else if self.config.index.is_some() {
            MetaScope::Index
        } else {
            MetaScope::All
        };

        // Type scope replicates a single mapping; settings stay untouched.
        let settings = if scope == MetaScope::Type {
            JsonMap::new()
        } else {
            let settings_url = match &self.config.index {
                Some(index) => format!("{base}/{index}/_settings"),
                None => format!("{base}/_settings"),
            };
            normalize_settings(self.get_json(OP, &settings_url).await?)
        };

        Ok(Metadata {
            scope,
            mappings,
            settings,
        })
    }

    async fn put_meta(&mut self, meta: &Metadata) -> Result<()> {
        const OP: &str = "writing metadata";
        info!(
            "Creating {} scope mapping in target cluster {}",
            meta.scope, self.config.url
        );
        let base = self.base_url();

        match meta.scope {
            MetaScope::Type => {
                let (src_index, types) = meta.mappings.iter().next().ok_or_else(|| {
                    Error::Config("type-scope metadata carries no mapping".to_string())
                })?;
                let (src_type, fields) = types
                    .as_object()
                    .and_then(|types| types.iter().next())
                    .ok_or_else(|| {
                        Error::Config("type-scope metadata carries no type".to_string())
                    })?;

                let index = self.config.index.as_deref().unwrap_or(src_index);
                let doc_type = self.config.doc_type.as_deref().unwrap_or(src_type);

                // The index usually exists already; creation failure is not
                // fatal here, the mapping write below is.
                if let Err(e) = self.create_index(index, json!({})).await {
                    debug!("index creation skipped: {}", e);
                }

                let mut body = JsonMap::new();
                body.insert(doc_type.to_string(), json!({ "properties": fields }));

                let url = format!("{base}/{index}/{doc_type}/_mapping");
                let response = self
                    .client
                    .put(&url)
                    .json(&Value::Object(body))
                    .send()
                    .await
                    .map_err(|e| Error::transport(OP, &e))?;
                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| Error::transport(OP, &e))?;
                if !status.is_success() {
                    return Err(Error::Backend {
                        status: status.as_u16(),
                        message: text,
                    });
                }
                Ok(())
            }
            MetaScope::Index => {
                let (src_index, types) = meta.mappings.iter().next().ok_or_else(|| {
                    Error::Config("index-scope metadata carries no mapping".to_string())
                })?;
                let index = self.config.index.as_deref().unwrap_or(src_index);

                let body = json!({
                    "settings": meta.settings.get(src_index).cloned().unwrap_or_else(|| json!({})),
                    "mappings": mappings_body(types),
                });
                self.create_index(index, body).await
            }
            MetaScope::All => {
                // One independent creation per source index; completion is a
                // join over all of them, first failure wins.
                let creations = meta.mappings.iter().map(|(index, types)| {
                    let body = json!({
                        "settings": meta.settings.get(index).cloned().unwrap_or_else(|| json!({})),
                        "mappings": mappings_body(types),
                    });
                    self.create_index(index, body)
                });
                try_join_all(creations).await?;
                Ok(())
            }
        }
    }

    async fn get_data(&mut self) -> Result<Batch> {
        let driver: &EsDriver = self;
        let cursor = driver.scroll_id.as_deref();
        let page = with_retry(&driver.retry, "fetching data", move || {
            driver.fetch_page(cursor)
        })
        .await?;

        if let Some(cursor) = page.scroll_id {
            self.scroll_id = Some(cursor);
        }

        Ok(Batch {
            docs: page.docs,
            total: page.total,
        })
    }

    async fn put_data(&mut self, docs: &[Document]) -> Result<()> {
        const OP: &str = "writing data";
        if docs.is_empty() {
            return Ok(());
        }

        let driver: &EsDriver = self;
        let body = driver.render_bulk(docs)?;
        let url = format!("{}/_bulk", driver.base_url());

        with_retry(&driver.retry, OP, move || {
            // The identical batch is reissued on every attempt.
            let request = driver
                .client
                .post(url.clone())
                .header("Content-Type", "application/x-ndjson")
                .body(body.clone());
            async move {
                let response = request.send().await.map_err(|e| Error::transport(OP, &e))?;
                let status = response.status();
                // The body must be drained even though its content is
                // irrelevant, otherwise the pooled connection is not freed.
                let text = response
                    .text()
                    .await
                    .map_err(|e| Error::transport(OP, &e))?;
                if !status.is_success() {
                    return Err(Error::Backend {
                        status: status.as_u16(),
                        message: text,
                    });
                }
                Ok(())
            }
        })
        .await
    }

    async fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "elasticsearch_tests.rs"]
mod tests;
