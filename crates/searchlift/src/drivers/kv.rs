//! Stub key-value driver.
//!
//! Fixed-response implementation showing the contract's minimal viable
//! shape: canned stats, empty metadata, one sample batch followed by
//! exhaustion, and writes that go nowhere. There is no real backend behind
//! it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::drivers::{
    BackendStats, Batch, Document, Driver, DriverInfo, JsonMap, Metadata, Role,
};
use crate::error::Result;

/// Configuration for the stub driver. It recognizes nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KvConfig {}

/// Stub key-value driver.
#[derive(Default)]
pub struct KvDriver {
    exhausted: bool,
}

impl KvDriver {
    /// Creates the stub.
    #[must_use]
    pub fn new(_config: KvConfig) -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for KvDriver {
    fn info(&self) -> DriverInfo {
        DriverInfo {
            id: "kv",
            name: "KV Driver",
            version: "0.0",
            description: "[N/A] A stub key-value driver to import and export data",
            options: Vec::new(),
        }
    }

    fn verify_options(&self, _role: Role) -> Vec<String> {
        Vec::new()
    }

    async fn reset(&mut self) -> Result<()> {
        self.exhausted = false;
        Ok(())
    }

    async fn source_stats(&self) -> Result<BackendStats> {
        Ok(BackendStats {
            version: "1.0.0".to_string(),
            cluster_status: "green".to_string(),
            docs: Some(1),
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
        Ok(Metadata::default())
    }

    async fn put_meta(&mut self, _meta: &Metadata) -> Result<()> {
        Ok(())
    }

    async fn get_data(&mut self) -> Result<Batch> {
        if self.exhausted {
            return Ok(Batch::default());
        }
        self.exhausted = true;

        let source: JsonMap = serde_json::from_value(json!({"sample": true}))?;
        Ok(Batch {
            docs: vec![Document {
                index: "index1".to_string(),
                doc_type: "type1".to_string(),
                id: "1".to_string(),
                version: Some(1),
                routing: None,
                parent: None,
                source,
            }],
            total: 1,
        })
    }

    async fn put_data(&mut self, _docs: &[Document]) -> Result<()> {
        Ok(())
    }

    async fn end(&mut self) -> Result<()> {
        Ok(())
    }
}
