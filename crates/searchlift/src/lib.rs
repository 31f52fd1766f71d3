//! # searchlift
//!
//! `searchlift` moves documents and index mappings between a search cluster
//! and interchangeable sinks/sources ("drivers"). The source side pages
//! through an unbounded result set with a scroll cursor; the target side
//! writes batches through the bulk endpoint or to a delimited file. Both
//! directions retry transient network failures with a fixed delay up to a
//! configured ceiling and abort the run when the ceiling is reached.
//!
//! ## Drivers
//!
//! | Driver | Source | Target | Notes |
//! |--------|--------|--------|-------|
//! | `elasticsearch` | ✅ | ✅ | scroll reads, bulk writes, mapping/settings replication |
//! | `csv` | ❌ | ✅ | stable append-safe column schema derived from mappings |
//! | `kv` | ✅ | ✅ | stub, fixed sample data |
//!
//! ## Quick Start
//!
//! ```bash
//! searchlift run --config migration.yaml
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   type: elasticsearch
//!   url: http://localhost:9200
//!   index: products
//!
//! target:
//!   type: csv
//!   file: products.csv
//!   append: true
//!
//! options:
//!   batch_size: 100
//!   errors_allowed: 3
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod drivers;
pub mod error;
pub mod pipeline;
pub mod retry;

pub use config::{DriverConfig, MigrationConfig, TransferOptions};
pub use drivers::{Batch, Document, Driver, DriverInfo, MetaScope, Metadata, Role};
pub use error::{Error, Result};
pub use pipeline::{MigrationStats, Pipeline};
