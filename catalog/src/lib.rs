//! # Shop Catalog
//!
//! The read-only knowledge the assistant answers from:
//!
//! - **Shop records**: normalized shop entries parsed from raw JSON uploads
//! - **Shop record store**: id-keyed catalog with JSON snapshots on disk
//! - **Ingestion**: embedding records and loading them into the semantic index
//!
//! ```text
//! raw JSON ──► RawShop ──► ShopRecord ──► ShopCatalog
//!                              │
//!                              ▼
//!                 Ingestor ──► SimilarityIndex (metadata = ShopRecord)
//! ```

pub mod error;
pub mod ingest;
pub mod record;
pub mod store;

pub use error::{CatalogError, Result};
pub use ingest::{IngestReport, Ingestor};
pub use record::{RawShop, ShopRecord, parse_shops};
pub use store::ShopCatalog;
