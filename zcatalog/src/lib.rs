#![forbid(unsafe_code)]

pub mod cache;
pub mod catalog;
pub mod error;
pub mod memory;
pub mod pg;
pub mod proxy;
pub mod sql;
pub mod targets;

pub use cache::SearchCache;
pub use catalog::{Catalog, ScanOptions, TermCount};
pub use error::LocalError as CatalogError;
pub use error::LocalResult as CatalogResult;
pub use memory::{BibRecord, MemoryCatalog};
pub use pg::PgCatalog;
pub use proxy::ProxyCatalog;
pub use sql::SqliteCatalog;
pub use targets::{RecordEncoding, Target, TargetRegistry};
