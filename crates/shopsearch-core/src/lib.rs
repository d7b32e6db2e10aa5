//! Shared building blocks for the product search workspace: the record and
//! index-unit data model, the error taxonomy, TOML configuration, and catalog
//! sources.

pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::{CatalogSource, MarkdownCatalog, StaticCatalog};
pub use config::{RebuildPolicy, ShopConfig};
pub use error::{Result, ShopError};
pub use types::*;
