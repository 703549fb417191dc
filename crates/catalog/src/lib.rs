//! Product catalog access: a published price table fetched over HTTP with a
//! short in-memory cache and relevance-scored search.

pub mod service;
pub mod source;

pub use service::{Catalog, SEARCH_LIMIT};
pub use source::{CatalogError, HttpPriceSource, PriceSource};
