use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One priced product row from the external catalog. Entries are immutable
/// snapshots for the lifetime of a cache window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product: String,
    /// Unit of measure as published by the catalog (UNIDADE, METROS, KG...).
    pub unit: String,
    pub unit_price: Decimal,
}
