//! Entity Module
//!
//! The codec contract every cached entity type implements, plus the
//! composite key used for all cache and timer lookups.

use std::fmt;

use serde::Serialize;

use crate::error::Result;

/// Adapter-neutral shape of one durable-store row, column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

// == Entity Key ==
/// Identifies one cached row: a collection (table) and an integer id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityKey {
    pub collection: String,
    pub id: i64,
}

impl EntityKey {
    pub fn new(collection: impl Into<String>, id: i64) -> Self {
        Self {
            collection: collection.into(),
            id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.collection, self.id)
    }
}

// == Entity Codec ==
/// Conversion contract between a domain entity, its cached payload and the
/// durable store.
///
/// The cache never inspects payloads or statements. Implementations own the
/// byte format, column mapping and any escaping needed by the statement.
pub trait Entity: Sized + Send + Sync {
    /// Builds the entity from a row returned by the durable store.
    fn from_row(row: Row) -> Result<Self>;

    /// Produces the statement that persists the current state of the entity.
    fn update_statement(&self) -> Result<String>;

    /// Serializes the entity into the opaque cache payload.
    fn encode(&self) -> Result<Vec<u8>>;

    /// Restores the entity from a cache payload.
    fn decode(bytes: &[u8]) -> Result<Self>;
}
