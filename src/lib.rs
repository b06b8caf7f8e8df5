//! Write-Back Cache - read-through, write-back entity caching
//!
//! Keeps entities in a fast cache store, loads them from a durable store on
//! a miss, and persists writes after a delay or on demand.

pub mod api;
pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod global;
pub mod models;
pub mod store;

pub use api::AppState;
pub use cache::{CacheSettings, CacheStats, WriteBackCache};
pub use config::Config;
pub use entity::{Entity, EntityKey, Row};
pub use error::{CacheError, Result};
