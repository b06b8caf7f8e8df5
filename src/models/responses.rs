//! Response DTOs for the HTTP API
//!
//! Defines the structure of outgoing response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, FailedFlush};

/// Response body for `PUT /users/:id`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub id: i64,
}

impl SetResponse {
    pub fn new(id: i64) -> Self {
        Self {
            message: format!("User {} cached, write scheduled", id),
            id,
        }
    }
}

/// Response body for `POST /users/:id/flush`
#[derive(Debug, Clone, Serialize)]
pub struct FlushResponse {
    pub message: String,
    pub id: i64,
}

impl FlushResponse {
    pub fn new(id: i64) -> Self {
        Self {
            message: format!("User {} flushed", id),
            id,
        }
    }
}

/// Response body for `DELETE /users/:id`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    pub id: i64,
}

impl InvalidateResponse {
    pub fn new(id: i64) -> Self {
        Self {
            message: format!("User {} invalidated", id),
            id,
        }
    }
}

/// Response body for `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Most recent rejected durable writes
    pub failed_flushes: Vec<FailedFlush>,
}

impl StatsResponse {
    pub fn new(stats: CacheStats, failed_flushes: Vec<FailedFlush>) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
            failed_flushes,
        }
    }
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_response_serialize() {
        let json = serde_json::to_string(&SetResponse::new(7)).unwrap();
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("scheduled"));
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let mut stats = CacheStats::new();
        stats.hits = 8;
        stats.misses = 2;
        let json = serde_json::to_value(StatsResponse::new(stats, Vec::new())).unwrap();

        assert_eq!(json["hits"], 8);
        assert_eq!(json["misses"], 2);
        assert!((json["hit_rate"].as_f64().unwrap() - 0.8).abs() < 0.001);
        assert!(json["failed_flushes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_health_response_serialize() {
        let json = serde_json::to_string(&HealthResponse::healthy()).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
