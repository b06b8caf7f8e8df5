//! API Module
//!
//! HTTP handlers and routing around the write-back cache.
//!
//! # Endpoints
//! - `GET /users/:id` - Read a user through the cache
//! - `PUT /users/:id` - Write a user back through the cache
//! - `DELETE /users/:id` - Invalidate a cached user
//! - `POST /users/:id/flush` - Persist a cached user immediately
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
