//! Models served over the HTTP API
//!
//! The demo `User` entity and the DTOs used for request and response bodies.

pub mod requests;
pub mod responses;
pub mod user;

// Re-export commonly used types
pub use requests::{GetParams, SetParams, SetUserRequest};
pub use responses::{FlushResponse, HealthResponse, InvalidateResponse, SetResponse, StatsResponse};
pub use user::{User, CREATE_USERS_TABLE, USERS};
