//! Request DTOs for the HTTP API
//!
//! Defines the structure of incoming request bodies and query strings.

use serde::Deserialize;

use crate::models::User;

/// Request body for `PUT /users/:id`
#[derive(Debug, Clone, Deserialize)]
pub struct SetUserRequest {
    pub name: String,
    pub passwd: String,
    #[serde(default)]
    pub descp: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub birthday: i64,
}

impl SetUserRequest {
    /// Validates the request data against the column widths of `users`.
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.name.is_empty() {
            return Some("Name cannot be empty".to_string());
        }
        if self.name.chars().count() > 32 {
            return Some("Name exceeds maximum length of 32 characters".to_string());
        }
        if self.passwd.chars().count() > 64 {
            return Some("Password exceeds maximum length of 64 characters".to_string());
        }
        if self.descp.chars().count() > 200 {
            return Some("Description exceeds maximum length of 200 characters".to_string());
        }
        None
    }

    /// Builds the entity stored under `id`.
    pub fn into_user(self, id: i64) -> User {
        User {
            id,
            name: self.name,
            passwd: self.passwd,
            descp: self.descp,
            created: self.created,
            birthday: self.birthday,
        }
    }
}

/// Query string of `GET /users/:id`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetParams {
    /// Eviction timeout in seconds; absent or `<= 0` uses the default
    #[serde(default)]
    pub evict: i64,
}

/// Query string of `PUT /users/:id`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetParams {
    /// Flush timeout in seconds; absent or `<= 0` uses the default
    #[serde(default)]
    pub flush: i64,
}
