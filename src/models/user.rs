//! User Entity
//!
//! The entity served by the HTTP surface, stored in the `users` table.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, Row};
use crate::error::{CacheError, Result};

/// Collection (table) holding users.
pub const USERS: &str = "users";

/// Schema of the `users` table.
pub const CREATE_USERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS users (\
    id INTEGER PRIMARY KEY, \
    name VARCHAR(32) NOT NULL, \
    passwd VARCHAR(64) NOT NULL, \
    descp VARCHAR(200) NOT NULL DEFAULT '', \
    created INTEGER NOT NULL DEFAULT 0, \
    birthday INTEGER NOT NULL DEFAULT 0)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub passwd: String,
    #[serde(default)]
    pub descp: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub birthday: i64,
}

/// Quotes a string literal for SQL, doubling embedded single quotes.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl Entity for User {
    fn from_row(row: Row) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(row))?)
    }

    fn update_statement(&self) -> Result<String> {
        if self.name.is_empty() {
            return Err(CacheError::Codec("user name must not be empty".to_string()));
        }
        Ok(format!(
            "UPDATE {} SET name={}, passwd={}, descp={}, created={}, birthday={} WHERE id={}",
            USERS,
            quote(&self.name),
            quote(&self.passwd),
            quote(&self.descp),
            self.created,
            self.birthday,
            self.id
        ))
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
