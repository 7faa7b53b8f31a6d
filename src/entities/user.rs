// 👤 User Entity
//
// A person who can join groups and pay rounds. The password hash lives
// on the struct so the store can hand it to the auth layer, but it is
// never serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// USER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,

    #[serde(skip)]
    pub hashed_password: String,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// CREATION PAYLOAD
// ============================================================================

/// Registration request: plain password in, hash stored.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl NewUser {
    pub fn new(email: &str, username: &str, password: &str) -> Self {
        NewUser {
            email: email.trim().to_string(),
            username: username.trim().to_string(),
            password: password.to_string(),
        }
    }

    /// Reject obviously unusable registrations before touching the store
    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(Error::Validation(format!("invalid email: '{}'", self.email)));
        }
        if self.username.trim().is_empty() {
            return Err(Error::Validation("username must not be empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(Error::Validation("password must not be empty".to_string()));
        }
        Ok(())
    }
}
