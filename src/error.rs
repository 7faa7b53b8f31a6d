use thiserror::Error;

/// Everything that can go wrong while serving a request or running a command.
///
/// Every variant is terminal for the call that produced it; nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// A referenced group or user does not exist
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// The group exists but nobody has joined it yet
    #[error("No members in group")]
    NoMembers,

    /// A unique field (email, username, membership) is already taken
    #[error("{0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Password hashing or token machinery failed
    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub fn not_found(entity: &'static str) -> Self {
        Error::NotFound { entity }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_human_readable() {
        assert_eq!(Error::not_found("Group").to_string(), "Group not found");
        assert_eq!(Error::NoMembers.to_string(), "No members in group");
        assert_eq!(
            Error::Conflict("Email already registered".to_string()).to_string(),
            "Email already registered"
        );
    }
}
