// Whose Round - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod config;
pub mod telemetry;
pub mod entities;
pub mod db;
pub mod rotation;
pub mod auth;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{Error, Result};
pub use crate::config::Settings;
pub use entities::{Group, Member, NewGroup, NewRound, NewUser, Round, User};
pub use db::{
    open_database, setup_database,
    insert_user, get_user, get_user_by_email,
    insert_group, get_group, group_exists, list_groups,
    add_member, get_members,
    insert_round, insert_round_at, get_last_round, get_rounds_for_group,
    count_rounds, export_rounds_csv,
};
pub use rotation::{latest_round, next_payer, RotationResolver};
pub use auth::{authenticate, register, AccessToken, PasswordService, TokenService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
