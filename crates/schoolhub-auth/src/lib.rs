//! # schoolhub-auth
//!
//! Access control for SchoolHub: login records backed by the persistent
//! store, opaque session tokens, per-login throttling of failed attempts
//! and a blacklist of login names.
//!
//! ## Modules
//!
//! - [`service`] - [`AccessControl`], the login protocol
//! - [`record`] - login keys, records, principals and sessions
//! - [`password`] - Argon2id hashing
//! - [`token`] - token minting
//! - [`rate_limit`] - the failed-attempt token bucket
//! - [`blacklist`] - denied login names
//! - [`directory`] - student lookup for provisioning on first login
//! - [`settings`] - the remembered default password
//! - [`config`] - [`AccessConfig`]

pub mod blacklist;
pub mod config;
pub mod directory;
pub mod password;
pub mod rate_limit;
pub mod record;
pub mod service;
pub mod settings;
pub mod token;

pub use config::{AccessConfig, ConfigError, HashingConfig, RateLimitConfig};
pub use directory::StudentDirectory;
pub use record::{IssuedToken, LoginKey, LoginRecord, Principal, PrincipalType, Session};
pub use service::AccessControl;
