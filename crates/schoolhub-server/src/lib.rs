//! # schoolhub-server
//!
//! Process bootstrap for the SchoolHub core: configuration loading,
//! logging initialisation and construction of the [`AppContext`].

pub mod config;
pub mod context;
pub mod observability;

pub use config::AppConfig;
pub use context::AppContext;
