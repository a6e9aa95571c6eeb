//! Focusguard Core - Shared functionality for the focusguard tools
//!
//! Paths, configuration and small formatting helpers used by the
//! blocking-state synchronizer and its command line front end.

pub mod config;
pub mod format;
pub mod paths;

pub use config::{Config, ConfigError};
pub use paths::Paths;
