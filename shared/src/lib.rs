//! Shared library for the NFS-e integration workspace
//!
//! This library contains functionality used by the integration crate and its binary:
//! - Environment-driven configuration
//! - Common value types (target systems, query periods)
//! - Tax ID, money and date helpers

pub mod config;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::IntegrationConfig;
pub use types::*;
