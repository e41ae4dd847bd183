//! Signup Sync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the signup-sync workspace members:
//!
//! - **Logging**: `tracing` subscriber setup (console, rotating file, text or JSON)
//! - **Environment**: typed readers for configuration variables
//! - **Errors**: the common error type those readers return
//!
//! # Example
//!
//! ```no_run
//! use signup_common::env;
//! use signup_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let batch_size: usize = env::parse_or("SYNC_BATCH_SIZE", 20)?;
//!     tracing::info!(batch_size, "configured");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
