//! Manifest Mirror Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the manifest-mirror workspace:
//!
//! - **Logging**: tracing subscriber setup with console/file output
//! - **Identifiers**: validation helpers for names that end up inside SQL
//!
//! # Example
//!
//! ```no_run
//! use mirror_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

pub mod ident;
pub mod logging;
