//! Ingest Pipeline Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging setup for the ingest pipeline binaries.
//!
//! # Overview
//!
//! - **Error Handling**: [`PipelineError`] and the [`Result`] alias
//! - **Logging**: [`logging::init_logging`] driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use pipeline_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{PipelineError, Result};
