//! Pipeline Uploader: issues short-lived upload URLs to approved users
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! `POST /get-signed-url` verifies the caller's bearer token, checks the
//! approval list, and answers with a presigned PUT URL under the upload
//! prefix. Objects uploaded there are what the ingest trigger later loads.
//! Every issued URL is recorded in the audit table in the background.

pub mod approvals;
pub mod audit;
pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod signer;

pub use config::UploaderConfig;
pub use error::{ApiError, ApiResult};
pub use routes::{router, AppState};
