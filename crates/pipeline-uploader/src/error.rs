//! HTTP-facing error type for the uploader

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::approvals::ApprovalError;
use crate::identity::IdentityError;
use crate::signer::SignError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("user_not_approved")]
    NotApproved,

    #[error("missing filename")]
    MissingFilename,

    #[error("signed_url_failed: {0}")]
    SignedUrlFailed(#[from] SignError),
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        tracing::warn!(error = %err, "Token verification failed");
        ApiError::Unauthenticated
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        tracing::error!(error = %err, "Approval lookup failed");
        ApiError::NotApproved
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, json!({ "error": "unauthenticated" }))
            },
            ApiError::NotApproved => {
                (StatusCode::FORBIDDEN, json!({ "error": "user_not_approved" }))
            },
            ApiError::MissingFilename => {
                (StatusCode::BAD_REQUEST, json!({ "error": "missing filename" }))
            },
            ApiError::SignedUrlFailed(ref e) => {
                tracing::error!(error = %e, "Signed URL generation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "signed_url_failed", "detail": e.to_string() }),
                )
            },
        };

        (status, Json(body)).into_response()
    }
}
