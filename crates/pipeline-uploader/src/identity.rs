//! Caller identity from bearer tokens
//!
//! Verification is delegated to an external endpoint; this module only moves
//! the token there and reads back who it belongs to.

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("token rejected with status {0}")]
    Rejected(u16),

    #[error("verification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("verifier returned an identity without uid")]
    MissingUid,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// Token from an `Authorization: Bearer <token>` header, if present and non-blank.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

/// POSTs `{"token": ...}` to the configured endpoint and expects
/// `{"uid": ..., "email": ...}` back on success.
#[derive(Debug, Clone)]
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpIdentityVerifier {
    pub fn new(verify_url: impl Into<String>) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            verify_url: verify_url.into(),
        })
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    #[instrument(skip(self, token))]
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&VerifyRequest { token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::Rejected(status.as_u16()));
        }

        let identity: Identity = response.json().await?;
        if identity.uid.trim().is_empty() {
            return Err(IdentityError::MissingUid);
        }

        debug!(uid = %identity.uid, "Token verified");
        Ok(identity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok-123"));
        assert_eq!(bearer_token(&headers), Some("tok-123"));
    }

    #[tokio::test]
    async fn test_verify_accepts_valid_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_json(json!({ "token": "good" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "uid": "u-1", "email": "a@example.com" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let verifier = HttpIdentityVerifier::new(format!("{}/verify", server.uri())).unwrap();
        let identity = verifier.verify("good").await.unwrap();

        assert_eq!(identity.uid, "u-1");
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn test_verify_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let verifier = HttpIdentityVerifier::new(format!("{}/verify", server.uri())).unwrap();
        let err = verifier.verify("bad").await.unwrap_err();
        assert!(matches!(err, IdentityError::Rejected(401)));
    }

    #[tokio::test]
    async fn test_verify_requires_uid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uid": "" })))
            .mount(&server)
            .await;

        let verifier = HttpIdentityVerifier::new(server.uri()).unwrap();
        let err = verifier.verify("x").await.unwrap_err();
        assert!(matches!(err, IdentityError::MissingUid));
    }
}
