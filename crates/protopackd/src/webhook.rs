//! Webhook delivery validation and push payload parsing.
//!
//! Only `push` deliveries become [`PushEvent`]s. Every other event type,
//! `ping` included, is rejected.

use axum::http::HeaderMap;
use chrono::DateTime;
use hmac::{Hmac, Mac};
use protopack_core::PushEvent;
use serde::Deserialize;
use sha2::Sha256;

pub const EVENT_HEADER: &str = "x-github-event";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("a secure parser needs a non-empty secret")]
    EmptySecret,

    #[error("missing {EVENT_HEADER} header")]
    MissingEvent,

    #[error("event was not a push event: {0}")]
    UnsupportedEvent(String),

    #[error("missing {SIGNATURE_HEADER} header")]
    MissingSignature,

    #[error("payload signature does not match")]
    BadSignature,

    #[error("error parsing webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("push payload has no usable {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    after: String,
    repository: RepositoryPayload,
    head_commit: Option<CommitPayload>,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    name: String,
    clone_url: String,
    owner: OwnerPayload,
    pushed_at: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OwnerPayload {
    login: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitPayload {
    id: String,
}

/// Validates deliveries and extracts push events.
#[derive(Clone)]
pub struct Parser {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("secure", &self.secret.is_some())
            .finish()
    }
}

impl Parser {
    /// Parser that requires every delivery to be signed with `secret`.
    pub fn secure(secret: &str) -> Result<Self, WebhookError> {
        if secret.is_empty() {
            return Err(WebhookError::EmptySecret);
        }
        Ok(Self {
            secret: Some(secret.as_bytes().to_vec()),
        })
    }

    /// Parser that accepts unsigned deliveries. Local development only.
    pub fn insecure() -> Self {
        Self { secret: None }
    }

    pub fn is_secure(&self) -> bool {
        self.secret.is_some()
    }

    /// Validate a delivery and return the push event it carries.
    pub fn parse_push(&self, headers: &HeaderMap, body: &[u8]) -> Result<PushEvent, WebhookError> {
        let event = header(headers, EVENT_HEADER).ok_or(WebhookError::MissingEvent)?;
        if let Some(secret) = &self.secret {
            let signature =
                header(headers, SIGNATURE_HEADER).ok_or(WebhookError::MissingSignature)?;
            verify_signature(secret, body, signature)?;
        }
        if event != "push" {
            return Err(WebhookError::UnsupportedEvent(event.to_string()));
        }

        let payload: PushPayload = serde_json::from_slice(body)?;
        let owner = payload
            .repository
            .owner
            .login
            .or(payload.repository.owner.name)
            .filter(|o| !o.is_empty())
            .ok_or(WebhookError::MissingField("repository.owner.login"))?;
        let pushed_at = payload
            .repository
            .pushed_at
            .as_ref()
            .and_then(timestamp)
            .ok_or(WebhookError::MissingField("repository.pushed_at"))?;
        let head_commit = payload
            .head_commit
            .map(|c| c.id)
            .unwrap_or(payload.after);

        Ok(PushEvent {
            git_ref: payload.git_ref,
            clone_url: payload.repository.clone_url,
            owner,
            name: payload.repository.name,
            head_commit,
            pushed_at,
        })
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> Result<(), WebhookError> {
    let expected = signature
        .strip_prefix(SIGNATURE_PREFIX)
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or(WebhookError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::BadSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::BadSignature)
}

/// Push payloads carry `pushed_at` as epoch seconds; other deliveries use RFC 3339.
fn timestamp(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.timestamp()),
        _ => None,
    }
}
