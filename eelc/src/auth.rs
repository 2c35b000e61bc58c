//! Service account credentials and OAuth access tokens.
//!
//! The key file is the JSON document downloaded for a Google service account.
//! Access tokens are obtained with the JWT-bearer grant: an RS256-signed
//! assertion is exchanged at the key's `token_uri` and the result is cached
//! until shortly before it expires.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// OAuth scopes needed to submit exports and list the bucket.
pub const SCOPES: &str = "https://www.googleapis.com/auth/earthengine \
                          https://www.googleapis.com/auth/devstorage.read_only";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the cached token expires.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error(
        "service account key file {path} not found; download the JSON key for the service account and point gcs.private_key at it"
    )]
    MissingKeyFile { path: PathBuf },
    #[error("failed to read service account key {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed service account key {path}: {reason}")]
    MalformedKey { path: PathBuf, reason: String },
    #[error("invalid private key in service account key: {0}")]
    InvalidPrivateKey(#[source] jsonwebtoken::errors::Error),
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service account JSON key that we use.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(content: &str, path: &Path) -> Result<Self, CredentialsError> {
        let key: ServiceAccountKey =
            serde_json::from_str(content).map_err(|e| CredentialsError::MalformedKey {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if key.client_email.is_empty() || key.private_key.is_empty() {
            return Err(CredentialsError::MalformedKey {
                path: path.to_path_buf(),
                reason: "client_email and private_key must be set".to_string(),
            });
        }
        Ok(key)
    }

    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        let content = fs::read_to_string(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => CredentialsError::MissingKeyFile {
                path: path.to_path_buf(),
            },
            _ => CredentialsError::Unreadable {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let key = Self::from_json(&content, path)?;
        info!(
            key_path = %path.display(),
            client_email = %key.client_email,
            "Loaded service account key"
        );
        Ok(key)
    }

    /// Warn when the configured identity is not the one the key belongs to.
    pub fn check_identity(&self, service_account: &str) {
        if self.client_email != service_account {
            warn!(
                configured = %service_account,
                key_email = %self.client_email,
                "Configured service account does not match key file"
            );
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Sign the JWT-bearer assertion for `key`, issued at `now` (unix seconds).
pub fn signed_assertion(key: &ServiceAccountKey, now: i64) -> Result<String, CredentialsError> {
    let claims = Claims {
        iss: key.client_email.clone(),
        scope: SCOPES.to_string(),
        aud: key.token_uri.clone(),
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(CredentialsError::InvalidPrivateKey)?;
    encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(CredentialsError::InvalidPrivateKey)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at - REFRESH_MARGIN_SECS > now
    }
}

/// Hands out bearer tokens for one service account, shared by the API clients.
pub struct TokenProvider {
    http: reqwest::Client,
    key: ServiceAccountKey,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client, key: ServiceAccountKey) -> Self {
        Self {
            http,
            key,
            cached: Mutex::new(None),
        }
    }

    /// A valid access token, exchanging a fresh assertion when needed.
    pub async fn access_token(&self) -> Result<String, CredentialsError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        debug!(token_uri = %self.key.token_uri, "Requesting access token");
        let assertion = signed_assertion(&self.key, now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Token request failed");
                CredentialsError::TokenExchange(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "Token endpoint rejected assertion");
            return Err(CredentialsError::TokenExchange(format!("{status}: {body}")));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialsError::TokenExchange(e.to_string()))?;

        let expires_at = now + token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        info!(expires_at, "Obtained access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}
