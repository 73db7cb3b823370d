//! Service-account identities and access-token sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OAuth scope covering every Cloud Platform API.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Errors resolving identities or access tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid service account key: {0}")]
    InvalidKey(String),

    #[error("failed to read key file '{path}': {reason}")]
    KeyFile { path: PathBuf, reason: String },

    #[error("access token unavailable: {0}")]
    Token(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// JSON service-account key, as downloaded from the cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: String,
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: String,
    #[serde(default)]
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> AuthResult<Self> {
        let key: Self =
            serde_json::from_str(json).map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        if key.project_id.is_empty() {
            return Err(AuthError::InvalidKey("project_id is empty".into()));
        }
        Ok(key)
    }

    pub fn from_file(path: &Path) -> AuthResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| AuthError::KeyFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&contents)
    }
}

/// Where an identity was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// Named entry in the host's credential store.
    Account(String),
    /// Key file on disk.
    KeyFile(PathBuf),
}

/// A usable identity for talking to cloud APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub source: IdentitySource,
    pub key: ServiceAccountKey,
}

impl Identity {
    pub fn project_id(&self) -> &str {
        &self.key.project_id
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }
}

/// Supplies bearer tokens for API requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self, scope: &str) -> AuthResult<String>;
}

/// OAuth grant exchanging a signed assertion for an access token.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each assertion; the token endpoint caps it at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Cached tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Tokens minted for a service account with the JWT-bearer grant.
///
/// An RS256 assertion is signed with the account's private key and exchanged
/// at its `token_uri`. Tokens are cached per scope until shortly before they
/// expire.
pub struct ServiceAccountToken {
    client_email: String,
    key_id: String,
    token_uri: String,
    key: EncodingKey,
    http: reqwest::Client,
    cache: Mutex<HashMap<String, CachedToken>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

impl ServiceAccountToken {
    /// Fails when the private key cannot be used for signing.
    pub fn new(identity: &Identity) -> AuthResult<Self> {
        let key = EncodingKey::from_rsa_pem(identity.key.private_key.as_bytes())
            .map_err(|e| AuthError::InvalidKey(format!("{}: {e}", identity.client_email())))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Token(e.to_string()))?;

        Ok(Self {
            client_email: identity.client_email().to_string(),
            key_id: identity.key.private_key_id.clone(),
            token_uri: identity.key.token_uri.clone(),
            key,
            http,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, scope: &str, now: DateTime<Utc>) -> Option<String> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(scope)
            .filter(|cached| cached.expires_at > now)
            .map(|cached| cached.token.clone())
    }

    fn assertion(&self, scope: &str, now: DateTime<Utc>) -> AuthResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        if !self.key_id.is_empty() {
            header.kid = Some(self.key_id.clone());
        }
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| AuthError::Token(format!("{}: signing failed: {e}", self.client_email)))
    }

    async fn exchange(&self, assertion: &str) -> AuthResult<TokenResponse> {
        let failed = |reason: String| AuthError::Token(format!("{}: {reason}", self.client_email));

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("token endpoint returned {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| failed(format!("bad token response: {e}")))
    }
}

impl std::fmt::Debug for ServiceAccountToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServiceAccountToken({})", self.client_email)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountToken {
    async fn access_token(&self, scope: &str) -> AuthResult<String> {
        let now = Utc::now();
        if let Some(token) = self.cached(scope, now) {
            return Ok(token);
        }

        let assertion = self.assertion(scope, now)?;
        let response = self.exchange(&assertion).await?;
        tracing::debug!(
            account = %self.client_email,
            scope,
            expires_in = response.expires_in,
            "access token minted"
        );

        let expires_at = now + chrono::Duration::seconds(response.expires_in - REFRESH_MARGIN_SECS);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                scope.to_string(),
                CachedToken {
                    token: response.access_token.clone(),
                    expires_at,
                },
            );
        Ok(response.access_token)
    }
}

/// A fixed token, typically minted out of band (e.g. `gcloud auth print-access-token`).
/// Meant for emulators and tests; the scope is not checked.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Read the token from an environment variable.
    pub fn from_env(var: &str) -> AuthResult<Self> {
        let token = std::env::var(var)
            .map_err(|_| AuthError::Token(format!("environment variable {var} is not set")))?;
        if token.trim().is_empty() {
            return Err(AuthError::Token(format!("environment variable {var} is empty")));
        }
        Ok(Self(token.trim().to_string()))
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self, scope: &str) -> AuthResult<String> {
        tracing::trace!(scope, "using static access token");
        Ok(self.0.clone())
    }
}
