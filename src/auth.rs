//! Credential providers for Google APIs.
//!
//! [`Authenticator`] exchanges service-account or authorized-user credentials
//! for short-lived access tokens and can persist them between runs.
//! [`StaticToken`] wraps a token issued elsewhere.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{DriveError, Result};
use crate::models::{
    AuthorizedUserCredentials, Credentials, ServiceAccountCredentials, StoredToken, TokenResponse,
};

/// Google OAuth2 token endpoint.
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read-only Drive scope; nothing here writes to the remote side.
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Tokens closer than this to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Supplies a valid access token for Drive API calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A pre-issued access token, used as-is.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        if self.0.trim().is_empty() {
            return Err(DriveError::Auth("empty access token".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// Lifetime requested for a service account assertion.
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Assertion a service account signs to obtain an access token.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

fn now_secs() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| DriveError::Auth(format!("system clock before Unix epoch: {}", e)))
}

fn is_fresh(token: &StoredToken, now: u64) -> bool {
    token.expires_at > now + EXPIRY_MARGIN_SECS
}

/// Authenticator for Google APIs backed by a credentials JSON file.
#[derive(Clone)]
pub struct Authenticator {
    credentials: Arc<Credentials>,
    account: String,
    client: Client,
    cached_token: Arc<RwLock<Option<StoredToken>>>,
    token_cache: Option<PathBuf>,
}

impl Authenticator {
    /// Create a new authenticator from a credentials JSON file
    /// (`service_account` or `authorized_user`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DriveError::CredentialsFile {
            path: path.to_path_buf(),
            source,
        })?;
        let credentials: Credentials = serde_json::from_str(&content)?;
        Ok(Self::new(credentials))
    }

    /// Create a new authenticator from credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            account: credentials.account(),
            credentials: Arc::new(credentials),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
            token_cache: None,
        }
    }

    /// Persist issued tokens to `path` and reuse them on later runs.
    pub fn with_token_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_cache = Some(path.into());
        self
    }

    fn token_uri(&self) -> &str {
        self.credentials.token_uri().unwrap_or(TOKEN_URI)
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        let now = now_secs()?;

        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| is_fresh(t, now)) {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.cached_token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref().filter(|t| is_fresh(t, now)) {
            return Ok(token.access_token.clone());
        }

        if let Some(token) = self.load_cached().filter(|t| is_fresh(t, now)) {
            log::debug!("Reusing cached access token");
            let access_token = token.access_token.clone();
            *cached = Some(token);
            return Ok(access_token);
        }

        let token = self.refresh_token(now).await.map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                DriveError::Auth(e.to_string())
            }
        })?;
        self.store_cached(&token);

        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    fn load_cached(&self) -> Option<StoredToken> {
        let path = self.token_cache.as_ref()?;
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str::<StoredToken>(&content) {
            Ok(token) if token.account == self.account => Some(token),
            Ok(_) => {
                log::debug!("Token cache {:?} belongs to other credentials", path);
                None
            }
            Err(e) => {
                log::warn!("Token cache {:?} exists but is damaged: {}", path, e);
                None
            }
        }
    }

    fn store_cached(&self, token: &StoredToken) {
        let Some(path) = self.token_cache.as_ref() else {
            return;
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string(token)?;
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(path)?;
            // mode only applies on creation; tighten a file left by an older run
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(json.as_bytes())?;
            Ok(())
        };
        if let Err(e) = write() {
            log::warn!("Failed to write token cache {:?}: {}", path, e);
        }
    }

    async fn refresh_token(&self, now: u64) -> Result<StoredToken> {
        log::debug!("Requesting new access token from {}", self.token_uri());
        let response = match self.credentials.as_ref() {
            Credentials::ServiceAccount(sa) => self.exchange_jwt(sa, now).await?,
            Credentials::AuthorizedUser(user) => self.exchange_refresh_token(user).await?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::TokenRefresh(format!("{} from token endpoint: {}", status, body)));
        }

        let issued: TokenResponse = response.json().await?;
        Ok(StoredToken {
            account: self.account.clone(),
            access_token: issued.access_token,
            expires_at: now + issued.expires_in,
        })
    }

    /// Exchange a signed JWT assertion for an access token.
    async fn exchange_jwt(
        &self,
        credentials: &ServiceAccountCredentials,
        now: u64,
    ) -> Result<reqwest::Response> {
        let claims = AssertionClaims {
            iss: &credentials.client_email,
            scope: DRIVE_SCOPE,
            aud: self.token_uri(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        Ok(self
            .client
            .post(self.token_uri())
            .form(&params)
            .send()
            .await?)
    }

    /// Silently refresh a user's consent with the stored refresh token.
    async fn exchange_refresh_token(
        &self,
        credentials: &AuthorizedUserCredentials,
    ) -> Result<reqwest::Response> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", credentials.refresh_token.as_str()),
        ];

        Ok(self
            .client
            .post(self.token_uri())
            .form(&params)
            .send()
            .await?)
    }
}

#[async_trait]
impl CredentialProvider for Authenticator {
    async fn access_token(&self) -> Result<String> {
        self.get_access_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_claims_are_read_only() {
        let claims = AssertionClaims {
            iss: "fetcher@project.iam.gserviceaccount.com",
            scope: DRIVE_SCOPE,
            aud: TOKEN_URI,
            iat: 100,
            exp: 100 + ASSERTION_LIFETIME_SECS,
        };

        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["scope"], "https://www.googleapis.com/auth/drive.readonly");
        assert_eq!(value["exp"], 3700);
    }

    #[test]
    fn test_token_uri_override() {
        let auth = Authenticator::new(Credentials::AuthorizedUser(AuthorizedUserCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
            token_uri: Some("http://127.0.0.1:1/token".to_string()),
        }));
        assert_eq!(auth.token_uri(), "http://127.0.0.1:1/token");
    }

    #[test]
    fn test_freshness_margin() {
        let token = StoredToken {
            account: String::new(),
            access_token: "t".to_string(),
            expires_at: 1000,
        };
        assert!(is_fresh(&token, 900));
        assert!(!is_fresh(&token, 950));
        assert!(!is_fresh(&token, 2000));
    }

    #[tokio::test]
    async fn test_static_token_rejects_empty() {
        assert!(StaticToken::new("  ").access_token().await.is_err());
        assert_eq!(StaticToken::new("abc").access_token().await.unwrap(), "abc");
    }
}
