//! OAuth2 client-credentials token cache for the Canton ledger
//!
//! Every ledger command must carry a bearer token whose `sub` claim doubles as
//! the `userId` on the submission. Tokens are fetched with the
//! client-credentials grant and cached until shortly before expiry; a forced
//! refresh path exists for UNAUTHENTICATED responses.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Refresh this long before the token actually expires
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// OAuth2 configuration for the Canton ledger connection
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
}

/// Custom Debug that redacts client_secret to prevent accidental log leakage.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("audience", &self.audience)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// A cached bearer token plus the user id the ledger expects with it
#[derive(Clone)]
pub struct BearerToken {
    pub token: String,
    pub user_id: String,
}

struct CachedToken {
    bearer: BearerToken,
    refresh_at: Instant,
}

/// Process-wide token provider with double-checked expiry under one mutex.
pub struct TokenProvider {
    config: AuthConfig,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to create OAuth HTTP client")?;

        Ok(Self {
            config,
            http,
            cached: Mutex::new(None),
        })
    }

    /// Current bearer token, fetching or refreshing as needed.
    pub async fn bearer(&self) -> Result<BearerToken> {
        let mut guard = self.cached.lock().await;

        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.bearer.clone());
            }
            debug!("Cached ledger token near expiry, refreshing");
        }

        let bearer = self.fetch(&mut guard).await?;
        Ok(bearer)
    }

    /// Drop the cache and fetch a fresh token. Used after the ledger rejects
    /// a request as UNAUTHENTICATED despite an unexpired cache entry.
    pub async fn force_refresh(&self) -> Result<BearerToken> {
        let mut guard = self.cached.lock().await;
        *guard = None;
        self.fetch(&mut guard).await
    }

    async fn fetch(&self, slot: &mut Option<CachedToken>) -> Result<BearerToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("audience", self.config.audience.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .wrap_err("Failed to reach OAuth token endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(eyre!(
                "OAuth token request failed with {}: {}",
                status,
                body
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .wrap_err("Failed to decode OAuth token response")?;

        // The ledger requires the JWT subject as userId on every command;
        // fall back to the client id for opaque tokens.
        let user_id = jwt_subject(&token.access_token)
            .unwrap_or_else(|| self.config.client_id.clone());

        let ttl = Duration::from_secs(token.expires_in);
        let refresh_at = Instant::now() + ttl.saturating_sub(EXPIRY_SLACK);

        info!(
            user_id = %user_id,
            expires_in = token.expires_in,
            "Ledger token refreshed"
        );

        let bearer = BearerToken {
            token: token.access_token,
            user_id,
        };
        *slot = Some(CachedToken {
            bearer: bearer.clone(),
            refresh_at,
        });
        Ok(bearer)
    }
}

/// Extract the `sub` claim from a JWT without verifying it; verification is
/// the ledger's job, the relayer only needs the user id the token names.
fn jwt_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("sub")?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_jwt(claims: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.as_bytes());
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_jwt_subject_extraction() {
        let token = make_jwt(r#"{"sub":"bridge-relayer@clients","aud":"canton"}"#);
        assert_eq!(jwt_subject(&token).as_deref(), Some("bridge-relayer@clients"));
    }

    #[test]
    fn test_jwt_subject_missing_or_malformed() {
        assert_eq!(jwt_subject("not-a-jwt"), None);
        let token = make_jwt(r#"{"aud":"canton"}"#);
        assert_eq!(jwt_subject(&token), None);
    }

    #[test]
    fn test_auth_config_debug_redacts_secret() {
        let config = AuthConfig {
            token_url: "https://auth.example/oauth/token".to_string(),
            client_id: "relayer".to_string(),
            client_secret: "super-secret".to_string(),
            audience: "https://canton.example".to_string(),
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
