//! Bearer token verification.
//!
//! Every `/api` request carries `Authorization: Bearer <jwt>`. Tokens are
//! RS256-signed by the identity provider and checked against its JWKS; the
//! `sub` claim becomes the owner id for the request. A shared HS256 secret
//! can stand in for the JWKS during local development.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone)]
struct CachedJwks {
    set: Arc<JwkSet>,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Verifies bearer tokens and extracts the caller's identity.
#[derive(Debug)]
pub struct JwtVerifier {
    config: AuthConfig,
    jwks_cache: RwLock<Option<CachedJwks>>,
    http: reqwest::Client,
}

impl JwtVerifier {
    pub fn new(config: AuthConfig) -> Self {
        let http = match reqwest::Client::builder().timeout(Duration::from_secs(10)).build() {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to configure JWKS http client, using defaults: {}", e);
                reqwest::Client::new()
            }
        };

        Self {
            config,
            jwks_cache: RwLock::new(None),
            http,
        }
    }

    /// Verify a token and return the owner id it was issued to.
    pub async fn verify(&self, token: &str) -> ApiResult<String> {
        let claims = if let Some(secret) = self.config.hs256_secret.as_deref() {
            self.decode_hs256(token, secret)?
        } else if self.config.jwks_url.is_some() {
            self.decode_with_jwks(token).await?
        } else {
            tracing::error!("No token signing key source is configured");
            return Err(invalid_token());
        };

        claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|sub| !sub.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::unauthorized("token has no subject"))
    }

    fn decode_hs256(&self, token: &str, secret: &str) -> ApiResult<Value> {
        decode::<Value>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &self.validation_for(Algorithm::HS256),
        )
        .map(|t| t.claims)
        .map_err(|e| {
            debug!("HS256 token rejected: {}", e);
            invalid_token()
        })
    }

    async fn decode_with_jwks(&self, token: &str) -> ApiResult<Value> {
        let header = decode_header(token).map_err(|_| invalid_token())?;
        if header.alg != Algorithm::RS256 {
            return Err(invalid_token());
        }
        let kid = header.kid.ok_or_else(invalid_token)?;

        let jwk = self.get_jwk(&kid).await?.ok_or_else(invalid_token)?;
        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|_| invalid_token())?;

        decode::<Value>(token, &decoding_key, &self.validation_for(Algorithm::RS256))
            .map(|t| t.claims)
            .map_err(|e| {
                debug!("RS256 token rejected: {}", e);
                invalid_token()
            })
    }

    fn validation_for(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.algorithms = vec![algorithm];
        validation.leeway = self.config.leeway_secs;
        validation.set_required_spec_claims(&["exp", "sub"]);

        if let Some(aud) = self.config.audience.as_deref() {
            validation.set_audience(&[aud]);
            validation.required_spec_claims.insert("aud".to_string());
        }
        if let Some(iss) = self.config.issuer.as_deref() {
            validation.set_issuer(&[iss]);
            validation.required_spec_claims.insert("iss".to_string());
        }

        validation
    }

    async fn get_jwk(&self, kid: &str) -> ApiResult<Option<Jwk>> {
        if let Some(jwk) = self.cached_jwk(kid).await {
            return Ok(Some(jwk));
        }

        // Unknown kid or stale set: the provider may have rotated keys.
        self.refresh_jwks().await?;
        Ok(self.cached_jwk(kid).await)
    }

    async fn cached_jwk(&self, kid: &str) -> Option<Jwk> {
        let cache = self.jwks_cache.read().await;
        let set = match cache.as_ref() {
            Some(cached) if cached.is_fresh(self.config.jwks_cache_ttl) => Arc::clone(&cached.set),
            _ => return None,
        };
        drop(cache);

        set.keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
            .cloned()
    }

    async fn refresh_jwks(&self) -> ApiResult<()> {
        let Some(url) = self.config.jwks_url.as_deref() else {
            return Ok(());
        };

        let set = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!("JWKS fetch failed: {}", e);
                invalid_token()
            })?
            .json::<JwkSet>()
            .await
            .map_err(|e| {
                warn!("JWKS response is not a key set: {}", e);
                invalid_token()
            })?;

        debug!("Fetched {} signing keys", set.keys.len());
        *self.jwks_cache.write().await = Some(CachedJwks {
            set: Arc::new(set),
            fetched_at: Instant::now(),
        });
        Ok(())
    }
}

fn invalid_token() -> ApiError {
    ApiError::unauthorized("invalid or expired token")
}

/// Authenticated caller. Extracting it rejects the request with 401 when
/// the bearer token is missing or invalid.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub owner_id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

        let owner_id = state.verifier.verify(token).await?;
        Ok(AuthUser { owner_id })
    }
}
