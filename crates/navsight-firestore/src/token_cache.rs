//! Cached OAuth token for Firestore calls.
//!
//! A token is replaced a minute before it expires. Only one task refreshes
//! at a time. If a refresh fails the old token is reused while it lasts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the reported expiry cannot be converted.
const FALLBACK_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for the Firestore REST API.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

fn fresh(slot: &Option<CachedToken>) -> Option<String> {
    slot.as_ref()
        .filter(|t| t.is_fresh(Instant::now()))
        .map(|t| t.access_token.clone())
}

/// Shares one service-account token across concurrent Firestore calls.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            auth,
            slot: RwLock::new(None),
        }
    }

    /// Forget the token, e.g. after the server reported it expired.
    pub async fn invalidate(&self) {
        self.slot.write().await.take();
    }

    pub async fn get_token(&self) -> FirestoreResult<String> {
        if let Some(token) = fresh(&*self.slot.read().await) {
            return Ok(token);
        }

        let mut slot = self.slot.write().await;
        // Someone else may have refreshed while we queued for the lock.
        if let Some(token) = fresh(&slot) {
            return Ok(token);
        }

        let token = match self.auth.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => token,
            Err(e) => {
                return match slot.as_ref().filter(|t| t.is_live(Instant::now())) {
                    Some(current) => {
                        warn!(error = %e, "Token refresh failed, keeping the current token");
                        Ok(current.access_token.clone())
                    }
                    None => Err(FirestoreError::auth_error(format!("no Firestore access token: {}", e))),
                };
            }
        };

        let now = Utc::now();
        let remaining = if token.expires_at() > now {
            (token.expires_at() - now).to_std().unwrap_or(FALLBACK_TTL)
        } else {
            Duration::ZERO
        };
        let access_token = token.as_str().to_string();
        *slot = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + remaining,
        });
        debug!(ttl_secs = remaining.as_secs(), "Refreshed Firestore access token");
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness_respects_margin() {
        let now = Instant::now();
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + Duration::from_secs(30),
        };
        assert!(!token.is_fresh(now));
        assert!(token.is_live(now));

        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: now + Duration::from_secs(600),
        };
        assert!(token.is_fresh(now));
    }
}
