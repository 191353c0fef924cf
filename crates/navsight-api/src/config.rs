//! API configuration.

use std::time::Duration;

use navsight_models::UploadPolicy;

/// Bearer token verification settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWKS endpoint for RS256 tokens
    pub jwks_url: Option<String>,
    /// Expected `iss` claim
    pub issuer: Option<String>,
    /// Expected `aud` claim
    pub audience: Option<String>,
    /// Shared HS256 secret, for local development only
    pub hs256_secret: Option<String>,
    /// How long a fetched key set stays valid
    pub jwks_cache_ttl: Duration,
    /// Clock skew tolerance in seconds
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            issuer: None,
            audience: None,
            hs256_secret: None,
            jwks_cache_ttl: Duration::from_secs(3600),
            leeway_secs: 60,
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            jwks_url: env_opt("AUTH_JWKS_URL"),
            issuer: env_opt("AUTH_ISSUER"),
            audience: env_opt("AUTH_AUDIENCE"),
            hs256_secret: env_opt("AUTH_HS256_SECRET"),
            jwks_cache_ttl: env_parse("AUTH_JWKS_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.jwks_cache_ttl),
            leeway_secs: env_parse("AUTH_LEEWAY_SECS").unwrap_or(defaults.leeway_secs),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second, per client IP
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Largest source video a job may be submitted for
    pub max_video_bytes: u64,
    /// Lifetime of presigned audio URLs in job views
    pub audio_url_ttl: Duration,
    /// Environment (development/production)
    pub environment: String,
    pub auth: AuthConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 64 * 1024,
            max_video_bytes: UploadPolicy::default().max_bytes,
            audio_url_ttl: Duration::from_secs(3600),
            environment: "development".to_string(),
            auth: AuthConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            max_video_bytes: env_parse("MAX_VIDEO_BYTES").unwrap_or(defaults.max_video_bytes),
            audio_url_ttl: env_parse("AUDIO_URL_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.audio_url_ttl),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            auth: AuthConfig::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::default().with_max_bytes(self.max_video_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        std::env::set_var("PORT", "9100");
        std::env::set_var("CORS_ORIGINS", "https://a.example, https://b.example");
        std::env::set_var("MAX_VIDEO_BYTES", "1024");
        std::env::set_var("AUTH_JWKS_URL", "https://issuer.example/jwks");

        let config = ApiConfig::from_env();
        assert_eq!(config.port, 9100);
        assert_eq!(config.cors_origins, ["https://a.example", "https://b.example"]);
        assert_eq!(config.upload_policy().max_bytes, 1024);
        assert_eq!(config.auth.jwks_url.as_deref(), Some("https://issuer.example/jwks"));

        for key in ["PORT", "CORS_ORIGINS", "MAX_VIDEO_BYTES", "AUTH_JWKS_URL"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_blank_auth_values_are_unset() {
        std::env::set_var("AUTH_ISSUER", "  ");
        assert!(AuthConfig::from_env().issuer.is_none());
        std::env::remove_var("AUTH_ISSUER");
    }
}
