//! API configuration.

/// Default source-size cap: 5 GiB.
const DEFAULT_MAX_SOURCE_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Public base URL used when rewriting playlists and building
    /// status/playback URLs (no trailing slash)
    pub api_base_url: String,
    /// Largest accepted source upload, in bytes
    pub max_source_bytes: u64,
    /// Admission rate limit, requests per second per client
    pub rate_limit_rps: u32,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_base_url: "http://localhost:8000/api/upload".to_string(),
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            rate_limit_rps: 10,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or(defaults.api_base_url)
                .trim_end_matches('/')
                .to_string(),
            max_source_bytes: std::env::var("MAX_SOURCE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_source_bytes),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_size_cap_is_five_gib() {
        assert_eq!(ApiConfig::default().max_source_bytes, 5_368_709_120);
    }
}
