// =============================================================================
// Engine Configuration — environment-driven, validated at startup
// =============================================================================
//
// All configuration is read once at startup from the process environment
// (optionally seeded from a .env file by main). Validation failures are fatal:
// the process must exit with code 1 rather than serve with a broken setup.
// =============================================================================

use anyhow::{bail, Context, Result};

/// Timezone the session scheduler is defined in. Anything else is a
/// configuration error.
pub const REQUIRED_TIMEZONE: &str = "Asia/Kolkata";

/// Validated engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bind host for the HTTP/WS gateway.
    pub host: String,
    /// Bind port for the HTTP/WS gateway.
    pub port: u16,

    /// Broker application key.
    pub broker_api_key: String,
    /// Broker application secret (used only for the token-exchange checksum).
    pub broker_api_secret: String,
    /// Current broker access token; may be rotated at runtime via the auth
    /// bridge endpoint.
    pub broker_access_token: String,

    /// When false the session is pinned to MARKET_OPEN and the feed is kept
    /// open permanently (development mode).
    pub enable_scheduler: bool,

    /// Optional external cache URL. The in-process build always uses the
    /// in-memory backend; a configured URL is surfaced as a warning by main.
    pub cache_url: Option<String>,

    /// Bearer token protecting the privileged routes.
    pub admin_token: String,

    /// Optional path to a JSON holiday list overriding the built-in table.
    pub holiday_file: Option<String>,
}

impl EngineConfig {
    /// Read and validate configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let timezone =
            std::env::var("MARKET_TIMEZONE").unwrap_or_else(|_| REQUIRED_TIMEZONE.to_string());
        if timezone != REQUIRED_TIMEZONE {
            bail!(
                "MARKET_TIMEZONE must be {REQUIRED_TIMEZONE}, got {timezone} — \
                 session timings are defined on the IST clock"
            );
        }

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port number: {raw}"))?,
            Err(_) => 8000,
        };

        let enable_scheduler = match std::env::var("ENABLE_SCHEDULER") {
            Ok(raw) => parse_bool(&raw)
                .with_context(|| format!("ENABLE_SCHEDULER is not a boolean: {raw}"))?,
            Err(_) => true,
        };

        Ok(Self {
            host,
            port,
            broker_api_key: std::env::var("BROKER_API_KEY").unwrap_or_default(),
            broker_api_secret: std::env::var("BROKER_API_SECRET").unwrap_or_default(),
            broker_access_token: std::env::var("BROKER_ACCESS_TOKEN").unwrap_or_default(),
            enable_scheduler,
            cache_url: std::env::var("CACHE_URL").ok().filter(|s| !s.is_empty()),
            admin_token: std::env::var("ADMIN_TOKEN").unwrap_or_default(),
            holiday_file: std::env::var("HOLIDAY_FILE").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Bind address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("unrecognized boolean literal: {other}"),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(parse_bool("YES").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
