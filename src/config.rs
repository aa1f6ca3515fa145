//! Gateway configuration, loaded from the environment.
//!
//! Process lifecycle, config loading, and banner printing are the
//! binary entry point's job, not this module's -- so this stays a thin
//! env-var reader, not a layered config system.

use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub smtp_port: u16,
    pub imap_port: u16,
    pub api_base: String,
    pub tls_key_path: Option<String>,
    pub tls_cert_path: Option<String>,
    pub development: bool,
    pub api_key_cache_ttl: Duration,
    pub api_timeout: Duration,
    pub max_message_size: u64,
    pub imap_idle_timeout: Duration,
    pub cache_dir: String,
    pub cache_memory_mb: u64,
    pub cache_persistent_mb: u64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {key}: {v}"))),
        Err(_) => Ok(default),
    }
}

impl GatewayConfig {
    /// Load configuration from the process environment (and `.env` if
    /// present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let development = env_or("NODE_ENV", "production") == "development";

        Ok(Self {
            smtp_port: env_parse("SMTP_PORT", 587)?,
            imap_port: env_parse("IMAP_PORT", 993)?,
            api_base: env_or("API_BASE", "https://api.xmit.sh"),
            tls_key_path: env::var("TLS_KEY_PATH").ok(),
            tls_cert_path: env::var("TLS_CERT_PATH").ok(),
            development,
            api_key_cache_ttl: Duration::from_millis(env_parse("API_KEY_CACHE_TTL", 300_000)?),
            api_timeout: Duration::from_millis(env_parse("API_TIMEOUT", 30_000)?),
            max_message_size: env_parse("MAX_MESSAGE_SIZE", 10_485_760)?,
            imap_idle_timeout: Duration::from_millis(env_parse("IMAP_IDLE_TIMEOUT", 1_800_000)?),
            cache_dir: env_or("CACHE_DIR", "./cache"),
            cache_memory_mb: env_parse("CACHE_MEMORY_MB", 50)?,
            cache_persistent_mb: env_parse("CACHE_PERSISTENT_MB", 500)?,
        })
    }

    /// Whether TLS should be used for the IMAP/SMTP listeners. Disabled
    /// in development so the gateway can be driven with a plain-text
    /// client locally.
    #[must_use]
    pub const fn tls_enabled(&self) -> bool {
        !self.development
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // SAFETY (test-only): no other test in this process mutates
        // these specific keys concurrently.
        for key in ["SMTP_PORT", "IMAP_PORT", "API_BASE", "NODE_ENV"] {
            unsafe { env::remove_var(key) };
        }
        let cfg = GatewayConfig::from_env().unwrap();
        assert_eq!(cfg.smtp_port, 587);
        assert_eq!(cfg.imap_port, 993);
        assert_eq!(cfg.api_base, "https://api.xmit.sh");
        assert!(cfg.tls_enabled());
    }

    #[test]
    fn development_disables_tls() {
        unsafe { env::set_var("NODE_ENV", "development") };
        let cfg = GatewayConfig::from_env().unwrap();
        assert!(!cfg.tls_enabled());
        unsafe { env::remove_var("NODE_ENV") };
    }
}
