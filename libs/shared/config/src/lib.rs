use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use tracing::warn;

pub const DEFAULT_CLINIC_TIMEZONE: &str = "America/Sao_Paulo";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub realtime_database_url: String,
    pub clinic_timezone: Tz,
    pub name_lookup_timeout: Duration,
    pub name_cache_ttl: Duration,
    pub name_cache_max_entries: usize,
    pub write_retry_attempts: u32,
    pub write_retry_base_delay: Duration,
    pub bind_address: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            realtime_database_url: String::new(),
            clinic_timezone: chrono_tz::America::Sao_Paulo,
            name_lookup_timeout: Duration::from_millis(2000),
            name_cache_ttl: Duration::from_secs(600),
            name_cache_max_entries: 1000,
            write_retry_attempts: 3,
            write_retry_base_delay: Duration::from_millis(200),
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            realtime_database_url: env::var("REALTIME_DATABASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| {
                    warn!("REALTIME_DATABASE_URL not set, using empty value");
                    String::new()
                }),
            clinic_timezone: env::var("CLINIC_TIMEZONE")
                .ok()
                .and_then(|name| match Tz::from_str(&name) {
                    Ok(tz) => Some(tz),
                    Err(_) => {
                        warn!("CLINIC_TIMEZONE '{}' is not a known IANA zone, using default", name);
                        None
                    }
                })
                .unwrap_or(defaults.clinic_timezone),
            name_lookup_timeout: parse_var("NAME_LOOKUP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.name_lookup_timeout),
            name_cache_ttl: parse_var("NAME_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.name_cache_ttl),
            name_cache_max_entries: parse_var("NAME_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.name_cache_max_entries),
            write_retry_attempts: parse_var("WRITE_RETRY_ATTEMPTS")
                .unwrap_or(defaults.write_retry_attempts),
            write_retry_base_delay: parse_var("WRITE_RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.write_retry_base_delay),
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| {
                    warn!("BIND_ADDRESS not set, using default");
                    defaults.bind_address.clone()
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.realtime_database_url.is_empty()
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{} has invalid value '{}', using default", name, raw);
            None
        }
    }
}
