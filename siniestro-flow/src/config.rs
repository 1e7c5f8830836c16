use std::{path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::session::DEFAULT_SESSION_TTL;

pub const DEFAULT_BACKEND_URL: &str = "https://web-production-2584d.up.railway.app";
pub const DEFAULT_FALLBACK_CONFIG: &str = "FORM_CONFIG.json";
pub const DEFAULT_WHATSAPP_NUMBER: &str = "5493415551234";

/// Minimum plausible lengths below which identification is rejected locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRules {
    pub min_plate_len: usize,
    pub min_national_id_len: usize,
}

impl Default for InputRules {
    fn default() -> Self {
        Self {
            min_plate_len: 6,
            min_national_id_len: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub backend_url: String,
    pub fallback_config: PathBuf,
    #[serde(with = "millis")]
    pub http_timeout: Duration,
    #[serde(with = "millis")]
    pub schema_retry_delay: Duration,
    /// Idle time after which a session and its validation are dropped.
    #[serde(with = "millis")]
    pub session_ttl: Duration,
    pub input_rules: InputRules,
    pub whatsapp_number: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            fallback_config: PathBuf::from(DEFAULT_FALLBACK_CONFIG),
            http_timeout: Duration::from_secs(10),
            schema_retry_delay: Duration::from_secs(1),
            session_ttl: DEFAULT_SESSION_TTL,
            input_rules: InputRules::default(),
            whatsapp_number: DEFAULT_WHATSAPP_NUMBER.to_string(),
        }
    }
}

impl FlowConfig {
    /// Build the configuration from `SINIESTRO_*` environment variables,
    /// keeping defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend_url: std::env::var("SINIESTRO_BACKEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.backend_url),
            fallback_config: std::env::var("SINIESTRO_FALLBACK_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.fallback_config),
            http_timeout: env_parse("SINIESTRO_HTTP_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.http_timeout),
            schema_retry_delay: env_parse("SINIESTRO_SCHEMA_RETRY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.schema_retry_delay),
            session_ttl: env_parse("SINIESTRO_SESSION_TTL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.session_ttl),
            input_rules: InputRules {
                min_plate_len: env_parse("SINIESTRO_MIN_PLATE_LEN")
                    .unwrap_or(defaults.input_rules.min_plate_len),
                min_national_id_len: env_parse("SINIESTRO_MIN_ID_LEN")
                    .unwrap_or(defaults.input_rules.min_national_id_len),
            },
            whatsapp_number: std::env::var("WHATSAPP_NUMBER")
                .unwrap_or(defaults.whatsapp_number),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
