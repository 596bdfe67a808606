use crate::errors::ConfigError;
use chrono_tz::Tz;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub timezone: Tz,
    pub session_timeout: Duration,
    pub sweep_interval: Duration,
    pub flush_interval: Duration,
    pub visit_window: Duration,
    pub visit_window_limit: u32,
    pub limiter_capacity: usize,
    pub history_retention_days: i64,
    /// Upper bound on the reported connected count. `None` reports the real
    /// number.
    pub connected_cap: Option<usize>,
    pub trust_forwarded_headers: bool,
    pub clock_url: Option<String>,
    pub clock_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            data_path: PathBuf::from("data/site-stats.json"),
            timezone: Tz::UTC,
            session_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(30),
            flush_interval: Duration::from_secs(60),
            visit_window: Duration::from_secs(10),
            visit_window_limit: 1,
            limiter_capacity: 1024,
            history_retention_days: 183,
            connected_cap: None,
            trust_forwarded_headers: false,
            clock_url: None,
            clock_timeout: Duration::from_millis(500),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("PORT") {
            config.port = parse("PORT", &value)?;
        }
        if let Some(value) = get("APP_DATA_PATH") {
            config.data_path = PathBuf::from(value);
        }
        if let Some(value) = get("APP_TIMEZONE") {
            config.timezone = parse("APP_TIMEZONE", &value)?;
        }
        if let Some(value) = get("SESSION_TIMEOUT_SECS") {
            config.session_timeout = seconds("SESSION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("SESSION_SWEEP_SECS") {
            config.sweep_interval = seconds("SESSION_SWEEP_SECS", &value)?;
        }
        if let Some(value) = get("FLUSH_INTERVAL_SECS") {
            config.flush_interval = seconds("FLUSH_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = get("VISIT_WINDOW_SECS") {
            config.visit_window = seconds("VISIT_WINDOW_SECS", &value)?;
        }
        if let Some(value) = get("VISIT_WINDOW_LIMIT") {
            config.visit_window_limit = parse("VISIT_WINDOW_LIMIT", &value)?;
        }
        if let Some(value) = get("VISIT_LIMITER_CAPACITY") {
            config.limiter_capacity = parse("VISIT_LIMITER_CAPACITY", &value)?;
        }
        if let Some(value) = get("HISTORY_RETENTION_DAYS") {
            config.history_retention_days = retention_days("HISTORY_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = get("CONNECTED_CAP") {
            config.connected_cap = Some(parse("CONNECTED_CAP", &value)?);
        }
        if let Some(value) = get("TRUST_FORWARDED_HEADERS") {
            config.trust_forwarded_headers = flag("TRUST_FORWARDED_HEADERS", &value)?;
        }
        config.clock_url = get("CLOCK_URL");
        if let Some(value) = get("CLOCK_TIMEOUT_MS") {
            config.clock_timeout = Duration::from_millis(parse("CLOCK_TIMEOUT_MS", &value)?);
        }

        Ok(config)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn history_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.history_retention_days)
    }

    pub fn display_connected(&self, connected: usize) -> usize {
        self.connected_cap.map_or(connected, |cap| connected.min(cap))
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn seconds(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = parse(var, value)?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn retention_days(var: &'static str, value: &str) -> Result<i64, ConfigError> {
    let days: i64 = parse(var, value)?;
    if !(1..=MAX_RETENTION_DAYS).contains(&days) {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: format!("must be between 1 and {MAX_RETENTION_DAYS}"),
        });
    }
    Ok(days)
}

fn flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
