//! Collector configuration loaded from environment variables.

/// Error type for invalid or missing configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Collector configuration.
///
/// | Variable                  | Required | Default       |
/// |---------------------------|----------|---------------|
/// | `CENTINELA_API_URL`       | yes      | --            |
/// | `CENTINELA_API_KEY`       | yes      | --            |
/// | `UDP_ENABLED`             | no       | `true`        |
/// | `UDP_PORT`                | no       | `5514`        |
/// | `UDP_BIND`                | no       | `0.0.0.0`     |
/// | `TCP_ENABLED`             | no       | `true`        |
/// | `TCP_PORT`                | no       | `5514`        |
/// | `TCP_BIND`                | no       | `0.0.0.0`     |
/// | `HEALTH_PORT`             | no       | `8081`        |
/// | `BATCH_SIZE`              | no       | `100`         |
/// | `FLUSH_INTERVAL_MS`       | no       | `5000`        |
/// | `MAX_BUFFER_SIZE`         | no       | `10000`       |
/// | `MAX_RETRIES`             | no       | `3`           |
/// | `RETRY_BASE_DELAY_MS`     | no       | `1000`        |
/// | `RETRY_MAX_DELAY_MS`      | no       | `30000`       |
/// | `RETRY_CHECK_INTERVAL_MS` | no       | `1000`        |
/// | `COLLECTOR_NAME`          | no       | hostname      |
/// | `SITE_ID`                 | no       | --            |
/// | `LOG_LEVEL`               | no       | `info`        |
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub api_url: String,
    pub api_key: String,
    pub udp_enabled: bool,
    pub udp_port: u16,
    pub udp_bind: String,
    pub tcp_enabled: bool,
    pub tcp_port: u16,
    pub tcp_bind: String,
    pub health_port: u16,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub max_buffer_size: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_check_interval_ms: u64,
    pub collector_name: String,
    pub site_id: Option<String>,
    pub log_level: String,
}

impl CollectorConfig {
    /// Load and validate configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = required("CENTINELA_API_URL")?;
        let api_key = required("CENTINELA_API_KEY")?;

        let collector_name = std::env::var("COLLECTOR_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(default_collector_name);

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            udp_enabled: bool_var("UDP_ENABLED", true)?,
            udp_port: parse_var("UDP_PORT", 5514)?,
            udp_bind: std::env::var("UDP_BIND").unwrap_or_else(|_| "0.0.0.0".into()),
            tcp_enabled: bool_var("TCP_ENABLED", true)?,
            tcp_port: parse_var("TCP_PORT", 5514)?,
            tcp_bind: std::env::var("TCP_BIND").unwrap_or_else(|_| "0.0.0.0".into()),
            health_port: parse_var("HEALTH_PORT", 8081)?,
            batch_size: parse_var("BATCH_SIZE", 100)?,
            flush_interval_ms: parse_var("FLUSH_INTERVAL_MS", 5_000)?,
            max_buffer_size: parse_var("MAX_BUFFER_SIZE", 10_000)?,
            max_retries: parse_var("MAX_RETRIES", 3)?,
            retry_base_delay_ms: parse_var("RETRY_BASE_DELAY_MS", 1_000)?,
            retry_max_delay_ms: parse_var("RETRY_MAX_DELAY_MS", 30_000)?,
            retry_check_interval_ms: parse_var("RETRY_CHECK_INTERVAL_MS", 1_000)?,
            collector_name,
            site_id: std::env::var("SITE_ID").ok().filter(|v| !v.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        })
    }

    /// `User-Agent` sent on every outbound request.
    pub fn user_agent(&self) -> String {
        format!(
            "centinela-collector/{} ({})",
            env!("CARGO_PKG_VERSION"),
            self.collector_name
        )
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: "a valid number",
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn bool_var(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                expected: "true or false",
                value,
            }),
        },
        Err(_) => Ok(default),
    }
}

fn default_collector_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "collector".to_string())
}
