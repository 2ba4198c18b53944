use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub stats_server: ServerConfig,
    pub events_server: ServerConfig,
    pub gateway_server: ServerConfig,
    pub stats: StatsConfig,
    pub stats_client: StatsClientConfig,
    pub client_ip: ClientIpConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Limits and cache settings of the stats service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    pub max_range_days: i64,
    pub max_uris: usize,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            max_range_days: 365,
            max_uris: 100,
            cache_ttl_secs: 60,
            cache_max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsClientConfig {
    /// Fixed base URL of the stats service. Takes precedence over registry lookup.
    pub server_url: Option<String>,
    pub service_name: String,
    /// `host:port` entries seeded into the in-memory registry
    pub service_instances: Vec<String>,
    pub app_name: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub max_batch_size: usize,
    pub max_uris_per_query: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub retry_backoff: f64,
    pub instance_ttl_secs: u64,
    pub max_range_days: i64,
    pub dispatch_buffer_size: usize,
    pub dispatch_flush_interval_ms: u64,
}

impl Default for StatsClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            service_name: "stats-server".to_string(),
            service_instances: Vec::new(),
            app_name: "event-service".to_string(),
            connect_timeout_ms: 3000,
            read_timeout_ms: 5000,
            max_batch_size: 100,
            max_uris_per_query: 100,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            retry_backoff: 1.0,
            instance_ttl_secs: 60,
            max_range_days: 365,
            dispatch_buffer_size: 10_000,
            dispatch_flush_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket address only
    None,
    /// X-Forwarded-For and the Proxy-Client-IP family of headers
    #[default]
    Standard,
    /// CF-Connecting-IP
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientIpConfig {
    pub mode: TrustedProxyMode,
    pub trusted_proxies: Vec<IpNet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub stats_url: String,
    pub events_url: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// Day-count window that must be positive and representable as a span back from now
fn range_days(key: &str, days: i64) -> anyhow::Result<i64> {
    let window = chrono::Duration::try_days(days)
        .filter(|_| days >= 1)
        .with_context(|| format!("{key} must be a positive number of days, got {days}"))?;
    chrono::Utc::now()
        .naive_utc()
        .checked_sub_signed(window)
        .with_context(|| format!("{key} is too large: {days} days"))?;
    Ok(days)
}

fn env_range_days(key: &str, default: i64) -> anyhow::Result<i64> {
    range_days(key, env_parse(key, default)?)
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str = env_or("DATABASE_BACKEND", "sqlite");
        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };
        let database_url = env_or("DATABASE_URL", "sqlite://./hitcount.db?mode=rwc");
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let stats_server = ServerConfig {
            host: env_or("STATS_HOST", "127.0.0.1"),
            port: env_parse("STATS_PORT", 9090u16)?,
        };
        let events_server = ServerConfig {
            host: env_or("EVENTS_HOST", "127.0.0.1"),
            port: env_parse("EVENTS_PORT", 8080u16)?,
        };
        let gateway_server = ServerConfig {
            host: env_or("GATEWAY_HOST", "127.0.0.1"),
            port: env_parse("GATEWAY_PORT", 8000u16)?,
        };

        let stats_defaults = StatsConfig::default();
        let stats = StatsConfig {
            max_range_days: env_range_days(
                "STATS_MAX_RANGE_DAYS",
                stats_defaults.max_range_days,
            )?,
            max_uris: env_parse("STATS_MAX_URIS", stats_defaults.max_uris)?,
            cache_ttl_secs: env_parse("STATS_CACHE_TTL_SECS", stats_defaults.cache_ttl_secs)?,
            cache_max_entries: env_parse(
                "STATS_CACHE_MAX_ENTRIES",
                stats_defaults.cache_max_entries,
            )?,
        };

        let client_defaults = StatsClientConfig::default();
        let retry_attempts = env_parse("STATS_CLIENT_RETRY_ATTEMPTS", client_defaults.retry_attempts)?;
        if retry_attempts == 0 {
            anyhow::bail!("STATS_CLIENT_RETRY_ATTEMPTS must be at least 1");
        }
        let stats_client = StatsClientConfig {
            server_url: std::env::var("STATS_SERVER_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            service_name: env_or("STATS_SERVICE_NAME", &client_defaults.service_name),
            service_instances: env_list("STATS_SERVICE_INSTANCES"),
            app_name: env_or("STATS_CLIENT_APP_NAME", &client_defaults.app_name),
            connect_timeout_ms: env_parse(
                "STATS_CLIENT_CONNECT_TIMEOUT_MS",
                client_defaults.connect_timeout_ms,
            )?,
            read_timeout_ms: env_parse(
                "STATS_CLIENT_READ_TIMEOUT_MS",
                client_defaults.read_timeout_ms,
            )?,
            max_batch_size: env_parse(
                "STATS_CLIENT_MAX_BATCH_SIZE",
                client_defaults.max_batch_size,
            )?
            .max(1),
            max_uris_per_query: env_parse(
                "STATS_CLIENT_MAX_URIS",
                client_defaults.max_uris_per_query,
            )?
            .max(1),
            retry_attempts,
            retry_delay_ms: env_parse("STATS_CLIENT_RETRY_DELAY_MS", client_defaults.retry_delay_ms)?,
            retry_backoff: env_parse("STATS_CLIENT_RETRY_BACKOFF", client_defaults.retry_backoff)?,
            instance_ttl_secs: env_parse(
                "STATS_CLIENT_INSTANCE_TTL_SECS",
                client_defaults.instance_ttl_secs,
            )?,
            max_range_days: env_range_days(
                "STATS_CLIENT_MAX_RANGE_DAYS",
                client_defaults.max_range_days,
            )?,
            dispatch_buffer_size: env_parse(
                "STATS_CLIENT_DISPATCH_BUFFER",
                client_defaults.dispatch_buffer_size,
            )?
            .max(1),
            dispatch_flush_interval_ms: env_parse(
                "STATS_CLIENT_DISPATCH_FLUSH_MS",
                client_defaults.dispatch_flush_interval_ms,
            )?
            .max(1),
        };

        let mode = match env_or("CLIENT_IP_MODE", "standard").to_lowercase().as_str() {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown CLIENT_IP_MODE '{other}', falling back to 'standard'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::Standard
            }
        };
        let trusted_proxies = env_list("TRUSTED_PROXIES")
            .into_iter()
            .map(|cidr| {
                cidr.parse::<IpNet>()
                    .with_context(|| format!("TRUSTED_PROXIES contains an invalid CIDR: '{cidr}'"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let gateway = GatewayConfig {
            stats_url: env_or(
                "GATEWAY_STATS_URL",
                &format!("http://{}", stats_server.addr()),
            ),
            events_url: env_or(
                "GATEWAY_EVENTS_URL",
                &format!("http://{}", events_server.addr()),
            ),
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            stats_server,
            events_server,
            gateway_server,
            stats,
            stats_client,
            client_ip: ClientIpConfig {
                mode,
                trusted_proxies,
            },
            gateway,
        })
    }
}
