//! Locating the stats service: a fixed URL, or a registry of instances with
//! round-robin selection and a short-lived cache of the selected instance.

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use super::ClientError;
use crate::config::StatsClientConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInstance {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ServiceInstance {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Accepts `host:port` or a full `scheme://host[:port]` origin
impl FromStr for ServiceInstance {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let url = if s.contains("://") {
            Url::parse(s)?
        } else {
            Url::parse(&format!("http://{s}"))?
        };

        let host = url
            .host_str()
            .ok_or_else(|| ClientError::Validation(format!("missing host in '{s}'")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ClientError::Validation(format!("missing port in '{s}'")))?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
        })
    }
}

#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// Network location of one instance of `service`
    async fn resolve(&self, service: &str) -> Result<ServiceInstance, ClientError>;

    /// Forget any cached selection for `service`
    async fn invalidate(&self, _service: &str) {}
}

/// Always resolves to the same configured instance
pub struct StaticResolver {
    instance: ServiceInstance,
}

impl StaticResolver {
    pub fn new(instance: ServiceInstance) -> Self {
        Self { instance }
    }

    pub fn from_url(url: &str) -> Result<Self, ClientError> {
        Ok(Self::new(url.parse()?))
    }
}

#[async_trait]
impl ServiceResolver for StaticResolver {
    async fn resolve(&self, _service: &str) -> Result<ServiceInstance, ClientError> {
        Ok(self.instance.clone())
    }
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn instances(&self, service: &str) -> Vec<ServiceInstance>;
}

/// Registry kept in process memory; service names are case-insensitive
#[derive(Default)]
pub struct InMemoryRegistry {
    services: DashMap<String, Vec<ServiceInstance>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service: &str, instance: ServiceInstance) {
        let mut entry = self.services.entry(service.to_lowercase()).or_default();
        if !entry.contains(&instance) {
            debug!(service, %instance, "registered instance");
            entry.push(instance);
        }
    }

    pub fn deregister(&self, service: &str, instance: &ServiceInstance) -> bool {
        let Some(mut entry) = self.services.get_mut(&service.to_lowercase()) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|existing| existing != instance);
        before != entry.len()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn instances(&self, service: &str) -> Vec<ServiceInstance> {
        self.services
            .get(&service.to_lowercase())
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

/// Resolves through a registry, picking instances round-robin and caching
/// the pick per service for `instance_ttl`. Concurrent refreshes may race;
/// the loser only costs one extra registry lookup.
pub struct DiscoveryResolver {
    registry: Arc<dyn ServiceRegistry>,
    selected: Cache<String, ServiceInstance>,
    cursor: AtomicUsize,
}

impl DiscoveryResolver {
    pub fn new(registry: Arc<dyn ServiceRegistry>, instance_ttl: Duration) -> Self {
        Self {
            registry,
            selected: Cache::builder()
                .max_capacity(64)
                .time_to_live(instance_ttl)
                .build(),
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ServiceResolver for DiscoveryResolver {
    async fn resolve(&self, service: &str) -> Result<ServiceInstance, ClientError> {
        if let Some(instance) = self.selected.get(service).await {
            return Ok(instance);
        }

        let instances = self.registry.instances(service).await;
        if instances.is_empty() {
            error!(service, "service not found in registry");
            return Err(ClientError::ServiceUnavailable(service.to_string()));
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % instances.len();
        let instance = instances[index].clone();
        debug!(service, %instance, "selected service instance");

        self.selected
            .insert(service.to_string(), instance.clone())
            .await;
        Ok(instance)
    }

    async fn invalidate(&self, service: &str) {
        self.selected.invalidate(service).await;
    }
}

/// Static resolver when a server URL is configured, registry lookup otherwise
pub fn resolver_from_config(
    config: &StatsClientConfig,
) -> Result<Arc<dyn ServiceResolver>, ClientError> {
    if let Some(url) = config.server_url.as_deref() {
        return Ok(Arc::new(StaticResolver::from_url(url)?));
    }

    let registry = Arc::new(InMemoryRegistry::new());
    for entry in &config.service_instances {
        registry.register(&config.service_name, entry.parse()?);
    }

    Ok(Arc::new(DiscoveryResolver::new(
        registry,
        Duration::from_secs(config.instance_ttl_secs),
    )))
}
