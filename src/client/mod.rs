//! Client side of the stats service: hit reporting, stats queries and
//! view-count reconciliation, with retry and service discovery.

pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod retry;
pub mod stats_client;

pub use discovery::{
    resolver_from_config, DiscoveryResolver, InMemoryRegistry, ServiceInstance, ServiceRegistry,
    ServiceResolver, StaticResolver,
};
pub use dispatcher::HitDispatcher;
pub use error::ClientError;
pub use retry::RetryPolicy;
pub use stats_client::{ReportSummary, StatsClient, DEFAULT_URI_PREFIX};
