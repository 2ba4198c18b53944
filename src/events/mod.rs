//! Event service: published events enriched with view counts from the stats
//! service, plus admin endpoints to create and publish them.

pub mod client_ip;
pub mod handlers;
pub mod routes;
pub mod service;

pub use handlers::EventsState;
pub use routes::create_events_router;
pub use service::{EventError, EventService};
