pub mod handlers;
pub mod routes;

pub use handlers::{bad_request, error_response, ApiError, ErrorResponse};
pub use routes::create_stats_router;
