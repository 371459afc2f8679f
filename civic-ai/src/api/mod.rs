//! HTTP API handlers for civic-ai
//!
//! Thin REST + SSE surface over the request store and the generation
//! orchestrator.

pub mod events;
pub mod health;
pub mod reports;
pub mod requests;

pub use events::event_routes;
pub use health::health_routes;
pub use reports::report_routes;
pub use requests::request_routes;
