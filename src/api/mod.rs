//! API Module
//!
//! HTTP handlers and routing for the administrative cache surface.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /cache/stats` - Per-namespace statistics
//! - `POST /cache/:domain/warm-up` - Warm one domain
//! - `DELETE /cache/:domain` - Clear one domain
//! - `DELETE /cache/keys/:namespace/:qualifier` - Evict one key
//! - `POST /cache/dict/refresh/:code` - Evict and reload one dict

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
