//! HTTP server for persona chat.
//!
//! # Endpoints
//!
//! - `GET  /health`   - Liveness probe
//! - `POST /chat`     - Run one turn
//! - `GET  /history`, `/traits`, `/traits/:name`, `/memories` - State audits

pub mod routes;

pub use routes::{app_router, AppState};
