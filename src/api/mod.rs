//! HTTP + WebSocket API layer.
//!
//! REST routes live under `endpoints/`, the real-time channel under
//! `websocket`. Everything speaks `ApiError` outward, which maps the
//! domain error taxonomy onto HTTP statuses.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;
pub mod websocket;

pub use server::ApiServer;
