pub mod api; // HTTP + WebSocket surface
pub mod approval; // Staff confirmation workflow
pub mod booking; // Slot lifecycle + atomic claim
pub mod chat; // Messaging channels + live registry
pub mod config;
pub mod core_state;
pub mod db;
pub mod identity; // Token verification, accounts
pub mod models;
