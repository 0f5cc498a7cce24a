//! Order fulfillment pipeline
//!
//! Orders accepted over HTTP fan out into prioritized background jobs
//! (payment, inventory, email, invoice, analytics, warehouse) that a pool of
//! workers executes with timeouts and bounded, backed-off retries.

pub mod app_state;
pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
