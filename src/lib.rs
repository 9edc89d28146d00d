//! structwatch server library
//!
//! Tracks the health of remote structures from their notification stream and
//! forwards a filtered, deduplicated subset of alerts to webhooks.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
