//! Break-verification agent
//!
//! Runs break sessions on request and serves the HTTP API.

pub mod api;
pub mod config;
pub mod sessions;
