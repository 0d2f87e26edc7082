//! # Calendar Connect Library
//!
//! OAuth2 authorization-code broker that connects a Google Calendar account and
//! hands the resulting refresh token to the operator, plus the HTTP surface
//! around it.

pub mod broker;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pages;
pub mod server;
pub mod telemetry;
