//! HTTP layer: the redirect endpoint and the health probe.
//!
//! # Modules
//!
//! - [`dto`] - Response bodies
//! - [`handlers`] - HTTP request handlers
//! - [`middleware`] - Request tracing
pub mod dto;
pub mod handlers;
pub mod middleware;
