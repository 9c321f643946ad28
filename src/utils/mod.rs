//! Helpers used by the HTTP layer.
//!
//! - [`short_code`] - Short code syntax validation
//! - [`user_agent`] - Device and browser classification for hit metadata

pub mod short_code;
pub mod user_agent;
