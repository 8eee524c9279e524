//! Scoop - Rate-limited Flavor Catalog API
//!
//! This crate serves a small REST API over an in-memory ice cream flavor
//! catalog. Every request is rate limited per client, per HTTP method and per
//! minute, with the limit taken from a feature flag and usage kept in a shared
//! counter store. Mutating requests additionally need a write permission flag.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod flags;
pub mod http;
pub mod ratelimit;
