//! HTTP middleware stack: API key check and per-request trace ids.

pub mod auth;
pub mod trace;
