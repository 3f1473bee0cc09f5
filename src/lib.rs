//! Ingress Guard - per-client request rate limiting
//!
//! This crate implements the request-rate limiter that sits in front of a
//! web backend. Each client identity may make a fixed number of requests
//! per window; crossing the threshold blocks the identity for a penalty
//! period. Counters are cleared in bulk on a fixed schedule by a background
//! task, and an axum middleware turns rejections into `429` responses.

pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod ratelimit;
