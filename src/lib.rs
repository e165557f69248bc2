//! Floodgate - Fixed-Window Request Throttling
//!
//! This crate caps how many requests a caller may make to a class of
//! endpoints within a fixed time window and rejects callers that exceed it.
//! Counters live either in a shared cache reachable over the network or in a
//! bounded in-process map; the limiting algorithm and its HTTP contract are
//! the same for both. Storage failures never block traffic.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
