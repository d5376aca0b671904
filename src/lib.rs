//! Passgate - Password-Gated Token Service
//!
//! This crate implements a small authentication gate for a single shared
//! admin password. A successful login mints a signed, time-limited token,
//! and login attempts are throttled per client with a fixed-window limiter.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
