//! Shared types, configuration and core utilities for the Tollgate
//! admission-control core.
//!
//! This crate carries the pieces that do not depend on the HTTP stack: the
//! error type, rate limit configuration, and the IP anonymizer shared by every
//! per-client counter.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod netutil;
pub mod prelude;

// vim: ts=4
