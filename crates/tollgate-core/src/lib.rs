//! Admission-control core for the Tollgate reverse proxy.
//!
//! Requests reach this crate after the external L402 authenticator has had its
//! say. The `rate_limit` module resolves a stable client key, evaluates every
//! matching rate rule against that client's token buckets, and renders a
//! protocol-correct denial when any rule refuses.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod prelude;
pub mod rate_limit;

pub use rate_limit::{RateLimitLayer, RateLimiter};

// vim: ts=4
