//! Page-level PDF assembly served over HTTP under a per-identity daily quota.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
