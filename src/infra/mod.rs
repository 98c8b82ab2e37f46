//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod ghostscript;
pub mod http;
pub mod pdf;
pub mod telemetry;
