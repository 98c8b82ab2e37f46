//! Domain layer types and invariants.

pub mod composition;
pub mod error;
pub mod quota;
pub mod types;
