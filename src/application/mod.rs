//! Application services: composition, assembly, raster export, quota, previews
//! and hand-off.

pub mod assembly;
pub mod composition;
pub mod convert;
pub mod error;
pub mod preview;
pub mod quota;
pub mod transfer;
pub mod usage;
