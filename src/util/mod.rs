//! Small helpers shared by the server and the CLI.

pub mod bytes;
pub mod disposition;
