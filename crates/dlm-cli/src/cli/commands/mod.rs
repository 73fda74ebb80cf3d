//! CLI command handlers, one per file.

mod serve;
mod status;

pub use serve::run_serve;
pub use status::run_status;
