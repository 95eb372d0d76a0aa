//! CLI command implementations

pub mod config;
pub mod scenario;
pub mod stress;

pub use config::execute as config;
pub use scenario::execute as scenario;
pub use stress::execute as stress;
