//! Terminal output helpers for the cachereg binary
//!
//! Uses `cliclack` for styled output in interactive terminals and falls
//! back to plain, greppable lines when piped or running in CI.

mod context;
mod output;

pub use context::UiContext;
pub use output::{banner, check, field, heading, note, verdict};
