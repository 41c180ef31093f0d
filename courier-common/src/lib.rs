//! Shared building blocks for the courier delivery crates.

pub mod address;
pub mod envelope;
pub mod logging;

pub use tracing;
