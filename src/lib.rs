//! RadioBridge firmware library.
//!
//! Exposes the bridge core for integration testing. All ESP-IDF-specific
//! code is guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod line;
pub mod line_coding;

pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use line::Line;
pub use line_coding::LineCoding;
