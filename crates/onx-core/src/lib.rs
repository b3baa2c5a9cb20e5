//! Core foundation for the oxidized-nx emulator
//!
//! Shared configuration, logging, and error types used by the emulation
//! crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
