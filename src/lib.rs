//! devprobe - Time-boxed smart-home device discovery
//!
//! A CLI and library that runs bounded discovery sessions on configured
//! connectors, drains the scanner's responses into a device store, and
//! reports the newly found devices.

pub mod app;
pub mod cli;
pub mod config;
pub mod devices;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod select;
pub mod signal;

pub use app::run_app;
