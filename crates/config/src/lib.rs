//! Configuration module for the NVR recording daemon
//!
//! Handles loading daemon settings from TOML files and environment variable
//! overrides, and defines the recording parameters shared by every worker.

pub mod config;

pub use config::*;
