//! Configuration loading and validation for the primer pipeline.

pub mod config;

pub use config::Config;
