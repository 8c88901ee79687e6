//! Setup for the application.
//!
//! - Parse the command line.
//! - Load and validate the configuration.
//! - Initialize logging.
pub mod app;
pub mod config;
pub mod logging;
