//! Configuration and shared types
//!
//! Result/output types, reserved exit statuses, and runner configuration.

pub mod runner;
pub mod types;
pub mod validator;
