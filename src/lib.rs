//! DICEPILOT: automated dice-game betting agent.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod recognizer;
pub mod strategy;
pub mod engine;
pub mod platforms;
pub mod dashboard;
