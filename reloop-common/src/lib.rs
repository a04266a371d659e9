//! # ReLoop Common Library
//!
//! Shared code for the ReLoop teardown service:
//! - Database initialization and row models
//! - Event types (ReloopEvent enum) and the EventBus
//! - Bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
