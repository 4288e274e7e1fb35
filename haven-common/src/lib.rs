//! Haven Common - Shared types, utilities, and configuration for the Haven chat service.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and request tracing helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{ChatConfig, Config, ModelBackend, ModelConfig, ObservabilityConfig, ServerConfig};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

