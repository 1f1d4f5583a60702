//! Centralized error handling
//!
//! # Error Categories
//!
//! - **Discovery Errors**: the mapping query failed or returned malformed rows
//! - **Invocation Errors**: one named procedure call failed
//! - **Serialization Errors**: one result set could not be rendered as XML
//! - **Application Errors**: configuration, database and web failures

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
