//! Error type definitions for the procedure streaming service
//!
//! Errors are split by blast radius. [`DiscoveryError`] is the only failure
//! that ends a run; [`InvocationError`] and [`SerializationError`] are scoped
//! to a single unit and are absorbed by the pipeline as a [`UnitError`].
//! [`AppError`] is the top-level type used by the binary and the web layer.

use std::time::Duration;
use thiserror::Error;

/// Failure to enumerate the procedure mappings for a run
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The mapping query itself failed
    #[error("Mapping query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// A mapping row lacked one of the expected columns
    #[error("Mapping row {row} is missing column '{column}'")]
    MissingColumn { row: usize, column: &'static str },

    /// A mapping row carried a null, empty or non-text value
    #[error("Mapping row {row} has an invalid '{column}' value: {message}")]
    InvalidValue {
        row: usize,
        column: &'static str,
        message: String,
    },

    /// Two mapping rows named the same unit
    #[error("Duplicate unit name '{unit_name}' in mapping rows {first} and {second}")]
    DuplicateUnit {
        unit_name: String,
        first: usize,
        second: usize,
    },

    /// Discovery backed by something other than the SQL source
    #[error("Mapping source unavailable: {message}")]
    Unavailable { message: String },
}

/// Underlying reason a single procedure call failed
#[derive(Error, Debug)]
pub enum InvocationCause {
    /// Backend error (unknown procedure, connection loss, SQL error)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The call did not finish within the configured timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The procedure name is not a plain SQL identifier
    #[error("'{0}' is not a valid procedure identifier")]
    InvalidProcedureName(String),

    /// A column value could not be mapped onto a [`crate::models::Value`]
    #[error("column '{column}' could not be decoded: {message}")]
    Decode { column: String, message: String },
}

impl InvocationCause {
    /// Whether retrying the same call could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            InvocationCause::Timeout(_) => true,
            InvocationCause::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Protocol(_)
            ),
            InvocationCause::InvalidProcedureName(_) | InvocationCause::Decode { .. } => false,
        }
    }
}

/// A named procedure call failed
#[derive(Error, Debug)]
#[error("Invocation of procedure '{procedure_name}' failed: {cause}")]
pub struct InvocationError {
    pub procedure_name: String,
    #[source]
    pub cause: InvocationCause,
}

impl InvocationError {
    pub fn new<P: Into<String>>(procedure_name: P, cause: InvocationCause) -> Self {
        Self {
            procedure_name: procedure_name.into(),
            cause,
        }
    }
}

/// Underlying reason a result set could not be rendered
#[derive(Error, Debug)]
pub enum SerializationCause {
    /// XML 1.0 has no way to carry this character, escaped or not
    #[error("character {character:?} in {location} cannot be represented in XML")]
    UnrepresentableCharacter { location: String, character: char },

    /// A column without a name has no element to live in
    #[error("column {index} has an empty name")]
    EmptyColumnName { index: usize },

    /// The column count of a row disagrees with the result metadata
    #[error("row {row} has {actual} values but the result declares {expected} columns")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// A unit's rows could not be serialized
#[derive(Error, Debug)]
#[error("Serialization of unit '{unit_name}' failed: {cause}")]
pub struct SerializationError {
    pub unit_name: String,
    #[source]
    pub cause: SerializationCause,
}

impl SerializationError {
    pub fn new<U: Into<String>>(unit_name: U, cause: SerializationCause) -> Self {
        Self {
            unit_name: unit_name.into(),
            cause,
        }
    }
}

/// A document could not be read back
#[derive(Error, Debug)]
pub enum DocumentParseError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Unexpected document structure: {0}")]
    Structure(String),

    #[error("Column '{column}' has an invalid {type_name} value '{text}'")]
    InvalidValue {
        column: String,
        type_name: String,
        text: String,
    },
}

impl DocumentParseError {
    pub fn structure<S: Into<String>>(message: S) -> Self {
        Self::Structure(message.into())
    }
}

/// A unit-scoped failure, recorded by the pipeline and never propagated
#[derive(Error, Debug)]
pub enum UnitError {
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl UnitError {
    /// Pipeline stage at which the unit failed
    pub fn stage(&self) -> &'static str {
        match self {
            UnitError::Invocation(_) => "invoke",
            UnitError::Serialization(_) => "build",
        }
    }
}

/// Total-run failures surfaced by [`crate::pipeline::Pipeline::run`]
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Pipeline run could not start
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        Self::configuration(error.to_string())
    }
}
