//! Collaborator traits consumed by the pipeline
//!
//! The orchestrator only ever sees these two seams, which keeps the
//! connection pool out of its reach and lets tests substitute stubs.

use async_trait::async_trait;

use crate::errors::{DiscoveryError, InvocationError};
use crate::models::{ProcedureMapping, ResultSet};

/// Enumerates the units a run should produce
#[async_trait]
pub trait MappingSource: Send + Sync {
    /// Fetch the current mapping set in one backend call. A single malformed
    /// entry fails the whole call.
    async fn fetch_mappings(&self) -> Result<Vec<ProcedureMapping>, DiscoveryError>;
}

/// Executes one named procedure and materializes its rows
#[async_trait]
pub trait ProcedureInvoker: Send + Sync {
    /// Exactly one backend call; no retries.
    async fn invoke(&self, procedure_name: &str) -> Result<ResultSet, InvocationError>;
}
