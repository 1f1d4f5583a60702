//! Per-run bookkeeping: lifecycle state, counts and recorded unit failures

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::UnitError;
use crate::models::ProcedureMapping;

/// Lifecycle of one run. Unit failures never change it; only a failed
/// discovery ends in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    NotStarted,
    Discovering,
    FanningOut,
    Draining,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::NotStarted => "not_started",
            RunState::Discovering => "discovering",
            RunState::FanningOut => "fanning_out",
            RunState::Draining => "draining",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

/// A unit excluded from the output
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit_name: String,
    pub procedure_name: String,
    /// `invoke` or `build`
    pub stage: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub discovered: usize,
    pub emitted: usize,
    pub failures: Vec<UnitFailure>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::NotStarted,
            discovered: 0,
            emitted: 0,
            failures: Vec::new(),
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn failed_units(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.unit_name.as_str()).collect()
    }
}

/// Shared, cheaply cloneable handle to a run's report
#[derive(Debug, Clone)]
pub struct RunReportHandle {
    inner: Arc<Mutex<RunReport>>,
}

impl Default for RunReportHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReportHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunReport::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunReport> {
        // Every update is a plain field write, so a poisoned report is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> RunReport {
        self.lock().clone()
    }

    pub fn run_id(&self) -> Uuid {
        self.lock().run_id
    }

    pub fn state(&self) -> RunState {
        self.lock().state
    }

    pub fn transition(&self, next: RunState) {
        let mut report = self.lock();
        if report.state == next || report.state.is_terminal() {
            return;
        }
        debug!("Run {}: {} -> {}", report.run_id, report.state, next);
        report.state = next;
        if next.is_terminal() {
            report.finished_at = Some(Utc::now());
        }
    }

    pub fn set_discovered(&self, count: usize) {
        self.lock().discovered = count;
    }

    pub fn record_emitted(&self) {
        self.lock().emitted += 1;
    }

    pub fn record_failure(&self, mapping: &ProcedureMapping, error: &UnitError) {
        self.lock().failures.push(UnitFailure {
            unit_name: mapping.unit_name.clone(),
            procedure_name: mapping.procedure_name.clone(),
            stage: error.stage(),
            error: error.to_string(),
        });
    }

    pub fn mark_cancelled(&self) {
        self.lock().cancelled = true;
    }

    /// Move to `Done` and log the outcome
    pub fn finish(&self) {
        self.transition(RunState::Done);
        let report = self.lock();
        info!(
            "Run {} finished: discovered={} emitted={} failed={} cancelled={}",
            report.run_id,
            report.discovered,
            report.emitted,
            report.failures.len(),
            report.cancelled
        );
    }
}
