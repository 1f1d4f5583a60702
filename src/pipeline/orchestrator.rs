//! Fan-out / aggregate orchestrator
//!
//! Discovery runs eagerly inside [`Pipeline::run`]; everything after it is a
//! lazy stream. Units are started through a bounded `futures` buffer, so no
//! more than `concurrency_limit` invocations are ever in flight and a unit
//! only starts when the consumer has room for its document.

use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::report::{RunReport, RunReportHandle, RunState};
use super::retry::{with_retry, RetryConfig};
use crate::config::{EmissionOrder, PipelineConfig};
use crate::database::Database;
use crate::document::{DocumentBuilder, XmlDocumentBuilder};
use crate::errors::{InvocationCause, InvocationError, PipelineError, UnitError};
use crate::models::{Document, ProcedureMapping, ResultSet};
use crate::sources::{MappingSource, ProcedureInvoker, SqlMappingSource, SqlProcedureInvoker};

/// Runtime knobs for a [`Pipeline`]
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub concurrency_limit: usize,
    pub emission_order: EmissionOrder,
    pub invocation_timeout: Option<Duration>,
    pub retry: RetryConfig,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            emission_order: EmissionOrder::Completion,
            invocation_timeout: None,
            retry: RetryConfig::none(),
        }
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrency_limit: config.concurrency_limit,
            emission_order: config.emission_order,
            invocation_timeout: config.invocation_timeout(),
            retry: config.retry_config(),
        }
    }
}

/// Discovers units and streams one document per successful unit
pub struct Pipeline {
    mapping_source: Arc<dyn MappingSource>,
    invoker: Arc<dyn ProcedureInvoker>,
    builder: Arc<dyn DocumentBuilder>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        mapping_source: Arc<dyn MappingSource>,
        invoker: Arc<dyn ProcedureInvoker>,
        builder: Arc<dyn DocumentBuilder>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            mapping_source,
            invoker,
            builder,
            options,
        }
    }

    /// Wire the SQL-backed collaborators and the XML builder
    pub fn from_database(database: Database, config: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(SqlMappingSource::new(
                database.clone(),
                config.mapping_query.clone(),
            )),
            Arc::new(SqlProcedureInvoker::new(
                database,
                config.call_template.clone(),
            )),
            Arc::new(XmlDocumentBuilder::new()),
            PipelineOptions::from(config),
        )
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Discover mappings and return the lazy document stream. Only a failed
    /// discovery is an error; unit failures are recorded in the run report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<PipelineRun, PipelineError> {
        let report = RunReportHandle::new();
        let run_id = report.run_id();

        report.transition(RunState::Discovering);
        debug!("Run {} discovering procedure mappings", run_id);

        let discovery = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.mapping_source.fetch_mappings() => Some(result),
        };

        let mappings = match discovery {
            Some(Ok(mappings)) => mappings,
            Some(Err(err)) => {
                report.transition(RunState::Failed);
                error!("Run {} discovery failed: {}", run_id, err);
                return Err(PipelineError::Discovery(err));
            }
            None => {
                info!("Run {} cancelled during discovery", run_id);
                report.mark_cancelled();
                report.finish();
                return Ok(PipelineRun {
                    documents: stream::empty().boxed(),
                    report,
                });
            }
        };

        report.set_discovered(mappings.len());
        report.transition(RunState::FanningOut);
        info!(
            "Run {} fanning out {} units (concurrency_limit={}, order={:?})",
            run_id,
            mappings.len(),
            self.options.concurrency_limit,
            self.options.emission_order
        );

        let documents = self.fan_out(mappings, report.clone(), cancel);
        Ok(PipelineRun { documents, report })
    }

    fn fan_out(
        &self,
        mappings: Vec<ProcedureMapping>,
        report: RunReportHandle,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Document> {
        let total = mappings.len();
        let limit = self.options.concurrency_limit.max(1);
        let unit = UnitRunner {
            invoker: Arc::clone(&self.invoker),
            builder: Arc::clone(&self.builder),
            timeout: self.options.invocation_timeout,
            retry: self.options.retry.clone(),
            report: report.clone(),
        };

        if total == 0 {
            report.transition(RunState::Draining);
        }

        // The map closure runs when the buffer admits a unit, so the last
        // admission marks the start of draining
        let dispatched = AtomicUsize::new(0);
        let dispatch_report = report.clone();
        let units = stream::iter(mappings).map(move |mapping| {
            if dispatched.fetch_add(1, Ordering::Relaxed) + 1 == total {
                dispatch_report.transition(RunState::Draining);
            }
            unit.clone().run(mapping)
        });

        let mut units: BoxStream<'static, Option<Document>> = match self.options.emission_order {
            EmissionOrder::Completion => units.buffer_unordered(limit).boxed(),
            EmissionOrder::Discovery => units.buffered(limit).boxed(),
        };

        // Created outside the generator so a run dropped before its first
        // poll is still finished
        let guard = FinishGuard {
            report: report.clone(),
        };

        async_stream::stream! {
            loop {
                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    next = units.next() => match next {
                        Some(Some(document)) => Step::Emit(document),
                        Some(None) => Step::Skip,
                        None => Step::Exhausted,
                    },
                };

                match step {
                    Step::Emit(document) => {
                        report.record_emitted();
                        yield document;
                    }
                    Step::Skip => continue,
                    Step::Exhausted => break,
                    Step::Cancelled => {
                        info!("Run {} cancelled; abandoning in-flight units", report.run_id());
                        report.mark_cancelled();
                        break;
                    }
                }
            }

            // Dropping the buffer aborts whatever is still in flight
            drop(units);
            guard.complete();
        }
        .boxed()
    }
}

enum Step {
    Emit(Document),
    Skip,
    Exhausted,
    Cancelled,
}

/// Marks the run cancelled and finished if the consumer drops the stream
/// before it is exhausted
struct FinishGuard {
    report: RunReportHandle,
}

impl FinishGuard {
    fn complete(self) {
        self.report.finish();
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if !self.report.state().is_terminal() {
            info!("Run {} dropped by its consumer", self.report.run_id());
            self.report.mark_cancelled();
            self.report.finish();
        }
    }
}

/// Everything a single unit needs, detached from the pipeline's lifetime
#[derive(Clone)]
struct UnitRunner {
    invoker: Arc<dyn ProcedureInvoker>,
    builder: Arc<dyn DocumentBuilder>,
    timeout: Option<Duration>,
    retry: RetryConfig,
    report: RunReportHandle,
}

impl UnitRunner {
    /// Invoke and build one unit; failures are recorded and yield `None`
    async fn run(self, mapping: ProcedureMapping) -> Option<Document> {
        let started = Instant::now();

        match self.execute(&mapping).await {
            Ok(document) => {
                debug!(
                    "Unit '{}' built {} bytes in {:?}",
                    mapping.unit_name,
                    document.content.len(),
                    started.elapsed()
                );
                Some(document)
            }
            Err(err) => {
                warn!(
                    "Unit '{}' (procedure '{}') failed at {} stage after {:?}: {}",
                    mapping.unit_name,
                    mapping.procedure_name,
                    err.stage(),
                    started.elapsed(),
                    err
                );
                self.report.record_failure(&mapping, &err);
                None
            }
        }
    }

    async fn execute(&self, mapping: &ProcedureMapping) -> Result<Document, UnitError> {
        let procedure = mapping.procedure_name.as_str();
        let result = with_retry(&self.retry, || self.invoke_once(procedure), procedure).await?;
        let document = self.builder.build(&mapping.unit_name, &result)?;
        Ok(document)
    }

    async fn invoke_once(&self, procedure: &str) -> Result<ResultSet, InvocationError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.invoker.invoke(procedure))
                .await
                .unwrap_or_else(|_| {
                    Err(InvocationError::new(procedure, InvocationCause::Timeout(limit)))
                }),
            None => self.invoker.invoke(procedure).await,
        }
    }
}

/// Handle to one run: a stream of documents plus its live report
pub struct PipelineRun {
    documents: BoxStream<'static, Document>,
    report: RunReportHandle,
}

impl PipelineRun {
    /// Current state of the run's report
    pub fn report(&self) -> RunReport {
        self.report.snapshot()
    }

    pub fn report_handle(&self) -> RunReportHandle {
        self.report.clone()
    }

    /// Drain the run, returning every document and the final report
    pub async fn collect_all(self) -> (Vec<Document>, RunReport) {
        let report = self.report.clone();
        let documents = self.documents.collect().await;
        (documents, report.snapshot())
    }
}

impl Stream for PipelineRun {
    type Item = Document;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Document>> {
        self.documents.poll_next_unpin(cx)
    }
}
