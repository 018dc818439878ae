//! The stage runner.

use super::deferred::DeferredStages;
use crate::core::{StageReport, StageStatus, TestSummary};
use crate::events::{EventSink, LoggingEventSink, StageEvent, StageEventKind};
use crate::skip::SkipPolicy;
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Executes named stages under a skip policy and records their reports.
///
/// Cloning is cheap; clones share the same reports and deferred stages.
#[derive(Debug, Clone)]
pub struct StageRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    test_name: String,
    policy: SkipPolicy,
    sink: Arc<dyn EventSink>,
    reports: Mutex<Vec<StageReport>>,
    deferred: DeferredStages,
}

impl std::fmt::Debug for RunnerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerInner")
            .field("test_name", &self.test_name)
            .field("policy", &self.policy)
            .field("reports", &self.reports.lock().len())
            .field("deferred", &self.deferred)
            .finish_non_exhaustive()
    }
}

impl Drop for RunnerInner {
    fn drop(&mut self) {
        let pending = self.deferred.pending_names();
        if !pending.is_empty() {
            warn!(
                test = %self.test_name,
                ?pending,
                "runner dropped with deferred stages that never ran"
            );
            for stage in pending {
                let event = StageEvent::new(StageEventKind::Failed, &self.test_name, stage)
                    .with_deferred(true)
                    .with_detail("runner dropped before the deferred stage ran");
                self.sink.try_emit(&event);
            }
        }
    }
}

impl StageRunner {
    /// Creates a runner that logs lifecycle events through `tracing`.
    #[must_use]
    pub fn new(test_name: impl Into<String>, policy: SkipPolicy) -> Self {
        Self::with_sink(test_name, policy, Arc::new(LoggingEventSink::default()))
    }

    /// Creates a runner publishing lifecycle events to `sink`.
    #[must_use]
    pub fn with_sink(
        test_name: impl Into<String>,
        policy: SkipPolicy,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                test_name: test_name.into(),
                policy,
                sink,
                reports: Mutex::new(Vec::new()),
                deferred: DeferredStages::default(),
            }),
        }
    }

    /// The test name used in logs and reports.
    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.inner.test_name
    }

    /// The skip policy consulted at stage entry.
    #[must_use]
    pub fn policy(&self) -> &SkipPolicy {
        &self.inner.policy
    }

    /// Runs one stage.
    ///
    /// Returns `Skip` without calling `action` if a skip directive is set.
    /// An error or panic from `action` is recorded as `Fail` and never
    /// propagates, so stages after it (and deferred stages) still run.
    pub async fn run_stage<F, Fut>(&self, name: &str, action: F) -> StageStatus
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.execute(name, false, action).await
    }

    /// Registers a cleanup stage to run after the test body.
    ///
    /// Deferred stages run last-registered-first and still honour skip
    /// directives.
    pub fn defer_stage<F, Fut>(&self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        info!(test = %self.inner.test_name, stage = %name, "registered deferred stage");
        self.inner
            .deferred
            .push(name, Box::new(move || action().boxed()));
    }

    /// Runs every pending deferred stage in LIFO order.
    pub async fn run_deferred(&self) -> Vec<(String, StageStatus)> {
        let mut statuses = Vec::new();
        while let Some(stage) = self.inner.deferred.pop() {
            let status = self.execute(&stage.name, true, stage.action).await;
            statuses.push((stage.name, status));
        }
        statuses
    }

    /// Names of deferred stages that have not run yet.
    #[must_use]
    pub fn pending_deferred(&self) -> Vec<String> {
        self.inner.deferred.pending_names()
    }

    /// Records a failure that happened outside any stage.
    pub fn record_failure(&self, name: &str, message: impl Into<String>) {
        let message = message.into();
        error!(test = %self.inner.test_name, stage = name, error = %message, "failure outside stage");
        self.inner
            .reports
            .lock()
            .push(StageReport::failed(name, Utc::now(), message));
    }

    /// Reports recorded so far, in execution order.
    #[must_use]
    pub fn reports(&self) -> Vec<StageReport> {
        self.inner.reports.lock().clone()
    }

    /// Returns true if any stage failed so far.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.inner
            .reports
            .lock()
            .iter()
            .any(|r| r.status.is_failure())
    }

    /// Summarizes the reports recorded so far.
    #[must_use]
    pub fn summary(&self) -> TestSummary {
        TestSummary::new(self.inner.test_name.clone(), self.reports())
    }

    async fn execute<F, Fut>(&self, name: &str, deferred: bool, action: F) -> StageStatus
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let span = info_span!("stage", test = %self.inner.test_name, stage = name, deferred);
        self.execute_in_span(name, deferred, action)
            .instrument(span)
            .await
    }

    async fn execute_in_span<F, Fut>(&self, name: &str, deferred: bool, action: F) -> StageStatus
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        info!(action = "enter", "entering stage '{}'", name);
        self.emit(StageEvent::new(StageEventKind::Entered, &self.inner.test_name, name).with_deferred(deferred))
            .await;

        if let Some(directive) = self.inner.policy.skip_directive(name) {
            info!(
                action = "skip",
                %directive,
                "'{}' is set, skipping stage '{}'", directive, name
            );
            let report = StageReport::skipped(name, directive).as_deferred(deferred);
            return self.finish(report).await;
        }

        let started_at = Utc::now();
        let outcome = AssertUnwindSafe(async move { action().await })
            .catch_unwind()
            .await;

        let report = match outcome {
            Ok(Ok(())) => StageReport::completed(name, started_at),
            Ok(Err(e)) => StageReport::failed(name, started_at, format!("{e:#}")),
            Err(panic) => StageReport::failed(
                name,
                started_at,
                format!("panicked: {}", panic_message(panic.as_ref())),
            ),
        }
        .as_deferred(deferred);

        self.finish(report).await
    }

    async fn finish(&self, report: StageReport) -> StageStatus {
        let status = report.status;
        let name = report.name.clone();
        let duration_ms = report.duration_ms();

        match status {
            StageStatus::Ok => {
                info!(action = "complete", duration_ms, "stage '{}' completed", name);
            }
            StageStatus::Skip => {
                info!(action = "complete", "stage '{}' skipped", name);
            }
            StageStatus::Fail => {
                let message = report.error.as_deref().unwrap_or_default();
                if report.deferred {
                    error!(
                        action = "fail",
                        duration_ms,
                        error = %message,
                        "cleanup stage '{}' failed, external resources may have leaked", name
                    );
                } else {
                    error!(
                        action = "fail",
                        duration_ms,
                        error = %message,
                        "stage '{}' failed", name
                    );
                }
            }
        }

        let mut event = StageEvent::new(
            StageEventKind::for_status(status),
            &self.inner.test_name,
            &name,
        )
        .with_deferred(report.deferred);
        if let Some(detail) = report.error.as_ref().or(report.skip_directive.as_ref()) {
            event = event.with_detail(detail.clone());
        }
        self.emit(event).await;

        self.inner.reports.lock().push(report);
        status
    }

    async fn emit(&self, event: StageEvent) {
        self.inner.sink.emit(&event).await;
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
