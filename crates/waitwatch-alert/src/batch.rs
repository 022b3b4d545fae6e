//! Bounded fan-out of subject evaluations.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use waitwatch_common::types::EvaluationContext;

use crate::engine::{AlertEngine, SubjectReport};

/// Cooperative cancellation flag shared between a batch and its caller.
///
/// Subjects that have not started when the flag is raised are reported as
/// cancelled; subjects already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubjectStatus {
    Completed { report: SubjectReport },
    /// The subject received no alerts this pass.
    Failed { error: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectRun {
    pub subject_id: String,
    #[serde(flatten)]
    pub status: SubjectStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// One entry per input context, in input order.
    pub subjects: Vec<SubjectRun>,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub alerts_triggered: usize,
}

impl BatchReport {
    fn push(&mut self, run: SubjectRun) {
        match &run.status {
            SubjectStatus::Completed { report } => {
                self.completed += 1;
                self.alerts_triggered += report.alerts.len();
            }
            SubjectStatus::Failed { .. } => self.failed += 1,
            SubjectStatus::Cancelled => self.cancelled += 1,
        }
        self.subjects.push(run);
    }
}

pub struct BatchRunner {
    engine: Arc<AlertEngine>,
    max_concurrent: usize,
}

impl BatchRunner {
    /// Uses the engine's configured `max_concurrent`.
    pub fn new(engine: Arc<AlertEngine>) -> Self {
        let max_concurrent = engine.config().max_concurrent;
        Self::with_concurrency(engine, max_concurrent)
    }

    pub fn with_concurrency(engine: Arc<AlertEngine>, max_concurrent: usize) -> Self {
        Self {
            engine,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Evaluates every context, at most `max_concurrent` at a time.
    pub async fn run(&self, contexts: Vec<EvaluationContext>, cancel: &CancellationToken) -> BatchReport {
        tracing::info!(
            subjects = contexts.len(),
            max_concurrent = self.max_concurrent,
            "Batch evaluation started"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(contexts.len());

        for context in contexts {
            let subject_id = context.subject_id.clone();
            if cancel.is_cancelled() {
                handles.push((subject_id, None));
                continue;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                handles.push((subject_id, None));
                continue;
            };
            // Raised while waiting for a slot
            if cancel.is_cancelled() {
                drop(permit);
                handles.push((subject_id, None));
                continue;
            }

            let engine = self.engine.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                engine
                    .evaluate_subject_alerts(&context.subject_id, &context)
                    .await
            });
            handles.push((subject_id, Some(handle)));
        }

        let mut report = BatchReport::default();
        for (subject_id, handle) in handles {
            let status = match handle {
                None => SubjectStatus::Cancelled,
                Some(handle) => match handle.await {
                    Ok(Ok(report)) => SubjectStatus::Completed { report },
                    Ok(Err(e)) => SubjectStatus::Failed {
                        error: e.to_string(),
                    },
                    Err(e) => {
                        tracing::error!(subject_id = %subject_id, error = %e, "Subject evaluation task failed");
                        SubjectStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                },
            };
            report.push(SubjectRun { subject_id, status });
        }

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            cancelled = report.cancelled,
            alerts = report.alerts_triggered,
            "Batch evaluation finished"
        );
        report
    }
}
