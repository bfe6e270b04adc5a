//! Per-run supervision: session scoping, failure containment, reporting.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use herald_scheduler::panic_message;
use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    Pipeline, PipelineError, PipelineResult, PostLedger, RunOutcome, RunProgress, RunStep,
};

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunDisposition {
    /// The pipeline reached a scoring decision.
    Completed(PipelineResult),
    /// Readiness was below the gate threshold.
    GateClosed { readiness: f64, threshold: f64 },
    /// The pipeline returned an error.
    Failed {
        /// Last step that completed before the failure.
        step: Option<RunStep>,
        score: Option<u8>,
        error: String,
    },
    /// The pipeline panicked.
    Panicked {
        step: Option<RunStep>,
        score: Option<u8>,
        message: String,
    },
}

impl RunDisposition {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunDisposition::Failed { .. } | RunDisposition::Panicked { .. }
        )
    }
}

/// Report for one supervised run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Monotonic run number within this supervisor.
    pub run: u64,
    pub disposition: RunDisposition,
}

/// Executes one pipeline run at a time and never lets a failure escape.
pub struct RunSupervisor {
    pipeline: Pipeline,
    ledger: Arc<dyn PostLedger>,
    runs: AtomicU64,
}

impl RunSupervisor {
    pub fn new(pipeline: Pipeline, ledger: Arc<dyn PostLedger>) -> Self {
        Self {
            pipeline,
            ledger,
            runs: AtomicU64::new(0),
        }
    }

    /// Run the pipeline once.
    ///
    /// Errors and panics are caught and turned into a report. The ledger
    /// session is opened for this run only and released on every path.
    pub async fn supervise(&self) -> RunReport {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let span = info_span!("run", run);

        let mut progress = RunProgress::default();
        let attempt = AssertUnwindSafe(self.attempt(&mut progress))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let disposition = match attempt {
            Ok(Ok(RunOutcome::Completed(result))) => RunDisposition::Completed(result),
            Ok(Ok(RunOutcome::GateClosed {
                readiness,
                threshold,
            })) => RunDisposition::GateClosed {
                readiness,
                threshold,
            },
            Ok(Err(e)) => RunDisposition::Failed {
                step: progress.last_completed,
                score: progress.score,
                error: e.to_string(),
            },
            Err(payload) => RunDisposition::Panicked {
                step: progress.last_completed,
                score: progress.score,
                message: panic_message(payload.as_ref()),
            },
        };

        span.in_scope(|| log_disposition(&disposition));
        RunReport { run, disposition }
    }

    async fn attempt(&self, progress: &mut RunProgress) -> Result<RunOutcome, PipelineError> {
        let mut session = crate::bounded(
            "open_session",
            self.pipeline.config().call_timeout,
            self.ledger.open_session(),
        )
        .await
        .map_err(PipelineError::at(RunStep::OpenSession))?;
        progress.complete(RunStep::OpenSession);

        self.pipeline.execute(session.as_mut(), progress).await
    }
}

fn log_disposition(disposition: &RunDisposition) {
    match disposition {
        RunDisposition::Completed(result) => info!(
            score = result.significance_score,
            channel = %result.channel_used,
            post_id = result.post_id.as_deref().unwrap_or("-"),
            persisted = result.persisted_to_memory,
            "run completed"
        ),
        RunDisposition::GateClosed {
            readiness,
            threshold,
        } => info!(readiness, threshold, "run skipped by readiness gate"),
        RunDisposition::Failed { step, score, error } => warn!(
            last_step = ?step,
            score = ?score,
            error = %error,
            "run failed"
        ),
        RunDisposition::Panicked {
            step,
            score,
            message,
        } => error!(
            last_step = ?step,
            score = ?score,
            panic = %message,
            "run panicked"
        ),
    }
}
