//! Wiring of collaborators, the run supervisor and the scheduler loop.

use std::sync::Arc;

use miette::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use herald_clients::{
    EmbeddingClient, LlmClient, SolanaRpcClient, XApiPublisher, XSessionPublisher,
};
use herald_pipeline::{
    FallbackChannel, Pipeline, PrimaryChannel, PublishCoordinator, RunDisposition, RunReport,
    RunSupervisor,
};
use herald_scheduler::{RunExecutor, RunStatus, Scheduler};
use herald_store::{SqliteMemory, Store};

use crate::config::{AgentArgs, ScheduleArgs};

/// Build the supervisor with every concrete collaborator.
pub fn build_supervisor(args: &AgentArgs) -> Result<RunSupervisor> {
    let config = args.pipeline_config();
    let timeouts = args.http_timeouts();

    let store = Store::open(&args.db_path)
        .map_err(|e| miette::miette!("failed to open store: {}", e))?;

    let embedder = EmbeddingClient::new(
        &args.embedding_base_url,
        &args.embedding_api_key,
        &args.embedding_model,
        timeouts,
    )
    .map_err(|e| miette::miette!("{}", e))?;
    let memory = SqliteMemory::open(&args.db_path, Arc::new(embedder), args.memory_limit)
        .map_err(|e| miette::miette!("failed to open memory: {}", e))?;

    let generator = LlmClient::new(
        &args.llm_base_url,
        &args.llm_api_key,
        &args.llm_model,
        timeouts,
    )
    .map_err(|e| miette::miette!("{}", e))?
    .with_temperature(args.llm_temperature);
    let data = SolanaRpcClient::new(&args.solana_rpc_url, &args.wallet_address, timeouts)
        .map_err(|e| miette::miette!("{}", e))?;

    let primary = XApiPublisher::new(&args.x_api_base_url, &args.x_access_token, timeouts)
        .map_err(|e| miette::miette!("{}", e))?;
    let fallback = XSessionPublisher::new(
        &args.x_session_endpoint,
        args.session_credentials(),
        timeouts,
    )
    .map_err(|e| miette::miette!("{}", e))?;
    let publisher = PublishCoordinator::new(
        Arc::new(primary) as Arc<dyn PrimaryChannel>,
        Arc::new(fallback) as Arc<dyn FallbackChannel>,
        config.call_timeout,
    );

    let pipeline = Pipeline::new(
        Arc::new(data),
        Arc::new(generator),
        Arc::new(memory),
        publisher,
        config,
    )
    .map_err(|e| miette::miette!("{}", e))?;

    Ok(RunSupervisor::new(pipeline, Arc::new(store)))
}

/// How the scheduler should count a supervised run.
pub fn run_status(report: &RunReport) -> RunStatus {
    match report.disposition {
        RunDisposition::Completed(_) => RunStatus::Completed,
        RunDisposition::GateClosed { .. } => RunStatus::Skipped,
        RunDisposition::Failed { .. } | RunDisposition::Panicked { .. } => RunStatus::Failed,
    }
}

/// Build the executor the scheduler fires on every trigger.
pub fn executor(supervisor: Arc<RunSupervisor>) -> RunExecutor {
    Box::new(move |ticket| {
        let supervisor = Arc::clone(&supervisor);
        Box::pin(async move {
            info!(
                sequence = ticket.sequence,
                window = ticket.window,
                fired_at = %ticket.fired_at,
                "scheduled run firing"
            );
            let report = supervisor.supervise().await;
            run_status(&report)
        })
    })
}

/// Run the daemon until ctrl-c.
pub async fn run(agent: &AgentArgs, schedule: &ScheduleArgs) -> Result<()> {
    let supervisor = Arc::new(build_supervisor(agent)?);
    let mut scheduler = Scheduler::from_entropy(schedule.policy())
        .map_err(|e| miette::miette!("invalid schedule: {}", e))?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    if schedule.no_initial_run {
        info!("initial run disabled");
    } else {
        info!("performing initial run");
        let report = supervisor.supervise().await;
        if report.disposition.is_failure() {
            warn!(run = report.run, "initial run failed, continuing with schedule");
        }
    }

    let executor = executor(Arc::clone(&supervisor));
    let stats = scheduler.run(shutdown_rx, &executor).await;

    info!(
        windows_opened = stats.windows_opened,
        runs_started = stats.runs_started,
        runs_failed = stats.runs_failed,
        cycles_failed = stats.cycles_failed,
        "daemon stopped"
    );
    Ok(())
}

/// Perform a single supervised run and print its report.
pub async fn run_once(agent: &AgentArgs) -> Result<()> {
    let supervisor = build_supervisor(agent)?;
    let report = supervisor.supervise().await;

    match &report.disposition {
        RunDisposition::Completed(result) => {
            let json = serde_json::to_string_pretty(result)
                .map_err(|e| miette::miette!("failed to encode result: {}", e))?;
            println!("{}", json);
            Ok(())
        }
        RunDisposition::GateClosed {
            readiness,
            threshold,
        } => {
            println!("skipped: readiness {} below threshold {}", readiness, threshold);
            Ok(())
        }
        RunDisposition::Failed { step, error, .. } => Err(miette::miette!(
            "run failed after {}: {}",
            step.map(|s| s.to_string()).unwrap_or_else(|| "start".to_string()),
            error
        )),
        RunDisposition::Panicked { step, message, .. } => Err(miette::miette!(
            "run panicked after {}: {}",
            step.map(|s| s.to_string()).unwrap_or_else(|| "start".to_string()),
            message
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use async_trait::async_trait;
    use herald_pipeline::{
        ChannelUsed, CollaboratorError, DataSource, Embedding, GenerationRequest, Generator,
        MediaAttachment, Memory, MemoryRecord, PipelineConfig, PipelineResult, RunStep, Snapshot,
    };
    use herald_scheduler::{DurationRange, SchedulePolicy};
    use serde_json::Value;

    struct FundedWallet;

    #[async_trait]
    impl DataSource for FundedWallet {
        async fn collect_snapshot(&self) -> Result<Snapshot, CollaboratorError> {
            Ok(Snapshot::default())
        }

        async fn check_readiness(&self) -> Result<f64, CollaboratorError> {
            Ok(1.0)
        }
    }

    /// Panics on the first generation, succeeds afterwards.
    #[derive(Default)]
    struct FlakyGenerator {
        generations: AtomicUsize,
    }

    #[async_trait]
    impl Generator for FlakyGenerator {
        async fn synthesize_short_term(
            &self,
            _snapshot: &Snapshot,
            _prior_context: &[String],
        ) -> Result<String, CollaboratorError> {
            Ok("quiet day".to_string())
        }

        async fn generate_post(
            &self,
            _request: GenerationRequest<'_>,
        ) -> Result<String, CollaboratorError> {
            if self.generations.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("model client exploded");
            }
            Ok("gm".to_string())
        }

        async fn score_significance(&self, _content: &str) -> Result<i64, CollaboratorError> {
            Ok(5)
        }
    }

    struct EmptyMemory;

    #[async_trait]
    impl Memory for EmptyMemory {
        async fn embed(&self, _text: &str) -> Result<Embedding, CollaboratorError> {
            Ok(vec![1.0])
        }

        async fn retrieve_relevant(
            &self,
            _embedding: &Embedding,
        ) -> Result<Vec<MemoryRecord>, CollaboratorError> {
            Ok(Vec::new())
        }

        async fn store(
            &self,
            _content: &str,
            _embedding: &Embedding,
            _significance: u8,
        ) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    struct AcceptingApi;

    #[async_trait]
    impl PrimaryChannel for AcceptingApi {
        async fn publish(
            &self,
            _content: &str,
            _media: Option<&MediaAttachment>,
        ) -> Result<Option<String>, CollaboratorError> {
            Ok(Some("1850".to_string()))
        }
    }

    struct SilentSession;

    #[async_trait]
    impl FallbackChannel for SilentSession {
        async fn publish(
            &self,
            _content: &str,
            _media: Option<&MediaAttachment>,
        ) -> Result<Value, CollaboratorError> {
            Ok(Value::Null)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_panic_does_not_stop_next_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("herald.db");
        let generator = Arc::new(FlakyGenerator::default());

        let publisher = PublishCoordinator::new(
            Arc::new(AcceptingApi),
            Arc::new(SilentSession),
            Duration::from_secs(5),
        );
        let pipeline = Pipeline::new(
            Arc::new(FundedWallet),
            Arc::clone(&generator) as Arc<dyn Generator>,
            Arc::new(EmptyMemory),
            publisher,
            PipelineConfig::default(),
        )
        .unwrap();
        let store = Store::open(&db_path).unwrap();
        let supervisor = Arc::new(RunSupervisor::new(pipeline, Arc::new(store)));

        // Window opens immediately; triggers at 10s and 20s.
        let policy = SchedulePolicy {
            activation_horizon: DurationRange::from_secs(0, 0),
            window_duration: DurationRange::from_secs(100, 100),
            trigger_offset: DurationRange::from_secs(10, 10),
            idle_poll: Duration::from_secs(60),
            active_poll: Duration::from_secs(1),
        };
        let mut scheduler = Scheduler::from_entropy(policy).unwrap();
        let executor = executor(Arc::clone(&supervisor));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx, &executor).await });

        tokio::time::sleep(Duration::from_secs(25)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.runs_started, 2);
        assert_eq!(stats.runs_failed, 1);
        assert_eq!(stats.cycles_failed, 0);
        assert_eq!(generator.generations.load(Ordering::SeqCst), 2);

        let session = Store::open(&db_path).unwrap().session().unwrap();
        assert_eq!(session.count_posts().unwrap(), 1);
    }

    fn report(disposition: RunDisposition) -> RunReport {
        RunReport { run: 1, disposition }
    }

    #[test]
    fn test_run_status_mapping() {
        let completed = RunDisposition::Completed(PipelineResult {
            significance_score: 2,
            post_id: None,
            channel_used: ChannelUsed::None,
            persisted_to_memory: false,
            content: "gm".to_string(),
        });
        assert_eq!(run_status(&report(completed)), RunStatus::Completed);
        assert_eq!(
            run_status(&report(RunDisposition::GateClosed {
                readiness: 0.0,
                threshold: 0.1
            })),
            RunStatus::Skipped
        );
        assert_eq!(
            run_status(&report(RunDisposition::Failed {
                step: Some(RunStep::Generate),
                score: None,
                error: "boom".to_string()
            })),
            RunStatus::Failed
        );
        assert_eq!(
            run_status(&report(RunDisposition::Panicked {
                step: None,
                score: None,
                message: "boom".to_string()
            })),
            RunStatus::Failed
        );
    }
}
