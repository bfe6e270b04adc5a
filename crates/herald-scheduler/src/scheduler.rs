//! Scheduler loop implementation.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::window::instant_after;
use crate::{Phase, SchedulePolicy, SchedulerError};

/// Type alias for the run executor function.
///
/// The executor is awaited to completion before the next trigger is sampled,
/// so two runs never overlap.
pub type RunExecutor =
    Box<dyn Fn(RunTicket) -> Pin<Box<dyn Future<Output = RunStatus> + Send>> + Send + Sync>;

/// Identifies one fired trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    /// Run number since the scheduler started (1-based).
    pub sequence: u64,
    /// Window number the run belongs to (1-based).
    pub window: u64,
    /// Wall-clock time the trigger fired.
    pub fired_at: DateTime<Utc>,
}

/// How a run ended, as far as the scheduler cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The run went through to the end.
    Completed,
    /// The run stopped early without error (e.g. a gate was closed).
    Skipped,
    /// The run failed; details were logged by the executor.
    Failed,
}

/// Counters reported when the scheduler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub windows_opened: u64,
    pub runs_started: u64,
    pub runs_failed: u64,
    pub cycles_failed: u64,
}

/// How a single idle/active cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleEnd {
    Deactivated,
    Shutdown,
}

/// Result of a cancellable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Elapsed,
    Shutdown,
}

/// The randomized activation-window scheduler.
pub struct Scheduler<R = StdRng> {
    policy: SchedulePolicy,
    rng: R,
    stats: SchedulerStats,
}

impl Scheduler<StdRng> {
    /// Create a scheduler seeded from OS entropy.
    pub fn from_entropy(policy: SchedulePolicy) -> Result<Self, SchedulerError> {
        Self::new(policy, StdRng::from_entropy())
    }
}

impl<R: Rng + Send> Scheduler<R> {
    /// Create a new scheduler with an explicit random source.
    pub fn new(policy: SchedulePolicy, rng: R) -> Result<Self, SchedulerError> {
        policy.validate()?;
        Ok(Self {
            policy,
            rng,
            stats: SchedulerStats::default(),
        })
    }

    /// Run the scheduler loop until shutdown is signalled.
    ///
    /// A cycle that errors or panics is logged and the idle phase starts over;
    /// this function only returns on shutdown.
    pub async fn run(
        &mut self,
        mut shutdown_rx: watch::Receiver<bool>,
        executor: &RunExecutor,
    ) -> SchedulerStats {
        info!(policy = ?self.policy, "scheduler starting");

        loop {
            if *shutdown_rx.borrow() {
                info!("scheduler shutting down");
                break;
            }

            let cycle = AssertUnwindSafe(self.run_cycle(&mut shutdown_rx, executor))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(SchedulerError::CyclePanicked(panic_message(payload.as_ref())))
                });

            match cycle {
                Ok(CycleEnd::Deactivated) => {}
                Ok(CycleEnd::Shutdown) => {
                    info!("scheduler received shutdown signal");
                    break;
                }
                Err(e) => {
                    self.stats.cycles_failed += 1;
                    error!(
                        error = %e,
                        cycles_failed = self.stats.cycles_failed,
                        "scheduling cycle failed, restarting idle phase"
                    );
                    // Back off one idle poll so a persistent failure cannot spin.
                    let deadline = instant_after(Instant::now(), self.policy.idle_poll);
                    if wait_until(deadline, &mut shutdown_rx).await == Wake::Shutdown {
                        break;
                    }
                }
            }
        }

        info!(stats = ?self.stats, "scheduler shut down gracefully");
        self.stats
    }

    /// One idle phase followed by one active window.
    async fn run_cycle(
        &mut self,
        shutdown_rx: &mut watch::Receiver<bool>,
        executor: &RunExecutor,
    ) -> Result<CycleEnd, SchedulerError> {
        let horizon = self.policy.activation_horizon.sample(&mut self.rng)?;
        let duration = self.policy.window_duration.sample(&mut self.rng)?;
        let mut phase = Phase::Idle {
            activation: instant_after(Instant::now(), horizon),
        };
        let mut window_seq = self.stats.windows_opened;

        info!(
            activation = %wall_clock_in(horizon),
            deactivation = %wall_clock_in(horizon.saturating_add(duration)),
            duration_mins = format!("{:.1}", duration.as_secs_f64() / 60.0),
            "next cycle scheduled"
        );

        loop {
            if *shutdown_rx.borrow() {
                return Ok(CycleEnd::Shutdown);
            }

            let now = Instant::now();
            let poll = match phase {
                Phase::Idle { activation } if now < activation => self.policy.idle_poll,
                Phase::Idle { .. } => {
                    let offset = self.policy.trigger_offset.sample(&mut self.rng)?;
                    phase = phase.activate(now, duration, offset);
                    self.stats.windows_opened += 1;
                    window_seq = self.stats.windows_opened;
                    info!(window = window_seq, "pipeline activated");
                    log_next_trigger(&phase, now);
                    continue;
                }
                Phase::Active { window, .. } if !window.is_open(now) => {
                    info!(
                        window = window_seq,
                        runs = self.stats.runs_started,
                        "pipeline deactivated"
                    );
                    return Ok(CycleEnd::Deactivated);
                }
                Phase::Active {
                    trigger: Some(trigger),
                    ..
                } if trigger.is_due(now) => {
                    self.fire(window_seq, executor).await;
                    let offset = self.policy.trigger_offset.sample(&mut self.rng)?;
                    let now = Instant::now();
                    phase = phase.retrigger(now, offset);
                    log_next_trigger(&phase, now);
                    continue;
                }
                Phase::Active { .. } => self.policy.active_poll,
            };

            if wait_until(phase.next_wake(now, poll), shutdown_rx).await == Wake::Shutdown {
                return Ok(CycleEnd::Shutdown);
            }
        }
    }

    /// Invoke the executor for one trigger and wait for it to finish.
    async fn fire(&mut self, window: u64, executor: &RunExecutor) {
        self.stats.runs_started += 1;
        let ticket = RunTicket {
            sequence: self.stats.runs_started,
            window,
            fired_at: Utc::now(),
        };

        info!(run = ticket.sequence, window, "running pipeline");

        match executor(ticket).await {
            RunStatus::Completed => debug!(run = ticket.sequence, "run completed"),
            RunStatus::Skipped => debug!(run = ticket.sequence, "run skipped"),
            RunStatus::Failed => {
                self.stats.runs_failed += 1;
                warn!(
                    run = ticket.sequence,
                    runs_failed = self.stats.runs_failed,
                    "run failed"
                );
            }
        }
    }
}

/// Sleep until `deadline`, returning early if shutdown is signalled.
async fn wait_until(deadline: Instant, shutdown_rx: &mut watch::Receiver<bool>) -> Wake {
    tokio::select! {
        biased;

        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                Wake::Shutdown
            } else {
                Wake::Elapsed
            }
        }

        _ = sleep_until(deadline) => Wake::Elapsed,
    }
}

fn log_next_trigger(phase: &Phase, now: Instant) {
    match phase {
        Phase::Active {
            trigger: Some(trigger),
            ..
        } => {
            let wait = trigger.at.saturating_duration_since(now);
            info!(
                next_run = %wall_clock_in(wait),
                secs_from_now = format!("{:.1}", wait.as_secs_f64()),
                "next run scheduled"
            );
        }
        Phase::Active { window, .. } => {
            debug!(
                closes_in_secs = window.deactivation.saturating_duration_since(now).as_secs(),
                "no further run fits in this window"
            );
        }
        Phase::Idle { .. } => {}
    }
}

fn wall_clock_in(delay: Duration) -> String {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::DurationRange;

    fn fixed_policy(horizon: u64, window: u64, offset: u64) -> SchedulePolicy {
        SchedulePolicy {
            activation_horizon: DurationRange::from_secs(horizon, horizon),
            window_duration: DurationRange::from_secs(window, window),
            trigger_offset: DurationRange::from_secs(offset, offset),
            idle_poll: Duration::from_secs(60),
            active_poll: Duration::from_secs(1),
        }
    }

    fn seeded(policy: SchedulePolicy) -> Scheduler<StdRng> {
        Scheduler::new(policy, StdRng::seed_from_u64(42)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_policy() {
        let policy = SchedulePolicy {
            window_duration: DurationRange::from_secs(10, 1),
            ..SchedulePolicy::default()
        };
        assert!(Scheduler::new(policy, StdRng::seed_from_u64(0)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_fire_at_offsets_inside_window() {
        let start = Instant::now();
        let fired: Arc<Mutex<Vec<(u64, Duration)>>> = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&fired);
        let executor: RunExecutor = Box::new(move |ticket| {
            let record = Arc::clone(&record);
            Box::pin(async move {
                record
                    .lock()
                    .unwrap()
                    .push((ticket.window, Instant::now() - start));
                RunStatus::Completed
            })
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut scheduler = seeded(fixed_policy(0, 100, 10));
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx, &executor).await });

        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        let fired = fired.lock().unwrap();
        let first_window: Vec<Duration> = fired
            .iter()
            .filter(|(window, _)| *window == 1)
            .map(|(_, at)| *at)
            .collect();

        // Triggers at 10, 20, ..., 90; the one at 100 would land on deactivation.
        assert_eq!(first_window.len(), 9);
        for at in &first_window {
            assert!(*at >= Duration::from_secs(10));
            assert!(*at < Duration::from_secs(100));
        }
        assert!(stats.windows_opened >= 2);
        assert_eq!(stats.runs_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_never_overlap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let executor: RunExecutor = {
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            let runs = Arc::clone(&runs);
            Box::new(move |_ticket| {
                let in_flight = Arc::clone(&in_flight);
                let max_seen = Arc::clone(&max_seen);
                let runs = Arc::clone(&runs);
                Box::pin(async move {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(current, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    RunStatus::Completed
                })
            })
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Zero offset: a new trigger is due as soon as the previous run returns.
        let mut scheduler = seeded(fixed_policy(0, 60, 0));
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx, &executor).await });

        tokio::time::sleep(Duration::from_secs(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 5);
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_idle_wait() {
        let executor: RunExecutor = Box::new(|_ticket| Box::pin(async { RunStatus::Completed }));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut scheduler = seeded(fixed_policy(3600, 300, 30));

        let start = Instant::now();
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx, &executor).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.runs_started, 0);
        assert_eq!(stats.windows_opened, 0);
        assert!(Instant::now() - start < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_runs_do_not_stop_schedule() {
        let executor: RunExecutor = Box::new(|_ticket| Box::pin(async { RunStatus::Failed }));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut scheduler = seeded(fixed_policy(0, 100, 10));
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx, &executor).await });

        tokio::time::sleep(Duration::from_secs(55)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.runs_started, 5);
        assert_eq!(stats.runs_failed, 5);
        assert_eq!(stats.cycles_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_policy_does_not_kill_loop() {
        // Built directly so the policy skips validation.
        let mut scheduler = Scheduler {
            policy: SchedulePolicy {
                activation_horizon: DurationRange {
                    min: Duration::from_secs(u64::MAX / 2),
                    max: Duration::from_secs(u64::MAX / 2),
                },
                idle_poll: Duration::from_secs(u64::MAX),
                ..fixed_policy(0, 100, 10)
            },
            rng: StdRng::seed_from_u64(3),
            stats: SchedulerStats::default(),
        };
        let executor: RunExecutor = Box::new(|_ticket| Box::pin(async { RunStatus::Completed }));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx, &executor).await });

        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.runs_started, 0);
        assert_eq!(stats.cycles_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_run_restarts_idle_phase() {
        let executor: RunExecutor = Box::new(|ticket| {
            Box::pin(async move {
                if ticket.sequence == 1 {
                    panic!("collaborator exploded");
                }
                RunStatus::Completed
            })
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut scheduler = seeded(fixed_policy(0, 100, 10));
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx, &executor).await });

        // Panic at t=10, back off one idle poll (60s), new window at t=70, run at t=80.
        tokio::time::sleep(Duration::from_secs(95)).await;
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap();

        assert_eq!(stats.cycles_failed, 1);
        assert_eq!(stats.windows_opened, 2);
        assert!(stats.runs_started >= 2);
    }
}
