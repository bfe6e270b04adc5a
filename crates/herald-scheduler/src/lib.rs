//! Randomized activation-window scheduler for Herald.
//!
//! This crate provides the wall-clock loop that decides when a pipeline run
//! should start:
//! - An idle phase that waits for a randomly sampled activation time
//! - An active window of random duration during which runs fire at random offsets
//! - Strictly sequential runs (the loop awaits each run before resampling)
//! - Cancellable waits driven by a shutdown channel

mod error;
mod policy;
mod scheduler;
mod window;

pub use error::SchedulerError;
pub use policy::{
    DEFAULT_ACTIVATION_HORIZON_SECS, DEFAULT_ACTIVE_POLL_MILLIS, DEFAULT_IDLE_POLL_SECS,
    DEFAULT_MAX_TRIGGER_OFFSET_SECS, DEFAULT_MAX_WINDOW_SECS, DEFAULT_MIN_TRIGGER_OFFSET_SECS,
    DEFAULT_MIN_WINDOW_SECS, DurationRange, SchedulePolicy,
};
pub use scheduler::{
    RunExecutor, RunStatus, RunTicket, Scheduler, SchedulerStats, panic_message,
};
pub use window::{Phase, RunTrigger, ScheduleWindow, next_trigger};
