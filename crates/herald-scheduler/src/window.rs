//! Activation windows, run triggers and the phase state machine.

use std::time::Duration;

use tokio::time::Instant;

/// Roughly 30 years; stands in for "never" when an addition overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `base + delay`, saturating to a far-future instant instead of panicking.
pub(crate) fn instant_after(base: Instant, delay: Duration) -> Instant {
    base.checked_add(delay)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

/// An active period during which runs may be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub activation: Instant,
    pub deactivation: Instant,
    pub duration: Duration,
}

impl ScheduleWindow {
    /// Open a window at `activation` lasting `duration`.
    pub fn open(activation: Instant, duration: Duration) -> Self {
        Self {
            activation,
            deactivation: instant_after(activation, duration),
            duration,
        }
    }

    /// Whether new runs may still start at `now`.
    pub fn is_open(&self, now: Instant) -> bool {
        now < self.deactivation
    }

    /// Whether a trigger falls inside `[activation, deactivation)`.
    pub fn admits(&self, trigger: &RunTrigger) -> bool {
        trigger.at >= self.activation && trigger.at < self.deactivation
    }
}

/// An instant at which a pipeline run should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTrigger {
    pub at: Instant,
}

impl RunTrigger {
    /// Whether the trigger has been reached.
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.at
    }
}

/// Place the next trigger `offset` after `now`, or `None` when that instant
/// would fall outside the window.
pub fn next_trigger(window: &ScheduleWindow, now: Instant, offset: Duration) -> Option<RunTrigger> {
    let trigger = RunTrigger {
        at: instant_after(now.max(window.activation), offset),
    };
    window.admits(&trigger).then_some(trigger)
}

/// Where the scheduling loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the next window to open.
    Idle { activation: Instant },
    /// Inside a window, with at most one pending trigger.
    Active {
        window: ScheduleWindow,
        trigger: Option<RunTrigger>,
    },
}

impl Phase {
    /// Enter the active phase once the activation time is reached.
    ///
    /// Returns `self` unchanged when called on an active phase or too early.
    pub fn activate(self, now: Instant, duration: Duration, offset: Duration) -> Self {
        match self {
            Phase::Idle { activation } if now >= activation => {
                let window = ScheduleWindow::open(activation, duration);
                Phase::Active {
                    window,
                    trigger: next_trigger(&window, now, offset),
                }
            }
            other => other,
        }
    }

    /// Replace the pending trigger after a run finished (or was skipped).
    pub fn retrigger(self, now: Instant, offset: Duration) -> Self {
        match self {
            Phase::Active { window, .. } => Phase::Active {
                window,
                trigger: next_trigger(&window, now, offset),
            },
            idle => idle,
        }
    }

    /// The next instant the loop has to wake up for, capped by `poll`.
    pub fn next_wake(&self, now: Instant, poll: Duration) -> Instant {
        let target = match self {
            Phase::Idle { activation } => *activation,
            Phase::Active { window, trigger } => trigger
                .map(|t| t.at.min(window.deactivation))
                .unwrap_or(window.deactivation),
        };
        target.min(instant_after(now, poll))
    }
}
