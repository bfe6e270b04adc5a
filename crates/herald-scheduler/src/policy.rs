//! Scheduling policy: the bounded ranges every random draw comes from.

use std::time::Duration;

use rand::Rng;

use crate::SchedulerError;

/// Upper bound of the idle-phase activation horizon (10 minutes).
pub const DEFAULT_ACTIVATION_HORIZON_SECS: u64 = 600;

/// Shortest active window (5 minutes).
pub const DEFAULT_MIN_WINDOW_SECS: u64 = 300;

/// Longest active window (10 minutes).
pub const DEFAULT_MAX_WINDOW_SECS: u64 = 600;

/// Shortest gap before the next run inside a window.
pub const DEFAULT_MIN_TRIGGER_OFFSET_SECS: u64 = 30;

/// Longest gap before the next run inside a window.
pub const DEFAULT_MAX_TRIGGER_OFFSET_SECS: u64 = 180;

/// Coarse poll interval while idle.
pub const DEFAULT_IDLE_POLL_SECS: u64 = 60;

/// Fine poll interval while a window is open.
pub const DEFAULT_ACTIVE_POLL_MILLIS: u64 = 500;

/// Longest duration any range or poll interval may hold (one day).
pub const MAX_SCHEDULE_SECS: u64 = 86_400;

/// An inclusive range of durations sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationRange {
    pub min: Duration,
    pub max: Duration,
}

impl DurationRange {
    /// Create a range from whole seconds.
    pub fn from_secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }

    /// Check that the range is not inverted and stays within one day.
    pub fn validate(&self, name: &str) -> Result<(), SchedulerError> {
        self.check_order(name)?;
        check_upper_bound(name, self.max)
    }

    fn check_order(&self, name: &str) -> Result<(), SchedulerError> {
        if self.min > self.max {
            return Err(SchedulerError::InvalidConfig(format!(
                "{} range is inverted: min {:?} > max {:?}",
                name, self.min, self.max
            )));
        }
        Ok(())
    }

    /// Draw a duration uniformly from `[min, max]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Duration, SchedulerError> {
        self.check_order("sampled")?;
        if self.min == self.max {
            return Ok(self.min);
        }
        let secs = rng.gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        // Float rounding may land a hair outside the range.
        Ok(Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max)
            .clamp(self.min, self.max))
    }
}

/// The ranges and poll intervals that drive the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// How far from now the next activation may land.
    pub activation_horizon: DurationRange,
    /// How long an active window stays open.
    pub window_duration: DurationRange,
    /// Gap between "now" and the next run trigger inside a window.
    pub trigger_offset: DurationRange,
    /// Longest single wait while idle.
    pub idle_poll: Duration,
    /// Longest single wait while a window is open.
    pub active_poll: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            activation_horizon: DurationRange::from_secs(0, DEFAULT_ACTIVATION_HORIZON_SECS),
            window_duration: DurationRange::from_secs(
                DEFAULT_MIN_WINDOW_SECS,
                DEFAULT_MAX_WINDOW_SECS,
            ),
            trigger_offset: DurationRange::from_secs(
                DEFAULT_MIN_TRIGGER_OFFSET_SECS,
                DEFAULT_MAX_TRIGGER_OFFSET_SECS,
            ),
            idle_poll: Duration::from_secs(DEFAULT_IDLE_POLL_SECS),
            active_poll: Duration::from_millis(DEFAULT_ACTIVE_POLL_MILLIS),
        }
    }
}

impl SchedulePolicy {
    /// Validate every range and poll interval.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.activation_horizon.validate("activation horizon")?;
        self.window_duration.validate("window duration")?;
        self.trigger_offset.validate("trigger offset")?;

        if self.window_duration.max.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "window duration must be positive".to_string(),
            ));
        }
        if self.idle_poll.is_zero() || self.active_poll.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "poll intervals must be positive".to_string(),
            ));
        }
        check_upper_bound("idle poll", self.idle_poll)?;
        check_upper_bound("active poll", self.active_poll)
    }
}

fn check_upper_bound(name: &str, value: Duration) -> Result<(), SchedulerError> {
    if value > Duration::from_secs(MAX_SCHEDULE_SECS) {
        return Err(SchedulerError::InvalidConfig(format!(
            "{} of {:?} exceeds the {}s limit",
            name, value, MAX_SCHEDULE_SECS
        )));
    }
    Ok(())
}
