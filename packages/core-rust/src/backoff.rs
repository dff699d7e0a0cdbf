//! Backoff schedules for polling and for resubmission after ignorable errors.
//!
//! Both schedules are total functions of a 1-based attempt number. The poll
//! schedule is a step ladder: each step names the attempt from which its delay
//! applies, and the delay stays at the last step forever after.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One rung of the poll ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollStep {
    /// First attempt (1-based) that uses this delay.
    pub from_attempt: u32,
    /// Wait before that attempt.
    pub delay: Duration,
}

const fn step(from_attempt: u32, secs: u64) -> PollStep {
    PollStep {
        from_attempt,
        delay: Duration::from_secs(secs),
    }
}

/// Ladder of the current protocol revision: fast early polling, then a fixed
/// five-minute cadence from attempt 12.
const CURRENT_LADDER: &[PollStep] = &[
    step(1, 5),
    step(2, 5),
    step(3, 10),
    step(5, 20),
    step(7, 40),
    step(9, 80),
    step(12, 300),
];

/// Ladder of the earlier protocol revision.
const LEGACY_LADDER: &[PollStep] = &[
    step(1, 10),
    step(3, 20),
    step(5, 40),
    step(7, 80),
    step(9, 160),
    step(12, 1600),
];

/// Errors building a [`PollSchedule`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("poll ladder is empty")]
    Empty,
    #[error("poll ladder must start at attempt 1, starts at {0}")]
    BadStart(u32),
    #[error("poll ladder steps must have increasing attempts and non-decreasing delays (step {0})")]
    NotMonotonic(usize),
    #[error("minimal first delay {minimal:?} exceeds the ladder's first delay {first:?}")]
    MinimalTooLong { minimal: Duration, first: Duration },
}

/// Wait schedule between result polls of one logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PollScheduleDef", into = "PollScheduleDef")]
pub struct PollSchedule {
    steps: Vec<PollStep>,
    minimal_first_delay: Duration,
}

#[derive(Serialize, Deserialize)]
struct PollScheduleDef {
    steps: Vec<PollStep>,
    minimal_first_delay: Duration,
}

impl TryFrom<PollScheduleDef> for PollSchedule {
    type Error = ScheduleError;

    fn try_from(def: PollScheduleDef) -> Result<Self, Self::Error> {
        Self::new(def.steps, def.minimal_first_delay)
    }
}

impl From<PollSchedule> for PollScheduleDef {
    fn from(schedule: PollSchedule) -> Self {
        Self {
            steps: schedule.steps,
            minimal_first_delay: schedule.minimal_first_delay,
        }
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            steps: CURRENT_LADDER.to_vec(),
            minimal_first_delay: Duration::from_secs(2),
        }
    }
}

impl PollSchedule {
    /// Builds a validated schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError`] if the ladder is empty, does not start at
    /// attempt 1, is not monotonic, or if the minimal first delay is longer
    /// than the regular first delay.
    pub fn new(steps: Vec<PollStep>, minimal_first_delay: Duration) -> Result<Self, ScheduleError> {
        let first = steps.first().ok_or(ScheduleError::Empty)?;
        if first.from_attempt != 1 {
            return Err(ScheduleError::BadStart(first.from_attempt));
        }
        for (i, pair) in steps.windows(2).enumerate() {
            if pair[1].from_attempt <= pair[0].from_attempt || pair[1].delay < pair[0].delay {
                return Err(ScheduleError::NotMonotonic(i + 1));
            }
        }
        if minimal_first_delay > first.delay {
            return Err(ScheduleError::MinimalTooLong {
                minimal: minimal_first_delay,
                first: first.delay,
            });
        }
        Ok(Self {
            steps,
            minimal_first_delay,
        })
    }

    /// The earlier protocol revision's ladder. Its first attempt has no
    /// shortened variant.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            steps: LEGACY_LADDER.to_vec(),
            minimal_first_delay: LEGACY_LADDER[0].delay,
        }
    }

    /// Wait before poll attempt `attempt` (1-based; 0 is treated as 1).
    /// `lightweight` operations use the shorter first delay.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, lightweight: bool) -> Duration {
        let attempt = attempt.max(1);
        if attempt == 1 && lightweight {
            return self.minimal_first_delay;
        }
        self.steps
            .iter()
            .take_while(|s| s.from_attempt <= attempt)
            .last()
            .map_or(Duration::ZERO, |s| s.delay)
    }

    /// The fixed delay the ladder settles into.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.steps.last().map_or(Duration::ZERO, |s| s.delay)
    }

    /// Attempt from which [`ceiling`](Self::ceiling) applies.
    #[must_use]
    pub fn ceiling_attempt(&self) -> u32 {
        self.steps.last().map_or(1, |s| s.from_attempt)
    }
}

/// Wait and cap for repeating a call that failed with an ignorable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResubmitSchedule {
    /// Fixed wait between attempts.
    pub delay: Duration,
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
}

impl Default for ResubmitSchedule {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(120),
            max_attempts: 5,
        }
    }
}

impl ResubmitSchedule {
    /// The earlier revision retried immediately.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: 5,
        }
    }

    /// Wait after failed attempt `attempt` before the next one.
    #[must_use]
    pub fn delay_for(&self, _attempt: u32) -> Duration {
        self.delay
    }

    /// Whether another attempt may follow failed attempt `attempt`.
    #[must_use]
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
