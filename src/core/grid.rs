use chrono::{DateTime, Local, TimeDelta};

use crate::{
    core::error::{Error, Result},
    ops::Interval,
};

/// Discretization of the planning horizon into equal steps.
///
/// Step `index` covers `[time_of(index), time_of(index + 1))`.
#[derive(Copy, Clone, Debug)]
pub struct TimeGrid {
    start: DateTime<Local>,
    step: TimeDelta,
    n_steps: usize,
}

impl TimeGrid {
    pub fn try_new(horizon: Interval, step: TimeDelta) -> Result<Self> {
        if step <= TimeDelta::zero() {
            return Err(Error::InvalidInput(format!("the timestep must be positive, got {step}")));
        }
        if TimeDelta::hours(24).num_seconds() % step.num_seconds() != 0 {
            return Err(Error::InvalidInput(format!("timestep {step} does not divide 24 hours")));
        }
        if horizon.is_empty() {
            return Err(Error::InvalidHorizon(format!("empty horizon {horizon:?}")));
        }
        let n_steps = {
            let (n, d) = (horizon.len().num_seconds(), step.num_seconds());
            n / d + i64::from(n % d != 0)
        };
        let n_steps = usize::try_from(n_steps)
            .map_err(|_| Error::InvalidHorizon(format!("horizon {horizon:?} is too long")))?;
        Ok(Self { start: horizon.start, step, n_steps })
    }

    /// Number of steps in the horizon.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.n_steps
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.n_steps == 0
    }

    #[must_use]
    pub const fn step(&self) -> TimeDelta {
        self.step
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Local> {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> DateTime<Local> {
        self.time_of(self.n_steps)
    }

    /// Start instant of the step at the given index.
    #[must_use]
    #[expect(clippy::cast_possible_wrap)]
    pub fn time_of(&self, index: usize) -> DateTime<Local> {
        self.start + TimeDelta::seconds(self.step.num_seconds() * index as i64)
    }

    #[must_use]
    pub fn interval_of(&self, index: usize) -> Interval {
        Interval::new(self.time_of(index), self.time_of(index + 1))
    }

    /// Index of the step containing the instant, or [`None`] outside the horizon.
    #[must_use]
    #[expect(clippy::cast_sign_loss)]
    pub fn step_of(&self, time: DateTime<Local>) -> Option<usize> {
        if time < self.start {
            return None;
        }
        let index = ((time - self.start).num_seconds() / self.step.num_seconds()) as usize;
        (index < self.n_steps).then_some(index)
    }

    /// Number of whole steps in the duration, which must be a non-negative
    /// multiple of the timestep.
    #[expect(clippy::cast_sign_loss)]
    pub fn steps_in(&self, duration: TimeDelta) -> Result<usize> {
        if duration < TimeDelta::zero() {
            return Err(Error::InvalidInput(format!("negative duration {duration}")));
        }
        if duration.num_seconds() % self.step.num_seconds() != 0 {
            return Err(Error::InvalidInput(format!(
                "duration {duration} is not a multiple of the timestep {}",
                self.step
            )));
        }
        Ok((duration.num_seconds() / self.step.num_seconds()) as usize)
    }

    /// Step offset of a grid-aligned instant.
    pub fn aligned_offset(&self, time: DateTime<Local>) -> Result<usize> {
        if time < self.start {
            return Err(Error::InvalidInput(format!("{time} lies before the horizon")));
        }
        self.steps_in(time - self.start)
    }

    /// Offset of the step edge at or below the instant.
    #[expect(clippy::cast_sign_loss)]
    pub fn floor_offset(&self, time: DateTime<Local>) -> Result<usize> {
        if time < self.start {
            return Err(Error::InvalidInput(format!("{time} lies before the horizon")));
        }
        Ok(((time - self.start).num_seconds() / self.step.num_seconds()) as usize)
    }

    /// Offset of the step edge at or above the instant.
    #[expect(clippy::cast_sign_loss)]
    pub fn ceil_offset(&self, time: DateTime<Local>) -> Result<usize> {
        if time < self.start {
            return Err(Error::InvalidInput(format!("{time} lies before the horizon")));
        }
        let (n, d) = ((time - self.start).num_seconds(), self.step.num_seconds());
        Ok((n / d + i64::from(n % d != 0)) as usize)
    }
}
