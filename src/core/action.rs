use std::ops::Range;

use chrono::{DateTime, Local, TimeDelta};

use crate::{
    core::{
        error::{Error, Result},
        grid::TimeGrid,
        id::Id,
    },
    ops::Interval,
    quantity::{Zero, energy::WattHours, power::Watts},
};

/// Deferrable load with a fixed profile: only the start time is negotiable.
#[derive(Debug, Clone)]
pub struct ConstantAction {
    pub id: Id,
    /// Earliest allowed start.
    pub start_from: DateTime<Local>,
    /// Latest allowed end.
    pub end_before: DateTime<Local>,
    pub duration: TimeDelta,
    /// Constant draw over the whole run.
    pub consumption: Watts,
}

impl ConstantAction {
    pub(crate) fn validate(&self, grid: &TimeGrid) -> Result<()> {
        if self.consumption < Watts::ZERO {
            return Err(Error::InvalidInput(format!("load `{}`: negative consumption", self.id)));
        }
        if self.duration > TimeDelta::hours(24) {
            return Err(Error::InvalidInput(format!(
                "load `{}`: duration {} exceeds 24 hours",
                self.id, self.duration
            )));
        }
        grid.steps_in(self.duration)?;
        if self.start_from + self.duration > self.end_before {
            return Err(Error::InvalidInput(format!(
                "load `{}` cannot run for {} between {} and {}",
                self.id, self.duration, self.start_from, self.end_before
            )));
        }
        if self.start_from < grid.start() || self.end_before > grid.end() {
            return Err(Error::InvalidInput(format!(
                "load `{}`: the window lies outside the horizon",
                self.id
            )));
        }
        Ok(())
    }

    /// Feasible start steps on the grid. Non-empty for a validated action.
    pub(crate) fn start_steps(&self, grid: &TimeGrid) -> Result<Range<usize>> {
        let duration = grid.steps_in(self.duration)?;
        let earliest = grid.floor_offset(self.start_from)?;
        let latest_end = grid.ceil_offset(self.end_before)?;
        Ok(earliest..latest_end - duration + 1)
    }
}

/// Deferrable load with a flexible profile: a fixed amount of energy spread
/// freely over the window under a per-step power cap.
#[derive(Debug, Clone)]
pub struct VariableAction {
    pub id: Id,
    pub window: Interval,
    /// Energy the load must receive over the window.
    pub total: WattHours,
    /// Per-step power cap.
    pub max_power: Watts,
}

impl VariableAction {
    pub(crate) fn validate(&self, grid: &TimeGrid) -> Result<()> {
        if self.total < WattHours::ZERO {
            return Err(Error::InvalidInput(format!("load `{}`: negative total energy", self.id)));
        }
        if self.max_power < Watts::ZERO {
            return Err(Error::InvalidInput(format!("load `{}`: negative power cap", self.id)));
        }
        if self.window.is_empty() {
            return Err(Error::InvalidInput(format!("load `{}`: empty window", self.id)));
        }
        let end = grid.aligned_offset(self.window.end)?;
        grid.aligned_offset(self.window.start)?;
        if end > grid.len() {
            return Err(Error::InvalidInput(format!(
                "load `{}`: the window lies outside the horizon",
                self.id
            )));
        }
        Ok(())
    }

    /// The window as a step range.
    pub(crate) fn window_steps(&self, grid: &TimeGrid) -> Result<Range<usize>> {
        Ok(grid.aligned_offset(self.window.start)?..grid.aligned_offset(self.window.end)?)
    }
}

/// Already-committed load: contributes to the fixed baseline and is never
/// rescheduled. It may have started before the horizon.
#[derive(Debug, Clone)]
pub struct PastAction {
    pub start: DateTime<Local>,
    pub duration: TimeDelta,
    pub consumption: Watts,
}

impl PastAction {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.consumption < Watts::ZERO {
            return Err(Error::InvalidInput("past load: negative consumption".to_string()));
        }
        if self.duration < TimeDelta::zero() {
            return Err(Error::InvalidInput("past load: negative duration".to_string()));
        }
        Ok(())
    }

    pub(crate) fn interval(&self) -> Interval {
        Interval::new(self.start, self.start + self.duration)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn grid() -> TimeGrid {
        let start = Local.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let end = Local.with_ymd_and_hms(2026, 8, 2, 0, 0, 0).unwrap();
        TimeGrid::try_new(Interval::new(start, end), TimeDelta::hours(1)).unwrap()
    }

    #[test]
    fn start_steps_cover_the_window() {
        let grid = grid();
        let action = ConstantAction {
            id: Id::from("dishwasher"),
            start_from: Local.with_ymd_and_hms(2026, 8, 1, 2, 0, 0).unwrap(),
            end_before: Local.with_ymd_and_hms(2026, 8, 1, 8, 0, 0).unwrap(),
            duration: TimeDelta::hours(2),
            consumption: Watts(800.0),
        };
        action.validate(&grid).unwrap();
        assert_eq!(action.start_steps(&grid).unwrap(), 2..7);
    }

    #[test]
    fn rejects_window_too_short() {
        let grid = grid();
        let action = ConstantAction {
            id: Id::from("dryer"),
            start_from: Local.with_ymd_and_hms(2026, 8, 1, 2, 0, 0).unwrap(),
            end_before: Local.with_ymd_and_hms(2026, 8, 1, 3, 0, 0).unwrap(),
            duration: TimeDelta::hours(2),
            consumption: Watts(800.0),
        };
        assert!(matches!(action.validate(&grid), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn rejects_misaligned_variable_window() {
        let grid = grid();
        let action = VariableAction {
            id: Id::from("ev"),
            window: Interval::new(
                Local.with_ymd_and_hms(2026, 8, 1, 2, 30, 0).unwrap(),
                Local.with_ymd_and_hms(2026, 8, 1, 8, 0, 0).unwrap(),
            ),
            total: WattHours(5000.0),
            max_power: Watts(3600.0),
        };
        assert!(matches!(action.validate(&grid), Err(Error::InvalidInput(_))));
    }
}
