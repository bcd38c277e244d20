use std::collections::HashMap;

use chrono::{DateTime, Local, TimeDelta};

use crate::{
    core::{id::Id, solver::Termination, state::ScheduleState},
    ops::Interval,
    quantity::{Zero, cost::Euro, energy::WattHours, power::Watts},
};

/// Result of a solve: the objective value, the materialized schedule, and how
/// the search ended.
#[must_use]
pub struct Plan {
    /// Net cost of grid-imported energy over the horizon; negative when the
    /// site earns money.
    pub total_cost: Euro,

    pub schedule: Schedule,
    pub termination: Termination,
}

/// Final assignment per load and battery, addressable by identifier.
#[must_use]
pub struct Schedule {
    entries: Vec<Entry>,
    index: HashMap<Id, usize>,
}

pub enum Entry {
    Constant(AssignedConstantAction),
    Variable(AssignedVariableAction),
    Battery(AssignedBattery),
}

impl Entry {
    #[must_use]
    pub fn id(&self) -> &Id {
        match self {
            Self::Constant(action) => &action.id,
            Self::Variable(action) => &action.id,
            Self::Battery(battery) => &battery.id,
        }
    }
}

/// Fixed-profile load pinned to its chosen start.
pub struct AssignedConstantAction {
    pub id: Id,
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub consumption: Watts,
}

/// Flexible load with its chosen per-step allocation.
pub struct AssignedVariableAction {
    pub id: Id,
    pub window: Interval,
    step: TimeDelta,
    consumption: Vec<Watts>,
}

impl AssignedVariableAction {
    /// Allocated draw during the step enclosing the instant; zero outside the
    /// window.
    #[must_use]
    #[expect(clippy::cast_sign_loss)]
    pub fn consumption_at(&self, time: DateTime<Local>) -> Watts {
        if !self.window.contains(time) {
            return Watts::ZERO;
        }
        let offset =
            ((time - self.window.start).num_seconds() / self.step.num_seconds()) as usize;
        self.consumption[offset]
    }

    #[must_use]
    pub fn total(&self) -> WattHours {
        self.consumption.iter().map(|power| *power * self.step).sum()
    }

    /// Per-step allocation, earliest first.
    pub fn steps(&self) -> impl Iterator<Item = (Interval, Watts)> + '_ {
        self.consumption.iter().enumerate().map(|(offset, power)| {
            let start = self.window.start + self.step * i32::try_from(offset).unwrap_or(i32::MAX);
            (Interval::new(start, start + self.step), *power)
        })
    }
}

/// Battery with its charge trajectory.
pub struct AssignedBattery {
    pub id: Id,
    horizon: Interval,
    step: TimeDelta,
    flow: Vec<Watts>,
    level: Vec<WattHours>,
}

impl AssignedBattery {
    /// Charge at the start of the step enclosing the instant, or [`None`]
    /// outside the horizon.
    #[must_use]
    pub fn level_at(&self, time: DateTime<Local>) -> Option<WattHours> {
        self.offset_of(time).map(|offset| self.level[offset])
    }

    /// Average flow over the step enclosing the instant; positive charges.
    #[must_use]
    pub fn flow_at(&self, time: DateTime<Local>) -> Option<Watts> {
        self.offset_of(time).map(|offset| self.flow[offset])
    }

    /// Charge remaining after the last step.
    #[must_use]
    pub fn final_level(&self) -> WattHours {
        self.level[self.level.len() - 1]
    }

    #[expect(clippy::cast_sign_loss)]
    fn offset_of(&self, time: DateTime<Local>) -> Option<usize> {
        self.horizon.contains(time).then(|| {
            ((time - self.horizon.start).num_seconds() / self.step.num_seconds()) as usize
        })
    }
}

impl Schedule {
    /// Freeze a state into the caller-facing view.
    pub(crate) fn materialize(state: &ScheduleState<'_>) -> Self {
        let grid = state.grid;
        let mut entries = Vec::with_capacity(
            state.constants.len() + state.variables.len() + state.batteries.len(),
        );
        for (index, action) in state.constants.iter().enumerate() {
            let start = grid.time_of(state.constant_starts[index]);
            entries.push(Entry::Constant(AssignedConstantAction {
                id: action.id.clone(),
                start,
                end: start + action.duration,
                consumption: action.consumption,
            }));
        }
        for (index, action) in state.variables.iter().enumerate() {
            let window = &state.variable_windows[index];
            entries.push(Entry::Variable(AssignedVariableAction {
                id: action.id.clone(),
                window: Interval::new(grid.time_of(window.start), grid.time_of(window.end)),
                step: grid.step(),
                consumption: state.variable_allocations[index].clone(),
            }));
        }
        for (index, battery) in state.batteries.iter().enumerate() {
            entries.push(Entry::Battery(AssignedBattery {
                id: battery.id.clone(),
                horizon: Interval::new(grid.start(), grid.end()),
                step: grid.step(),
                flow: state.battery_flows[index].clone(),
                level: state.battery_levels[index].clone(),
            }));
        }
        let index: HashMap<Id, usize> = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.id().clone(), position))
            .collect();
        Self { entries, index }
    }

    /// Look up an entry by identifier; absent for unknown identifiers.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    #[must_use]
    pub fn constant(&self, id: &str) -> Option<&AssignedConstantAction> {
        match self.get(id) {
            Some(Entry::Constant(action)) => Some(action),
            _ => None,
        }
    }

    #[must_use]
    pub fn variable(&self, id: &str) -> Option<&AssignedVariableAction> {
        match self.get(id) {
            Some(Entry::Variable(action)) => Some(action),
            _ => None,
        }
    }

    #[must_use]
    pub fn battery(&self, id: &str) -> Option<&AssignedBattery> {
        match self.get(id) {
            Some(Entry::Battery(battery)) => Some(battery),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
