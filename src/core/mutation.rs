use enumset::EnumSetType;

use crate::{
    core::{solver::SolverParams, state::ScheduleState},
    quantity::{Zero, power::Watts},
};

/// Kinds of local moves the annealer may propose.
#[derive(Debug, EnumSetType)]
pub enum MutationKind {
    /// Move a fixed-profile load to another feasible start step.
    ShiftConstant,
    /// Transfer energy of a flexible load between two of its window steps.
    ShiftEnergy,
    /// Transfer battery flow between two steps, preserving the final charge.
    ShiftFlow,
}

/// A proposed local move. Steps are absolute grid indices.
#[derive(Debug, Clone, Copy)]
pub enum Mutation {
    ShiftConstant { action: usize, to: usize },
    ShiftEnergy { action: usize, from: usize, to: usize, amount: Watts },
    ShiftFlow { battery: usize, from: usize, to: usize, amount: Watts },
}

impl Mutation {
    /// Draw a random move: a category first (loads against batteries,
    /// weighted), then the entity, then the move parameters. [`None`] means
    /// the draw degenerated (nothing movable, or a zero transfer); the caller
    /// simply proceeds to the next iteration.
    pub fn random(
        rng: &mut fastrand::Rng,
        state: &ScheduleState<'_>,
        params: &SolverParams,
    ) -> Option<Self> {
        let shiftable_constants =
            if params.moves.contains(MutationKind::ShiftConstant) { state.constants.len() } else { 0 };
        let shiftable_variables =
            if params.moves.contains(MutationKind::ShiftEnergy) { state.variables.len() } else { 0 };
        let n_loads = shiftable_constants + shiftable_variables;

        let load_weight = if n_loads > 0 { params.load_move_weight } else { 0.0 };
        let battery_weight = if params.moves.contains(MutationKind::ShiftFlow)
            && !state.batteries.is_empty()
            && state.grid.len() >= 2
        {
            params.battery_move_weight
        } else {
            0.0
        };
        let total_weight = load_weight + battery_weight;
        if total_weight <= 0.0 {
            return None;
        }

        if rng.f64() * total_weight < load_weight {
            let index = rng.usize(0..n_loads);
            if index < shiftable_constants {
                Self::random_constant_shift(rng, state, index)
            } else {
                Self::random_energy_shift(rng, state, index - shiftable_constants)
            }
        } else {
            let index = rng.usize(0..state.batteries.len());
            Self::random_flow_shift(rng, state, index)
        }
    }

    fn random_constant_shift(
        rng: &mut fastrand::Rng,
        state: &ScheduleState<'_>,
        action: usize,
    ) -> Option<Self> {
        let range = state.constant_ranges[action].clone();
        if range.len() < 2 {
            return None;
        }
        let from = state.constant_starts[action];
        let mut to = from;
        while to == from {
            to = rng.usize(range.clone());
        }
        Some(Self::ShiftConstant { action, to })
    }

    fn random_energy_shift(
        rng: &mut fastrand::Rng,
        state: &ScheduleState<'_>,
        action: usize,
    ) -> Option<Self> {
        let window = state.variable_windows[action].clone();
        if window.len() < 2 {
            return None;
        }
        let from = rng.usize(window.clone());
        let mut to = from;
        while to == from {
            to = rng.usize(window.clone());
        }
        let occupied = state.variable_allocations[action][from - window.start];
        let headroom = state.variables[action].max_power
            - state.variable_allocations[action][to - window.start];
        let ceiling = occupied.min(headroom);
        if ceiling <= Watts::ZERO {
            return None;
        }
        let amount = ceiling * rng.f64();
        (amount > Watts::ZERO).then_some(Self::ShiftEnergy { action, from, to, amount })
    }

    fn random_flow_shift(
        rng: &mut fastrand::Rng,
        state: &ScheduleState<'_>,
        battery: usize,
    ) -> Option<Self> {
        let n_steps = state.grid.len();
        let from = rng.usize(0..n_steps);
        let mut to = from;
        while to == from {
            to = rng.usize(0..n_steps);
        }
        let limits = &state.batteries[battery];
        let flows = &state.battery_flows[battery];
        // The transfer must keep both endpoints within the rate bounds; the
        // charge corridor in between is left to the feasibility check.
        let lower = (-limits.max_discharge - flows[from]).max(flows[to] - limits.max_charge);
        let upper = (limits.max_charge - flows[from]).min(flows[to] + limits.max_discharge);
        if upper <= lower {
            return None;
        }
        let amount = lower + (upper - lower) * rng.f64();
        (amount != Watts::ZERO).then_some(Self::ShiftFlow { battery, from, to, amount })
    }
}
