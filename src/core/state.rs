use std::ops::Range;

use crate::{
    core::{
        action::{ConstantAction, VariableAction},
        battery::Battery,
        context::OptimizerContext,
        error::{Error, Result},
        forecast::Forecast,
        grid::TimeGrid,
        mutation::Mutation,
    },
    quantity::{Zero, cost::Euro, energy::WattHours, power::Watts},
};

/// Slack on energy-conservation checks.
pub(crate) const ENERGY_TOLERANCE: WattHours = WattHours(1e-6);

/// Slack on power-bound checks.
pub(crate) const POWER_TOLERANCE: Watts = Watts(1e-9);

/// Audit tolerance on the incrementally tracked cost.
pub(crate) const COST_TOLERANCE: Euro = Euro(1e-6);

/// One candidate solution together with its derived caches: the net demand
/// curve, battery charge levels, and the total cost. All caches are kept
/// current incrementally as moves land; [`Self::audit`] re-derives them from
/// the decision vectors and cross-checks the cost.
pub struct ScheduleState<'a> {
    pub(crate) grid: &'a TimeGrid,
    pub(crate) forecast: &'a Forecast,
    pub(crate) constants: &'a [ConstantAction],
    pub(crate) variables: &'a [VariableAction],
    pub(crate) batteries: &'a [Battery],

    /// Chosen start step per constant action.
    pub(crate) constant_starts: Vec<usize>,
    /// Covered step count per constant action.
    pub(crate) constant_durations: Vec<usize>,
    /// Feasible start-step range per constant action.
    pub(crate) constant_ranges: Vec<Range<usize>>,

    /// Window as a step range per variable action.
    pub(crate) variable_windows: Vec<Range<usize>>,
    /// Allocation per variable action, indexed by offset inside its window.
    pub(crate) variable_allocations: Vec<Vec<Watts>>,

    /// Signed flow per battery per step: positive charges.
    pub(crate) battery_flows: Vec<Vec<Watts>>,
    /// Charge per battery at the start of each step, plus the terminal charge.
    pub(crate) battery_levels: Vec<Vec<WattHours>>,

    /// Net demand per step: baseline + loads + battery flow − generation.
    net: Vec<Watts>,

    /// Incrementally tracked total cost.
    cost: Euro,
}

impl<'a> ScheduleState<'a> {
    /// Build the canonical starting point: constant actions at their earliest
    /// start, variable actions spread uniformly over their windows, batteries
    /// idle.
    pub fn initial(
        grid: &'a TimeGrid,
        forecast: &'a Forecast,
        context: &'a OptimizerContext,
    ) -> Result<Self> {
        let constants = context.constant_actions.as_slice();
        let variables = context.variable_actions.as_slice();
        let batteries = context.batteries.as_slice();

        let mut constant_starts = Vec::with_capacity(constants.len());
        let mut constant_durations = Vec::with_capacity(constants.len());
        let mut constant_ranges = Vec::with_capacity(constants.len());
        for action in constants {
            let range = action.start_steps(grid)?;
            constant_starts.push(range.start);
            constant_durations.push(grid.steps_in(action.duration)?);
            constant_ranges.push(range);
        }

        let mut variable_windows = Vec::with_capacity(variables.len());
        let mut variable_allocations = Vec::with_capacity(variables.len());
        for action in variables {
            let window = action.window_steps(grid)?;
            let allocation = Self::uniform_allocation(action, grid, &window)?;
            variable_windows.push(window);
            variable_allocations.push(allocation);
        }

        let battery_flows = batteries.iter().map(|_| vec![Watts::ZERO; grid.len()]).collect();
        let battery_levels = batteries
            .iter()
            .map(|battery| vec![battery.initial_charge; grid.len() + 1])
            .collect();

        let mut state = Self {
            grid,
            forecast,
            constants,
            variables,
            batteries,
            constant_starts,
            constant_durations,
            constant_ranges,
            variable_windows,
            variable_allocations,
            battery_flows,
            battery_levels,
            net: vec![Watts::ZERO; grid.len()],
            cost: Euro::ZERO,
        };
        state.rebuild();
        Ok(state)
    }

    /// Spread the energy uniformly over the window; the remainder lands on the
    /// last step so that the allocated total matches exactly.
    #[expect(clippy::cast_precision_loss)]
    fn uniform_allocation(
        action: &VariableAction,
        grid: &TimeGrid,
        window: &Range<usize>,
    ) -> Result<Vec<Watts>> {
        let n = window.len();
        let ceiling = action.max_power * grid.step() * n as f64;
        if action.total > ceiling + ENERGY_TOLERANCE {
            return Err(Error::InfeasibleInstance(format!(
                "load `{}`: {} does not fit under {} over {n} steps",
                action.id, action.total, action.max_power
            )));
        }
        let per_step = (action.total / grid.step() / n as f64).min(action.max_power);
        let mut allocation = vec![per_step; n];
        let remainder = action.total / grid.step() - per_step * (n as f64 - 1.0);
        allocation[n - 1] = remainder.clamp(Watts::ZERO, action.max_power);
        Ok(allocation)
    }

    #[must_use]
    pub fn total_cost(&self) -> Euro {
        self.cost
    }

    /// One decision per constant start, per variable-action window step, and
    /// per battery step.
    pub(crate) fn n_decision_variables(&self) -> usize {
        self.constants.len()
            + self.variable_allocations.iter().map(Vec::len).sum::<usize>()
            + self.batteries.len() * self.grid.len()
    }

    /// Grid cost of one step if its net demand were `net`.
    fn cost_at(&self, index: usize, net: Watts) -> Euro {
        let energy = net * self.grid.step();
        if energy >= WattHours::ZERO {
            energy * self.forecast.import_rates[index]
        } else {
            energy * self.forecast.export_rates[index]
        }
    }

    fn step_cost(&self, index: usize) -> Euro {
        self.cost_at(index, self.net[index])
    }

    /// Check a proposed move against the hard constraints and price it,
    /// without touching the state. [`None`] means the move is infeasible.
    pub fn evaluate(&self, mutation: &Mutation) -> Option<Euro> {
        match *mutation {
            Mutation::ShiftConstant { action, to } => {
                if !self.constant_ranges[action].contains(&to) {
                    return None;
                }
                let from = self.constant_starts[action];
                let duration = self.constant_durations[action];
                let consumption = self.constants[action].consumption;
                let mut delta = Euro::ZERO;
                for step in to..to + duration {
                    if !(from..from + duration).contains(&step) {
                        delta += self.cost_at(step, self.net[step] + consumption)
                            - self.step_cost(step);
                    }
                }
                for step in from..from + duration {
                    if !(to..to + duration).contains(&step) {
                        delta += self.cost_at(step, self.net[step] - consumption)
                            - self.step_cost(step);
                    }
                }
                Some(delta)
            }
            Mutation::ShiftEnergy { action, from, to, amount } => {
                let window = &self.variable_windows[action];
                let occupied = self.variable_allocations[action][from - window.start];
                let target = self.variable_allocations[action][to - window.start];
                let cap = self.variables[action].max_power;
                if amount <= Watts::ZERO
                    || amount > occupied + POWER_TOLERANCE
                    || target + amount > cap + POWER_TOLERANCE
                {
                    return None;
                }
                Some(
                    self.cost_at(from, self.net[from] - amount) - self.step_cost(from)
                        + self.cost_at(to, self.net[to] + amount)
                        - self.step_cost(to),
                )
            }
            Mutation::ShiftFlow { battery, from, to, amount } => {
                let limits = &self.batteries[battery];
                let flows = &self.battery_flows[battery];
                let new_from = flows[from] + amount;
                let new_to = flows[to] - amount;
                let lower = -limits.max_discharge - POWER_TOLERANCE;
                let upper = limits.max_charge + POWER_TOLERANCE;
                if amount == Watts::ZERO
                    || new_from < lower
                    || new_from > upper
                    || new_to < lower
                    || new_to > upper
                {
                    return None;
                }
                // The charge corridor shifts on the steps between the pair;
                // beyond it the two changes cancel.
                let (range, shift) = Self::level_shift(self.grid, from, to, amount);
                let levels = &self.battery_levels[battery];
                for step in range {
                    let level = levels[step] + shift;
                    if level < -ENERGY_TOLERANCE || level > limits.capacity + ENERGY_TOLERANCE {
                        return None;
                    }
                }
                Some(
                    self.cost_at(from, self.net[from] + amount) - self.step_cost(from)
                        + self.cost_at(to, self.net[to] - amount)
                        - self.step_cost(to),
                )
            }
        }
    }

    /// Land a move previously priced by [`Self::evaluate`] on this exact state.
    pub fn apply(&mut self, mutation: &Mutation, delta: Euro) {
        match *mutation {
            Mutation::ShiftConstant { action, to } => {
                let from = self.constant_starts[action];
                let duration = self.constant_durations[action];
                let consumption = self.constants[action].consumption;
                for step in from..from + duration {
                    if !(to..to + duration).contains(&step) {
                        self.net[step] -= consumption;
                    }
                }
                for step in to..to + duration {
                    if !(from..from + duration).contains(&step) {
                        self.net[step] += consumption;
                    }
                }
                self.constant_starts[action] = to;
            }
            Mutation::ShiftEnergy { action, from, to, amount } => {
                let start = self.variable_windows[action].start;
                self.variable_allocations[action][from - start] -= amount;
                self.variable_allocations[action][to - start] += amount;
                self.net[from] -= amount;
                self.net[to] += amount;
            }
            Mutation::ShiftFlow { battery, from, to, amount } => {
                self.battery_flows[battery][from] += amount;
                self.battery_flows[battery][to] -= amount;
                self.net[from] += amount;
                self.net[to] -= amount;
                let (range, shift) = Self::level_shift(self.grid, from, to, amount);
                for step in range {
                    self.battery_levels[battery][step] += shift;
                }
            }
        }
        self.cost += delta;
    }

    /// Charge-level adjustment induced by `flow[from] += amount` together
    /// with `flow[to] -= amount`: only the levels between the pair shift, by
    /// the transferred energy.
    fn level_shift(
        grid: &TimeGrid,
        from: usize,
        to: usize,
        amount: Watts,
    ) -> (Range<usize>, WattHours) {
        let energy = amount * grid.step();
        if from < to { (from + 1..to + 1, energy) } else { (to + 1..from + 1, -energy) }
    }

    /// Re-derive every cache from the decision vectors.
    pub(crate) fn rebuild(&mut self) {
        for (index, net) in self.net.iter_mut().enumerate() {
            *net = self.forecast.baseline[index] - self.forecast.generation[index];
        }
        for (index, action) in self.constants.iter().enumerate() {
            let start = self.constant_starts[index];
            for step in start..start + self.constant_durations[index] {
                self.net[step] += action.consumption;
            }
        }
        for (index, window) in self.variable_windows.iter().enumerate() {
            for (offset, step) in window.clone().enumerate() {
                self.net[step] += self.variable_allocations[index][offset];
            }
        }
        for (index, battery) in self.batteries.iter().enumerate() {
            let flows = &self.battery_flows[index];
            let levels = &mut self.battery_levels[index];
            levels[0] = battery.initial_charge;
            for (step, flow) in flows.iter().enumerate() {
                self.net[step] += *flow;
                levels[step + 1] = levels[step] + *flow * self.grid.step();
            }
        }
        self.cost = (0..self.grid.len()).map(|index| self.step_cost(index)).sum();
    }

    /// Rebuild the caches and verify the tracked cost has not drifted.
    pub(crate) fn audit(&mut self) -> Result<()> {
        let tracked = self.cost;
        self.rebuild();
        let drift = (tracked - self.cost).abs();
        let tolerance = COST_TOLERANCE.max(Euro(self.cost.0.abs() * 1e-9));
        if drift > tolerance {
            return Err(Error::Numerical { drift: drift.0 });
        }
        Ok(())
    }
}

/// Decision vectors of the best state seen so far. Captures reuse the
/// existing buffers, so tracking the best state does not allocate inside the
/// annealing loop.
pub(crate) struct Snapshot {
    pub constant_starts: Vec<usize>,
    pub variable_allocations: Vec<Vec<Watts>>,
    pub battery_flows: Vec<Vec<Watts>>,
    pub cost: Euro,
}

impl Snapshot {
    pub fn of(state: &ScheduleState<'_>) -> Self {
        Self {
            constant_starts: state.constant_starts.clone(),
            variable_allocations: state.variable_allocations.clone(),
            battery_flows: state.battery_flows.clone(),
            cost: state.cost,
        }
    }

    pub fn capture(&mut self, state: &ScheduleState<'_>) {
        self.constant_starts.clone_from(&state.constant_starts);
        self.variable_allocations.clone_from(&state.variable_allocations);
        self.battery_flows.clone_from(&state.battery_flows);
        self.cost = state.cost;
    }

    /// Load the captured decision vectors back and re-derive the caches.
    pub fn restore(&self, state: &mut ScheduleState<'_>) {
        state.constant_starts.clone_from(&self.constant_starts);
        state.variable_allocations.clone_from(&self.variable_allocations);
        state.battery_flows.clone_from(&self.battery_flows);
        state.rebuild();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Local, TimeDelta, TimeZone, Timelike};

    use super::*;
    use crate::{
        core::{id::Id, provider::Sample, solver::SolverParams},
        ops::Interval,
        quantity::rate::WattHourRate,
    };

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
    }

    /// Six one-hour steps, expensive for the first three hours.
    fn context() -> OptimizerContext {
        OptimizerContext::builder()
            .start(start())
            .end(start() + TimeDelta::hours(6))
            .step(TimeDelta::hours(1))
            .price(Box::new(|interval: Interval| {
                Ok(if interval.start.hour() < 3 {
                    WattHourRate(0.0003)
                } else {
                    WattHourRate(0.0001)
                })
            }) as Box<dyn Sample<WattHourRate>>)
            .constant_actions(vec![ConstantAction {
                id: Id::from("washer"),
                start_from: start(),
                end_before: start() + TimeDelta::hours(6),
                duration: TimeDelta::hours(2),
                consumption: Watts(1000.0),
            }])
            .variable_actions(vec![VariableAction {
                id: Id::from("ev"),
                window: Interval::new(start(), start() + TimeDelta::hours(6)),
                total: WattHours(3000.0),
                max_power: Watts(2000.0),
            }])
            .batteries(vec![Battery {
                id: Id::from("cellar"),
                capacity: WattHours(4000.0),
                max_charge: Watts(1500.0),
                max_discharge: Watts(1500.0),
                initial_charge: WattHours(1000.0),
            }])
            .build()
    }

    fn assert_invariants(state: &ScheduleState<'_>) {
        for index in 0..state.constants.len() {
            assert!(state.constant_ranges[index].contains(&state.constant_starts[index]));
        }
        for (index, action) in state.variables.iter().enumerate() {
            let allocated: WattHours = state.variable_allocations[index]
                .iter()
                .map(|power| *power * state.grid.step())
                .sum();
            assert!((allocated - action.total).abs() <= WattHours(1e-3));
            for power in &state.variable_allocations[index] {
                assert!(*power >= -POWER_TOLERANCE);
                assert!(*power <= action.max_power + POWER_TOLERANCE);
            }
        }
        for (index, battery) in state.batteries.iter().enumerate() {
            let flows = &state.battery_flows[index];
            let levels = &state.battery_levels[index];
            assert_eq!(levels[0], battery.initial_charge);
            for (step, flow) in flows.iter().enumerate() {
                assert!(*flow >= -battery.max_discharge - POWER_TOLERANCE);
                assert!(*flow <= battery.max_charge + POWER_TOLERANCE);
                let derived = levels[step] + *flow * state.grid.step();
                assert!((derived - levels[step + 1]).abs() <= WattHours(1e-3));
            }
            for level in levels {
                assert!(*level >= -WattHours(1e-3));
                assert!(*level <= battery.capacity + WattHours(1e-3));
            }
        }
    }

    #[test]
    fn initial_state_is_canonical() {
        let context = context();
        let grid = context.grid().unwrap();
        let forecast = Forecast::sample(&grid, &context).unwrap();
        let state = ScheduleState::initial(&grid, &forecast, &context).unwrap();

        assert_eq!(state.constant_starts, vec![0]);
        assert_eq!(state.variable_allocations, vec![vec![Watts(500.0); 6]]);
        assert_eq!(state.battery_flows, vec![vec![Watts::ZERO; 6]]);
        assert_invariants(&state);

        // Steps 0..2 carry the washer and the spread: (1500 Wh × 2 + 500 Wh)
        // at the high rate, the rest at the low rate.
        let expected = 0.0003 * (1500.0 + 1500.0 + 500.0) + 0.0001 * (500.0 * 3.0);
        assert!((state.total_cost().0 - expected).abs() < 1e-9);
    }

    #[test]
    fn overfull_variable_action_is_infeasible() {
        let mut context = context();
        context.variable_actions[0].total = WattHours(20_000.0);
        let grid = context.grid().unwrap();
        let forecast = Forecast::sample(&grid, &context).unwrap();
        let Err(error) = ScheduleState::initial(&grid, &forecast, &context) else {
            panic!("the overfull load must be infeasible");
        };
        assert!(matches!(error, Error::InfeasibleInstance(_)));
    }

    #[test]
    fn evaluate_rejects_constraint_violations() {
        let context = context();
        let grid = context.grid().unwrap();
        let forecast = Forecast::sample(&grid, &context).unwrap();
        let state = ScheduleState::initial(&grid, &forecast, &context).unwrap();

        // Start step outside the feasible range.
        assert!(state.evaluate(&Mutation::ShiftConstant { action: 0, to: 5 }).is_none());
        // Transfer exceeding the per-step cap.
        assert!(
            state
                .evaluate(&Mutation::ShiftEnergy {
                    action: 0,
                    from: 0,
                    to: 1,
                    amount: Watts(1600.0),
                })
                .is_none()
        );
        // Discharge below an empty enough battery.
        assert!(
            state
                .evaluate(&Mutation::ShiftFlow {
                    battery: 0,
                    from: 0,
                    to: 1,
                    amount: Watts(-1500.0),
                })
                .is_none()
        );
    }

    #[test]
    fn incremental_cost_tracks_recomputation() {
        let context = context();
        let grid = context.grid().unwrap();
        let forecast = Forecast::sample(&grid, &context).unwrap();
        let mut state = ScheduleState::initial(&grid, &forecast, &context).unwrap();
        let params = SolverParams::default();
        let mut rng = fastrand::Rng::with_seed(17);

        let mut applied = 0;
        for _ in 0..5000 {
            let Some(mutation) = Mutation::random(&mut rng, &state, &params) else {
                continue;
            };
            let Some(delta) = state.evaluate(&mutation) else {
                continue;
            };
            let full_before: Euro = (0..state.grid.len()).map(|step| state.step_cost(step)).sum();
            state.apply(&mutation, delta);
            applied += 1;

            // The priced delta must match a full-horizon recomputation.
            let full_after: Euro = (0..state.grid.len()).map(|step| state.step_cost(step)).sum();
            assert!((full_after - full_before - delta).abs() <= Euro(1e-9));

            if applied % 500 == 0 {
                let tracked = state.total_cost();
                state.rebuild();
                assert!((tracked - state.total_cost()).abs() <= COST_TOLERANCE);
                assert_invariants(&state);
            }
        }
        assert!(applied > 1000, "the move generator starved: {applied}");
        assert_invariants(&state);
        state.audit().unwrap();
    }
}
