use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bon::Builder;
use enumset::EnumSet;

use crate::{
    core::{
        context::OptimizerContext,
        error::Result,
        forecast::Forecast,
        mutation::{Mutation, MutationKind},
        schedule::{Plan, Schedule},
        state::{ScheduleState, Snapshot},
    },
    prelude::{debug, info, instrument, trace},
    quantity::{Zero, cost::Euro},
};

/// Starting temperature when the warm-up sample shows no cost spread at all.
const FALLBACK_TEMPERATURE: f64 = 1e-3;

/// Annealing parameters. The defaults are tuned for day-ahead horizons at a
/// 15-minute resolution and converge in well under a second.
#[derive(Builder, Clone, Debug)]
pub struct SolverParams {
    /// Geometric cooling factor applied every cooling interval.
    #[builder(default = 0.995)]
    pub cooling_factor: f64,

    /// Multiplier on the warm-up cost-delta spread that sets the initial
    /// temperature.
    #[builder(default = 2.0)]
    pub initial_temperature_factor: f64,

    /// Number of moves sampled to estimate the initial temperature.
    #[builder(default = 64)]
    pub warmup_samples: usize,

    /// Cooling below this temperature stops the search.
    #[builder(default = 1e-9)]
    pub min_temperature: f64,

    /// Stop after this many consecutive iterations without an accepted move.
    #[builder(default = 20_000)]
    pub stall_limit: usize,

    /// Hard iteration cap.
    #[builder(default = 500_000)]
    pub max_iterations: usize,

    /// Iterations between cooling steps; `#steps × #decision variables` when
    /// absent.
    pub cooling_interval: Option<usize>,

    /// Accepted moves between audits of the incrementally tracked cost.
    #[builder(default = 1024)]
    pub audit_interval: usize,

    /// Identical seeds with identical inputs reproduce the schedule bit for
    /// bit.
    #[builder(default = 0)]
    pub seed: u64,

    /// Enabled move kinds.
    #[builder(default = EnumSet::all())]
    pub moves: EnumSet<MutationKind>,

    /// Relative probability of drawing a load move.
    #[builder(default = 1.0)]
    pub load_move_weight: f64,

    /// Relative probability of drawing a battery move.
    #[builder(default = 1.0)]
    pub battery_move_weight: f64,

    /// Cooperative cancellation flag, checked between iterations.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// How the search ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum Termination {
    /// The temperature dropped below the floor.
    #[display("cooled")]
    Cooled,

    /// No move was available or accepted within the stall window.
    #[display("stalled")]
    Stalled,

    /// The iteration cap was reached.
    #[display("iteration limit")]
    IterationLimit,

    /// The cancellation flag was raised; the best schedule found so far is
    /// returned.
    #[display("cancelled")]
    Cancelled,
}

/// Simulated-annealing search over load placements and battery flows.
#[derive(Builder)]
pub struct Solver<'a> {
    context: &'a OptimizerContext,

    #[builder(default)]
    params: SolverParams,
}

impl Solver<'_> {
    /// Validate the context, build the canonical initial schedule, and anneal.
    #[instrument(skip_all)]
    pub fn solve(self) -> Result<Plan> {
        let grid = self.context.grid()?;
        self.context.validate(&grid)?;
        let forecast = Forecast::sample(&grid, self.context)?;
        let mut state = ScheduleState::initial(&grid, &forecast, self.context)?;
        let mut rng = fastrand::Rng::with_seed(self.params.seed);

        let initial_cost = state.total_cost();
        let mut best = Snapshot::of(&state);
        info!(steps = grid.len(), cost = %initial_cost, "starting from the canonical schedule");

        let termination = if state.n_decision_variables() == 0 {
            Termination::Stalled
        } else {
            self.anneal(&mut state, &mut best, &mut rng)?
        };

        best.restore(&mut state);
        let total_cost = state.total_cost();
        info!(%total_cost, %termination, "annealed");
        Ok(Plan { total_cost, termination, schedule: Schedule::materialize(&state) })
    }

    fn anneal(
        &self,
        state: &mut ScheduleState<'_>,
        best: &mut Snapshot,
        rng: &mut fastrand::Rng,
    ) -> Result<Termination> {
        let params = &self.params;
        let cooling_interval = params
            .cooling_interval
            .unwrap_or_else(|| state.grid.len() * state.n_decision_variables())
            .max(1);
        let audit_interval = params.audit_interval.max(1);
        let mut temperature = self.initial_temperature(state, rng);
        debug!(temperature, cooling_interval, "warmed up");

        let mut accepted_total: usize = 0;
        let mut since_accepted: usize = 0;

        for iteration in 1..=params.max_iterations {
            if let Some(cancel) = &params.cancel
                && cancel.load(Ordering::Relaxed)
            {
                return Ok(Termination::Cancelled);
            }
            if temperature < params.min_temperature {
                return Ok(Termination::Cooled);
            }

            since_accepted += 1;
            if let Some(mutation) = Mutation::random(rng, state, params)
                && let Some(delta) = state.evaluate(&mutation)
                && (delta <= Euro::ZERO || rng.f64() < (-delta.0 / temperature).exp())
            {
                state.apply(&mutation, delta);
                accepted_total += 1;
                since_accepted = 0;
                if state.total_cost() < best.cost {
                    trace!(iteration, cost = %state.total_cost(), "new best");
                    best.capture(state);
                }
                if accepted_total % audit_interval == 0 {
                    state.audit()?;
                }
            }

            if since_accepted >= params.stall_limit {
                return Ok(Termination::Stalled);
            }
            if iteration % cooling_interval == 0 {
                temperature *= params.cooling_factor;
            }
        }
        Ok(Termination::IterationLimit)
    }

    /// Sample random moves from the initial state and derive the starting
    /// temperature from the spread of their cost deltas.
    #[expect(clippy::cast_precision_loss)]
    fn initial_temperature(&self, state: &ScheduleState<'_>, rng: &mut fastrand::Rng) -> f64 {
        let deltas: Vec<f64> = (0..self.params.warmup_samples)
            .filter_map(|_| Mutation::random(rng, state, &self.params))
            .filter_map(|mutation| state.evaluate(&mutation))
            .map(|delta| delta.0.abs())
            .collect();
        if deltas.is_empty() {
            return FALLBACK_TEMPERATURE;
        }
        let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
        let variance =
            deltas.iter().map(|delta| (delta - mean).powi(2)).sum::<f64>() / deltas.len() as f64;
        let spread = variance.sqrt();
        if spread > 0.0 {
            spread * self.params.initial_temperature_factor
        } else {
            mean.max(FALLBACK_TEMPERATURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Local, TimeDelta, TimeZone, Timelike};
    use itertools::Itertools;

    use super::*;
    use crate::{
        core::{
            action::{ConstantAction, PastAction, VariableAction},
            battery::Battery,
            error::Error,
            id::Id,
            provider::Sample,
        },
        ops::Interval,
        quantity::{Zero, energy::WattHours, power::Watts, rate::WattHourRate},
    };

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
    }

    /// Price that switches at the given hour, €/kWh.
    fn two_rate_price(
        switch_hour: u32,
        before: f64,
        after: f64,
    ) -> Box<dyn Sample<WattHourRate>> {
        Box::new(move |interval: Interval| {
            Ok(WattHourRate::from_euro_per_kilowatt_hour(
                if interval.start.hour() < switch_hour { before } else { after },
            ))
        })
    }

    fn flat_price(rate: f64) -> Box<dyn Sample<WattHourRate>> {
        Box::new(move |_: Interval| Ok(WattHourRate::from_euro_per_kilowatt_hour(rate)))
    }

    fn solve(context: &OptimizerContext, seed: u64) -> Plan {
        Solver::builder()
            .context(context)
            .params(SolverParams::builder().seed(seed).build())
            .build()
            .solve()
            .unwrap()
    }

    #[test]
    fn constant_load_moves_to_the_cheap_half() {
        // 24 hours, expensive before noon: 10 €/MWh against 1 €/MWh after.
        let context = OptimizerContext::builder()
            .start(start())
            .step(TimeDelta::hours(1))
            .price(two_rate_price(12, 0.01, 0.001))
            .constant_actions(vec![ConstantAction {
                id: Id::from("heater"),
                start_from: start(),
                end_before: start() + TimeDelta::hours(24),
                duration: TimeDelta::hours(1),
                consumption: Watts(1000.0),
            }])
            .build();
        let plan = solve(&context, 7);

        let heater = plan.schedule.constant("heater").unwrap();
        assert!(heater.start.hour() >= 12, "landed at {}", heater.start);
        assert_eq!(heater.end, heater.start + TimeDelta::hours(1));
        assert!((plan.total_cost.0 - 0.001).abs() < 1e-12);
    }

    #[test]
    fn variable_load_drains_into_the_cheap_steps() {
        // Four hours, the last two are ten times cheaper.
        let context = OptimizerContext::builder()
            .start(start())
            .step(TimeDelta::hours(1))
            .price(two_rate_price(2, 0.01, 0.001))
            .variable_actions(vec![VariableAction {
                id: Id::from("ev"),
                window: Interval::new(start(), start() + TimeDelta::hours(4)),
                total: WattHours(2000.0),
                max_power: Watts(1000.0),
            }])
            .build();
        let plan = solve(&context, 7);

        let ev = plan.schedule.variable("ev").unwrap();
        assert!((ev.total() - WattHours(2000.0)).abs() <= WattHours(1e-3));
        for (_, power) in ev.steps() {
            assert!(power >= Watts::ZERO - Watts(1e-9));
            assert!(power <= Watts(1000.0) + Watts(1e-9));
        }
        // The optimum is 0.002 € with everything in the two cheap steps.
        assert!(plan.total_cost.0 < 0.0022, "cost {}", plan.total_cost);
        assert!(ev.consumption_at(start() - TimeDelta::hours(1)) == Watts::ZERO);
        assert!(ev.consumption_at(start() + TimeDelta::hours(4)) == Watts::ZERO);
    }

    #[test]
    fn battery_arbitrages_the_price_swing() {
        // Cheap first two hours, expensive afterwards.
        let context = OptimizerContext::builder()
            .start(start())
            .end(start() + TimeDelta::hours(4))
            .step(TimeDelta::hours(1))
            .price(two_rate_price(2, 0.001, 0.01))
            .batteries(vec![Battery {
                id: Id::from("cellar"),
                capacity: WattHours(2000.0),
                max_charge: Watts(1000.0),
                max_discharge: Watts(1000.0),
                initial_charge: WattHours::ZERO,
            }])
            .build();
        let plan = solve(&context, 7);

        // Charging 2 kWh at 1 €/MWh and selling it at 10 €/MWh nets up to
        // −0.018 €.
        assert!(plan.total_cost < Euro(-0.012), "cost {}", plan.total_cost);
        let cellar = plan.schedule.battery("cellar").unwrap();
        // Paired flow moves preserve the terminal charge.
        assert!(cellar.final_level().abs() <= WattHours(1e-3));
        for hour in 0..4 {
            let time = start() + TimeDelta::hours(hour);
            let level = cellar.level_at(time).unwrap();
            assert!(level >= -WattHours(1e-3));
            assert!(level <= WattHours(2000.0) + WattHours(1e-3));
            let flow = cellar.flow_at(time).unwrap();
            assert!(flow.abs() <= Watts(1000.0) + Watts(1e-9));
        }
        assert!(cellar.level_at(start() + TimeDelta::hours(4)).is_none());
    }

    #[test]
    fn overcommitted_variable_load_fails_before_the_loop() {
        let context = OptimizerContext::builder()
            .start(start())
            .step(TimeDelta::hours(1))
            .price(flat_price(0.01))
            .variable_actions(vec![VariableAction {
                id: Id::from("ev"),
                window: Interval::new(start(), start() + TimeDelta::hours(2)),
                total: WattHours(3000.0),
                max_power: Watts(1000.0),
            }])
            .build();
        let Err(error) = Solver::builder().context(&context).build().solve() else {
            panic!("the overcommitted load must be infeasible");
        };
        assert!(matches!(error, Error::InfeasibleInstance(_)));
    }

    #[test]
    fn past_load_raises_the_baseline_without_entering_the_schedule() {
        let context = OptimizerContext::builder()
            .start(start())
            .end(start() + TimeDelta::hours(4))
            .step(TimeDelta::hours(1))
            .price(flat_price(0.01))
            .past_actions(vec![PastAction {
                start: start(),
                duration: TimeDelta::hours(1),
                consumption: Watts(5000.0),
            }])
            .variable_actions(vec![VariableAction {
                id: Id::from("ev"),
                window: Interval::new(start(), start() + TimeDelta::hours(4)),
                total: WattHours(1000.0),
                max_power: Watts(1000.0),
            }])
            .build();
        let plan = solve(&context, 7);

        // Only the decided load shows up.
        assert_eq!(plan.schedule.len(), 1);
        assert!(plan.schedule.variable("ev").is_some());
        // 5 kWh of committed baseline plus 1 kWh of flexible load at 10 €/MWh.
        assert!((plan.total_cost.0 - 0.06).abs() < 1e-9);
    }

    #[test]
    fn identical_seeds_reproduce_the_schedule_bit_for_bit() {
        let build = || {
            OptimizerContext::builder()
                .start(start())
                .step(TimeDelta::hours(1))
                .price(two_rate_price(2, 0.01, 0.001))
                .constant_actions(vec![ConstantAction {
                    id: Id::from("washer"),
                    start_from: start(),
                    end_before: start() + TimeDelta::hours(4),
                    duration: TimeDelta::hours(1),
                    consumption: Watts(800.0),
                }])
                .variable_actions(vec![VariableAction {
                    id: Id::from("ev"),
                    window: Interval::new(start(), start() + TimeDelta::hours(4)),
                    total: WattHours(2000.0),
                    max_power: Watts(1000.0),
                }])
                .batteries(vec![Battery {
                    id: Id::from("cellar"),
                    capacity: WattHours(2000.0),
                    max_charge: Watts(1000.0),
                    max_discharge: Watts(1000.0),
                    initial_charge: WattHours(500.0),
                }])
                .build()
        };
        let left = solve(&build(), 123);
        let right = solve(&build(), 123);

        assert_eq!(left.total_cost.0.to_bits(), right.total_cost.0.to_bits());
        assert_eq!(left.termination, right.termination);
        assert_eq!(
            left.schedule.constant("washer").unwrap().start,
            right.schedule.constant("washer").unwrap().start,
        );
        let allocations = |plan: &Plan| {
            plan.schedule.variable("ev").unwrap().steps().map(|(_, power)| power).collect_vec()
        };
        assert_eq!(allocations(&left), allocations(&right));
        let flows = |plan: &Plan| {
            (0..4)
                .map(|hour| {
                    let time = start() + TimeDelta::hours(hour);
                    plan.schedule.battery("cellar").unwrap().flow_at(time).unwrap()
                })
                .collect_vec()
        };
        assert_eq!(flows(&left), flows(&right));
    }

    #[test]
    fn nothing_to_decide_returns_the_baseline_cost() {
        let context = OptimizerContext::builder()
            .start(start())
            .step(TimeDelta::hours(1))
            .price(flat_price(0.01))
            .past_actions(vec![PastAction {
                start: start(),
                duration: TimeDelta::hours(1),
                consumption: Watts(2000.0),
            }])
            .build();
        let plan = solve(&context, 7);

        assert!(plan.schedule.is_empty());
        assert_eq!(plan.termination, Termination::Stalled);
        assert!((plan.total_cost.0 - 0.02).abs() < 1e-12);
        assert!(plan.schedule.get("anything").is_none());
    }

    #[test]
    fn raised_cancellation_flag_returns_the_best_so_far() {
        let context = OptimizerContext::builder()
            .start(start())
            .step(TimeDelta::hours(1))
            .price(flat_price(0.01))
            .constant_actions(vec![ConstantAction {
                id: Id::from("washer"),
                start_from: start(),
                end_before: start() + TimeDelta::hours(4),
                duration: TimeDelta::hours(1),
                consumption: Watts(800.0),
            }])
            .build();
        let cancel = Arc::new(AtomicBool::new(true));
        let plan = Solver::builder()
            .context(&context)
            .params(SolverParams::builder().seed(7).cancel(cancel).build())
            .build()
            .solve()
            .unwrap();

        assert_eq!(plan.termination, Termination::Cancelled);
        // The canonical initial schedule comes back untouched.
        assert_eq!(plan.schedule.constant("washer").unwrap().start, start());
        assert!((plan.total_cost.0 - 0.008).abs() < 1e-12);
    }
}
