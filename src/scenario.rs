use chrono::{DateTime, Local, TimeDelta};
use serde::Deserialize;

use crate::{
    core::{
        action::{ConstantAction, PastAction, VariableAction},
        battery::Battery,
        context::OptimizerContext,
        id::Id,
        provider::{Curve, Sample},
    },
    ops::Interval,
    prelude::*,
    quantity::{energy::WattHours, power::Watts, rate::WattHourRate},
};

/// Declarative solve input in human units: kW, kWh, and €/kWh.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Start of the planning horizon.
    pub start: DateTime<Local>,

    /// Optional explicit horizon end.
    pub end: Option<DateTime<Local>>,

    #[serde(default = "default_timestep_minutes")]
    pub timestep_minutes: i64,

    /// Import price curve, €/kWh.
    pub prices: Vec<CurveEntry>,

    /// Optional sell price curve, €/kWh.
    #[serde(default)]
    pub sell_prices: Vec<CurveEntry>,

    /// Optional generation forecast, kW.
    #[serde(default)]
    pub generation: Vec<CurveEntry>,

    #[serde(default)]
    pub loads: Vec<Load>,

    /// Already-committed loads that only raise the baseline.
    #[serde(default)]
    pub past_loads: Vec<PastLoad>,

    #[serde(default)]
    pub batteries: Vec<BatteryEntry>,
}

const fn default_timestep_minutes() -> i64 {
    15
}

/// One piece of a piecewise-constant curve.
#[derive(Deserialize)]
pub struct CurveEntry {
    pub from: DateTime<Local>,
    pub to: DateTime<Local>,
    pub value: f64,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Load {
    /// Fixed profile, deferrable start.
    Constant {
        id: String,
        start_from: DateTime<Local>,
        end_before: DateTime<Local>,
        duration_minutes: i64,
        kw: f64,
    },

    /// Flexible profile within a window.
    Variable {
        id: String,
        from: DateTime<Local>,
        to: DateTime<Local>,
        kwh: f64,
        max_kw: f64,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PastLoad {
    pub start: DateTime<Local>,
    pub duration_minutes: i64,
    pub kw: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryEntry {
    pub id: String,
    pub capacity_kwh: f64,
    pub max_charge_kw: f64,
    pub max_discharge_kw: f64,
    pub initial_kwh: f64,
}

impl Scenario {
    /// Convert into the solver context.
    pub fn into_context(self) -> Result<OptimizerContext> {
        ensure!(!self.prices.is_empty(), "a scenario needs a price curve");

        let mut constant_actions = Vec::new();
        let mut variable_actions = Vec::new();
        for load in self.loads {
            match load {
                Load::Constant { id, start_from, end_before, duration_minutes, kw } => {
                    constant_actions.push(ConstantAction {
                        id: Id::from(id),
                        start_from,
                        end_before,
                        duration: TimeDelta::minutes(duration_minutes),
                        consumption: Watts::from_kilowatts(kw),
                    });
                }
                Load::Variable { id, from, to, kwh, max_kw } => {
                    variable_actions.push(VariableAction {
                        id: Id::from(id),
                        window: Interval::new(from, to),
                        total: WattHours::from_kilowatt_hours(kwh),
                        max_power: Watts::from_kilowatts(max_kw),
                    });
                }
            }
        }

        let past_actions = self
            .past_loads
            .into_iter()
            .map(|load| PastAction {
                start: load.start,
                duration: TimeDelta::minutes(load.duration_minutes),
                consumption: Watts::from_kilowatts(load.kw),
            })
            .collect();

        let batteries = self
            .batteries
            .into_iter()
            .map(|battery| Battery {
                id: Id::from(battery.id),
                capacity: WattHours::from_kilowatt_hours(battery.capacity_kwh),
                max_charge: Watts::from_kilowatts(battery.max_charge_kw),
                max_discharge: Watts::from_kilowatts(battery.max_discharge_kw),
                initial_charge: WattHours::from_kilowatt_hours(battery.initial_kwh),
            })
            .collect();

        let export_price = (!self.sell_prices.is_empty())
            .then(|| Box::new(rate_curve(self.sell_prices)) as Box<dyn Sample<WattHourRate>>);
        let generation = (!self.generation.is_empty())
            .then(|| Box::new(power_curve(self.generation)) as Box<dyn Sample<Watts>>);

        Ok(OptimizerContext::builder()
            .start(self.start)
            .maybe_end(self.end)
            .step(TimeDelta::minutes(self.timestep_minutes))
            .price(Box::new(rate_curve(self.prices)))
            .maybe_export_price(export_price)
            .maybe_generation(generation)
            .constant_actions(constant_actions)
            .variable_actions(variable_actions)
            .past_actions(past_actions)
            .batteries(batteries)
            .build())
    }
}

fn rate_curve(entries: Vec<CurveEntry>) -> Curve<WattHourRate> {
    Curve::new(
        entries
            .into_iter()
            .map(|entry| {
                (
                    Interval::new(entry.from, entry.to),
                    WattHourRate::from_euro_per_kilowatt_hour(entry.value),
                )
            })
            .collect(),
    )
}

fn power_curve(entries: Vec<CurveEntry>) -> Curve<Watts> {
    Curve::new(
        entries
            .into_iter()
            .map(|entry| (Interval::new(entry.from, entry.to), Watts::from_kilowatts(entry.value)))
            .collect(),
    )
}
