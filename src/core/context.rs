use bon::Builder;
use chrono::{DateTime, Local, TimeDelta};
use itertools::Itertools;

use crate::{
    core::{
        action::{ConstantAction, PastAction, VariableAction},
        battery::Battery,
        error::{Error, Result},
        grid::TimeGrid,
        id::Id,
        provider::Sample,
    },
    ops::Interval,
    quantity::{power::Watts, rate::WattHourRate},
};

/// Everything a solve needs: timing, providers, and the devices to schedule.
#[derive(Builder)]
pub struct OptimizerContext {
    /// Start of the planning horizon.
    pub start: DateTime<Local>,

    /// Grid resolution.
    #[builder(default = TimeDelta::minutes(15))]
    pub step: TimeDelta,

    /// Explicit horizon end; the latest action window end when absent.
    pub end: Option<DateTime<Local>>,

    /// Import price.
    pub price: Box<dyn Sample<WattHourRate>>,

    /// Price credited for exported energy; the import price when absent.
    pub export_price: Option<Box<dyn Sample<WattHourRate>>>,

    /// Average on-site generation power.
    pub generation: Option<Box<dyn Sample<Watts>>>,

    #[builder(default)]
    pub constant_actions: Vec<ConstantAction>,

    #[builder(default)]
    pub variable_actions: Vec<VariableAction>,

    #[builder(default)]
    pub past_actions: Vec<PastAction>,

    #[builder(default)]
    pub batteries: Vec<Battery>,
}

impl OptimizerContext {
    /// Derive the time grid: from the start to the latest action window end,
    /// or to the explicit end when given.
    pub fn grid(&self) -> Result<TimeGrid> {
        let implied = self
            .constant_actions
            .iter()
            .map(|action| action.end_before)
            .chain(self.variable_actions.iter().map(|action| action.window.end))
            .chain(self.past_actions.iter().map(|action| action.interval().end))
            .max();
        let end = self.end.or(implied).ok_or_else(|| {
            Error::InvalidHorizon("nothing implies a horizon: no actions and no explicit end".to_string())
        })?;
        TimeGrid::try_new(Interval::new(self.start, end), self.step)
    }

    pub(crate) fn validate(&self, grid: &TimeGrid) -> Result<()> {
        if let Some(id) = self.ids().duplicates().next() {
            return Err(Error::InvalidInput(format!("duplicate identifier `{id}`")));
        }
        for action in &self.constant_actions {
            action.validate(grid)?;
        }
        for action in &self.variable_actions {
            action.validate(grid)?;
        }
        for action in &self.past_actions {
            action.validate()?;
        }
        for battery in &self.batteries {
            battery.validate()?;
        }
        Ok(())
    }

    fn ids(&self) -> impl Iterator<Item = &Id> {
        self.constant_actions
            .iter()
            .map(|action| &action.id)
            .chain(self.variable_actions.iter().map(|action| &action.id))
            .chain(self.batteries.iter().map(|battery| &battery.id))
    }
}
