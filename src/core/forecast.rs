use crate::{
    core::{
        context::OptimizerContext,
        error::{Error, Result},
        grid::TimeGrid,
    },
    quantity::{Zero, power::Watts, rate::WattHourRate},
};

/// Per-step vectors sampled from the providers exactly once per solve.
pub struct Forecast {
    /// Average import price per step.
    pub import_rates: Vec<WattHourRate>,

    /// Price applied to exported energy; equals the import price unless a
    /// sell-price provider was supplied.
    pub export_rates: Vec<WattHourRate>,

    /// Average on-site generation power per step.
    pub generation: Vec<Watts>,

    /// Fixed demand per step from already-committed loads.
    pub baseline: Vec<Watts>,
}

impl Forecast {
    pub fn sample(grid: &TimeGrid, context: &OptimizerContext) -> Result<Self> {
        let mut import_rates = Vec::with_capacity(grid.len());
        let mut export_rates = context.export_price.as_ref().map(|_| Vec::with_capacity(grid.len()));
        let mut generation = Vec::with_capacity(grid.len());

        for index in 0..grid.len() {
            let interval = grid.interval_of(index);
            import_rates
                .push(context.price.sample(interval).map_err(Error::PrognosisUnavailable)?);
            if let (Some(provider), Some(rates)) = (&context.export_price, export_rates.as_mut()) {
                rates.push(provider.sample(interval).map_err(Error::PrognosisUnavailable)?);
            }
            generation.push(match &context.generation {
                Some(provider) => {
                    provider.sample(interval).map_err(Error::PrognosisUnavailable)?
                }
                None => Watts::ZERO,
            });
        }
        let export_rates = export_rates.unwrap_or_else(|| import_rates.clone());

        let mut baseline = vec![Watts::ZERO; grid.len()];
        for action in &context.past_actions {
            let committed = action.interval();
            for (index, power) in baseline.iter_mut().enumerate() {
                if let Some(overlap) = grid.interval_of(index).intersect(committed) {
                    // Pro-rata for runs that straddle the horizon start.
                    *power += action.consumption
                        * (overlap.len().as_seconds_f64() / grid.step().as_seconds_f64());
                }
            }
        }

        Ok(Self { import_rates, export_rates, generation, baseline })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Local, TimeDelta, TimeZone};

    use super::*;
    use crate::{
        core::{action::PastAction, provider::Sample},
        ops::Interval,
    };

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
    }

    fn context_with_past(past_actions: Vec<PastAction>) -> OptimizerContext {
        OptimizerContext::builder()
            .start(start())
            .end(start() + TimeDelta::hours(4))
            .step(TimeDelta::hours(1))
            .price(Box::new(|_: Interval| Ok(WattHourRate(0.0002)))
                as Box<dyn Sample<WattHourRate>>)
            .past_actions(past_actions)
            .build()
    }

    #[test]
    fn export_defaults_to_import() {
        let context = context_with_past(vec![]);
        let grid = context.grid().unwrap();
        let forecast = Forecast::sample(&grid, &context).unwrap();
        assert_eq!(forecast.import_rates, forecast.export_rates);
        assert_eq!(forecast.generation, vec![Watts::ZERO; 4]);
    }

    #[test]
    fn straddling_past_action_is_prorated() {
        // Committed from one hour before the horizon, running for two hours.
        let context = context_with_past(vec![PastAction {
            start: start() - TimeDelta::hours(1),
            duration: TimeDelta::hours(2),
            consumption: Watts(1000.0),
        }]);
        let grid = context.grid().unwrap();
        let forecast = Forecast::sample(&grid, &context).unwrap();
        assert_eq!(
            forecast.baseline,
            vec![Watts(1000.0), Watts::ZERO, Watts::ZERO, Watts::ZERO],
        );
    }

    #[test]
    fn provider_failure_is_fatal() {
        let context = OptimizerContext::builder()
            .start(start())
            .end(start() + TimeDelta::hours(1))
            .step(TimeDelta::hours(1))
            .price(Box::new(|_: Interval| -> anyhow::Result<WattHourRate> {
                anyhow::bail!("the exchange is down")
            }) as Box<dyn Sample<WattHourRate>>)
            .build();
        let grid = context.grid().unwrap();
        let Err(error) = Forecast::sample(&grid, &context) else {
            panic!("the provider failure must abort the solve");
        };
        assert!(matches!(error, Error::PrognosisUnavailable(_)));
    }
}
