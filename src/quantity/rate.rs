use crate::quantity::{cost::Euro, energy::WattHours};

quantity!(
    /// Price of energy, euro per watt-hour.
    WattHourRate, suffix: "€/Wh", precision: 6
);

impl WattHourRate {
    /// Convenience for human-scale prices.
    pub fn from_euro_per_kilowatt_hour(rate: f64) -> Self {
        Self(rate / 1000.0)
    }
}

mul!(WattHourRate, WattHours, Euro);
