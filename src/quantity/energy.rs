use std::ops::Div;

use chrono::TimeDelta;

use crate::quantity::power::Watts;

quantity!(
    /// Energy.
    WattHours, suffix: "Wh", precision: 1
);

impl WattHours {
    pub fn from_kilowatt_hours(kilowatt_hours: f64) -> Self {
        Self(kilowatt_hours * 1000.0)
    }
}

impl Div<TimeDelta> for WattHours {
    type Output = Watts;

    fn div(self, rhs: TimeDelta) -> Self::Output {
        Watts(self.0 * 3600.0 / rhs.as_seconds_f64())
    }
}
