use std::ops::Mul;

use chrono::TimeDelta;

use crate::quantity::energy::WattHours;

quantity!(
    /// Power. Positive values consume, negative values produce.
    Watts, suffix: "W", precision: 0
);

impl Watts {
    pub fn from_kilowatts(kilowatts: f64) -> Self {
        Self(kilowatts * 1000.0)
    }
}

impl Mul<TimeDelta> for Watts {
    type Output = WattHours;

    fn mul(self, rhs: TimeDelta) -> Self::Output {
        WattHours(self.0 * rhs.as_seconds_f64() / 3600.0)
    }
}
