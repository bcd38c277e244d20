use crate::{
    core::{
        error::{Error, Result},
        id::Id,
    },
    quantity::{Zero, energy::WattHours, power::Watts},
};

/// Stationary storage. Flows are signed from the grid's point of view:
/// positive charges the battery, negative discharges it.
#[derive(Debug, Clone)]
pub struct Battery {
    pub id: Id,
    pub capacity: WattHours,
    /// Maximum charging power.
    pub max_charge: Watts,
    /// Maximum discharging power.
    pub max_discharge: Watts,
    /// Charge at the start of the horizon.
    pub initial_charge: WattHours,
}

impl Battery {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.capacity < WattHours::ZERO {
            return Err(Error::InvalidInput(format!("battery `{}`: negative capacity", self.id)));
        }
        if self.max_charge < Watts::ZERO || self.max_discharge < Watts::ZERO {
            return Err(Error::InvalidInput(format!("battery `{}`: negative rate", self.id)));
        }
        if self.initial_charge < WattHours::ZERO || self.initial_charge > self.capacity {
            return Err(Error::InvalidInput(format!(
                "battery `{}`: initial charge {} is outside 0..={}",
                self.id, self.initial_charge, self.capacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overfull_battery() {
        let battery = Battery {
            id: Id::from("basement"),
            capacity: WattHours(5000.0),
            max_charge: Watts(2000.0),
            max_discharge: Watts(2000.0),
            initial_charge: WattHours(6000.0),
        };
        assert!(matches!(battery.validate(), Err(Error::InvalidInput(_))));
    }
}
