use std::borrow::Borrow;

use derive_more::{Display, From};

/// Caller-assigned identifier of a load or a battery, preserved end-to-end.
#[derive(
    Clone, Debug, Display, Eq, From, Hash, PartialEq, serde::Deserialize, serde::Serialize,
)]
#[from(forward)]
pub struct Id(pub String);

impl Borrow<str> for Id {
    fn borrow(&self) -> &str {
        &self.0
    }
}
