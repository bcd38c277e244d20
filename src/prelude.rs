#![allow(unused_imports)]

pub use anyhow::{Context as _, Error, bail, ensure};
pub use tracing::{debug, info, instrument, trace, warn};

pub type Result<T = (), E = Error> = anyhow::Result<T, E>;
