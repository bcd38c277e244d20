use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal solve failures, all raised before or instead of entering the
/// annealing loop.
///
/// Cooperative cancellation is deliberately absent here: an interrupted solve
/// still returns its best schedule, flagged with
/// [`crate::core::solver::Termination::Cancelled`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid horizon: {0}")]
    InvalidHorizon(String),

    #[error("no feasible initial schedule: {0}")]
    InfeasibleInstance(String),

    #[error("prognosis unavailable")]
    PrognosisUnavailable(#[source] anyhow::Error),

    /// The incrementally tracked cost drifted away from a full recomputation,
    /// which indicates a bookkeeping bug rather than a bad instance.
    #[error("tracked cost drifted {drift} € from the recomputed total")]
    Numerical { drift: f64 },
}
