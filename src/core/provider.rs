use std::ops::{Add, Mul};

use chrono::TimeDelta;

use crate::{ops::Interval, prelude::*, quantity::Zero};

/// Pure source of a forecast quantity: price, generation, and the like.
///
/// A sampler must be deterministic for a given interval; the solver queries
/// each grid step at most once per solve and caches the results.
pub trait Sample<Q> {
    fn sample(&self, interval: Interval) -> Result<Q>;
}

impl<Q, F> Sample<Q> for F
where
    F: Fn(Interval) -> Result<Q>,
{
    fn sample(&self, interval: Interval) -> Result<Q> {
        self(interval)
    }
}

/// Piecewise-constant curve over non-overlapping intervals, sampled as the
/// time-weighted average over the query interval.
pub struct Curve<Q> {
    pieces: Vec<(Interval, Q)>,
}

impl<Q> Curve<Q> {
    pub fn new(pieces: Vec<(Interval, Q)>) -> Self {
        Self { pieces }
    }
}

impl<Q> Sample<Q> for Curve<Q>
where
    Q: Copy + Zero + Add<Output = Q> + Mul<f64, Output = Q>,
{
    fn sample(&self, interval: Interval) -> Result<Q> {
        ensure!(!interval.is_empty(), "cannot sample an empty interval {interval:?}");
        let mut weighted = Q::ZERO;
        let mut covered = TimeDelta::zero();
        for (piece, value) in &self.pieces {
            if let Some(overlap) = piece.intersect(interval) {
                weighted = weighted + *value * overlap.len().as_seconds_f64();
                covered += overlap.len();
            }
        }
        ensure!(covered == interval.len(), "the curve does not cover {interval:?}");
        Ok(weighted * (1.0 / covered.as_seconds_f64()))
    }
}
