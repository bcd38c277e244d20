#![doc = include_str!("../README.md")]

pub mod cli;
pub mod core;
pub mod ops;
pub mod prelude;
pub mod quantity;
pub mod scenario;
pub mod tables;

pub use crate::core::{
    action::{ConstantAction, PastAction, VariableAction},
    battery::Battery,
    context::OptimizerContext,
    error::Error,
    id::Id,
    provider::{Curve, Sample},
    schedule::{Entry, Plan, Schedule},
    solver::{Solver, SolverParams, Termination},
};
