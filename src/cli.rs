use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cost-optimal scheduling of household loads and batteries on dynamic
/// electricity prices.
#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Optimize the schedule for a scenario and print it.
    Plan(PlanArgs),
}

#[derive(clap::Args)]
pub struct PlanArgs {
    /// Path to the scenario JSON.
    #[arg(long)]
    pub scenario: PathBuf,

    /// Identical seeds reproduce identical schedules.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Hard iteration cap.
    #[arg(long, default_value_t = 500_000)]
    pub max_iterations: usize,

    /// Geometric cooling factor.
    #[arg(long, default_value_t = 0.995)]
    pub cooling_factor: f64,

    /// Stop after this many iterations without an accepted move.
    #[arg(long, default_value_t = 20_000)]
    pub stall_limit: usize,
}
