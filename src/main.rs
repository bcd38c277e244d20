use std::{
    fs,
    sync::{Arc, atomic::AtomicBool},
};

use clap::Parser;
use corsac::{
    cli::{Args, Command, PlanArgs},
    core::solver::{Solver, SolverParams},
    prelude::*,
    scenario::Scenario,
    tables::build_schedule_table,
};

fn main() -> Result {
    tracing_subscriber::fmt().without_time().compact().init();
    match Args::parse().command {
        Command::Plan(args) => plan(&args),
    }
}

fn plan(args: &PlanArgs) -> Result {
    let scenario: Scenario = serde_json::from_slice(&fs::read(&args.scenario)?)
        .with_context(|| format!("failed to parse {:?}", args.scenario))?;
    let context = scenario.into_context()?;

    let cancel = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&cancel))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&cancel))?;

    let params = SolverParams::builder()
        .seed(args.seed)
        .max_iterations(args.max_iterations)
        .cooling_factor(args.cooling_factor)
        .stall_limit(args.stall_limit)
        .cancel(cancel)
        .build();
    let plan = Solver::builder().context(&context).params(params).build().solve()?;

    println!("{}", build_schedule_table(&plan.schedule));
    info!(cost = %plan.total_cost, termination = %plan.termination, "planned");
    Ok(())
}
