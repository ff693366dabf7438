//! Catalog seeding, scheduler and reset commands

use anyhow::{bail, Result};
use tracing::info;

use lexiquest::engine::scheduler::{shutdown_channel, Scheduler};
use lexiquest::GamificationEngine;

use super::{print_json, GlobalOptions};

pub fn seed_command(options: &GlobalOptions) -> Result<()> {
    let engine = options.open_engine()?;
    let report = engine.seed_defaults()?;
    print_json(&report)
}

/// Run both background cadences until Ctrl-C
pub async fn run_scheduler_command(options: &GlobalOptions) -> Result<()> {
    let config = options.load_config()?;
    let engine = GamificationEngine::open(&config)?;
    let scheduler = Scheduler::new(engine, &config);

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C, stopping scheduler");
    // receiver only goes away if the scheduler task already ended
    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

pub fn reset_command(options: &GlobalOptions, yes: bool) -> Result<()> {
    if !yes {
        bail!("Reset deletes all user progress. Re-run with --yes to confirm.");
    }
    let engine = options.open_engine()?;
    engine.reset()?;
    println!("Progress reset: {}", engine.db().path().display());
    Ok(())
}
