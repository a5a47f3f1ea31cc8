#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for parking watch.
//!
//! Runs the API server, prints the provisioned roster, and drives offline
//! rush-hour simulations or CSV replays. With no subcommand it falls back
//! to an interactive menu.
//!
//! Uses `indicatif-log-bridge` (via [`parking_watch_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod report;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dialoguer::{Input, Select};
use parking_watch_cli_utils::MultiProgress;

#[derive(Parser)]
#[command(name = "parking_watch", about = "Parking lot occupancy compliance toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server (`BIND_ADDR`, `PORT`, `SIMULATION_TICK_MS`)
    Serve,
    /// Show the compliance status of every provisioned lot
    Status,
    /// Run an offline rush-hour simulation on a virtual clock
    Simulate {
        /// Number of ticks to run
        #[arg(long, default_value = "120")]
        ticks: u64,
        /// Seed for reproducible traffic
        #[arg(long)]
        rng_seed: Option<u64>,
        /// Virtual minutes between ticks
        #[arg(long, default_value = "1")]
        minutes_per_tick: u32,
    },
    /// Replay recorded counts from a CSV file with columns
    /// `lot_id,vehicle_count,observed_at`
    Replay {
        /// Path to the CSV file
        file: PathBuf,
        /// Rows applied per tick
        #[arg(long, default_value = "10")]
        batch_size: usize,
    },
}

/// Top-level menu entries for interactive mode.
enum Tool {
    Status,
    Simulate,
    Replay,
    Server,
}

impl Tool {
    const ALL: &[Self] = &[Self::Status, Self::Simulate, Self::Replay, Self::Server];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Status => "Show lot status",
            Self::Simulate => "Simulate rush hour",
            Self::Replay => "Replay a recorded feed",
            Self::Server => "Start server",
        }
    }
}

/// Runs the server on its own actix system so it does not nest inside the
/// CLI's tokio runtime.
async fn serve(interactive: bool) -> Result<(), Box<dyn std::error::Error>> {
    tokio::task::spawn_blocking(move || {
        let system = actix_web::rt::System::new();
        if interactive {
            system.block_on(parking_watch_server::interactive::run())
        } else {
            system.block_on(parking_watch_server::run_server())
        }
    })
    .await??;
    Ok(())
}

async fn interactive(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Parking Watch");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Tool::ALL[idx] {
        Tool::Status => run::status()?,
        Tool::Simulate => {
            let ticks: u64 = Input::new()
                .with_prompt("Ticks")
                .default(120)
                .interact_text()?;
            let minutes_per_tick: u32 = Input::new()
                .with_prompt("Virtual minutes per tick")
                .default(1)
                .interact_text()?;
            run::simulate(multi, ticks, None, minutes_per_tick).await?;
        }
        Tool::Replay => {
            let path: String = Input::new()
                .with_prompt("CSV file")
                .interact_text()?;
            run::replay(
                multi,
                &PathBuf::from(path.trim()),
                parking_watch_simulation::replay::DEFAULT_BATCH_SIZE,
            )
            .await?;
        }
        Tool::Server => serve(true).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = parking_watch_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive(&multi).await;
    };

    match command {
        Commands::Serve => serve(false).await?,
        Commands::Status => run::status()?,
        Commands::Simulate {
            ticks,
            rng_seed,
            minutes_per_tick,
        } => run::simulate(&multi, ticks, rng_seed, minutes_per_tick).await?,
        Commands::Replay { file, batch_size } => run::replay(&multi, &file, batch_size).await?,
    }

    Ok(())
}
