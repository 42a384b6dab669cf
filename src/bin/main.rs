use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use solver_orchestrator::args::{SolveRequest, request_to_args};
use solver_orchestrator::{RunId, RunSnapshot, Scheduler, SchedulerConfig, create_command_scheduler};

#[derive(Parser)]
#[command(name = "solver-orchestrator")]
#[command(about = "Bounded-concurrency scheduler for cancellable solver runs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule shell commands as runs and stream their output
    Exec {
        /// Maximum number of concurrently active runs
        #[arg(short = 'j', long)]
        limit: Option<usize>,
        /// Output flush interval in milliseconds
        #[arg(long)]
        flush_ms: Option<u64>,
        /// Shell snippets, one run each
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Submit solver jobs described in a JSON request file
    Solve {
        /// Path to the solver program
        #[arg(long, env = "SOLVER_PROGRAM", default_value = "solver")]
        solver: String,
        /// JSON file holding an array of solve requests
        requests: PathBuf,
        /// Maximum number of concurrently active runs
        #[arg(short = 'j', long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("solver_orchestrator=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let mut config = SchedulerConfig::load()?;

    match cli.command {
        Commands::Exec {
            limit,
            flush_ms,
            commands,
        } => {
            if let Some(limit) = limit {
                config.concurrency_limit = limit;
            }
            if let Some(flush_ms) = flush_ms {
                config.flush_interval_ms = flush_ms;
            }
            info!(
                limit = config.concurrency_limit,
                runs = commands.len(),
                "scheduling commands"
            );

            let scheduler = create_command_scheduler(config, "sh");
            for command in commands {
                scheduler.submit(vec!["-c".to_string(), command]).await;
            }
            watch(&scheduler).await
        }
        Commands::Solve {
            solver,
            requests,
            limit,
        } => {
            if let Some(limit) = limit {
                config.concurrency_limit = limit;
            }

            let raw = std::fs::read_to_string(&requests)
                .with_context(|| format!("failed to read {}", requests.display()))?;
            let requests: Vec<SolveRequest> = serde_json::from_str(&raw)
                .with_context(|| format!("invalid solve requests in {}", requests.display()))?;
            ensure!(!requests.is_empty(), "request file contains no jobs");
            info!(solver = %solver, runs = requests.len(), "scheduling solver runs");

            let scheduler = create_command_scheduler(config, solver);
            for request in &requests {
                scheduler.submit(request_to_args(request)).await;
            }
            watch(&scheduler).await
        }
    }
}

/// Poll snapshots, printing output lines as they become visible, until every
/// run is terminal. Ctrl-C aborts and removes everything.
async fn watch(scheduler: &Scheduler) -> Result<()> {
    let mut printed: HashMap<RunId, usize> = HashMap::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; aborting all runs");
                scheduler.clear().await;
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                let snapshots = scheduler.snapshots().await;
                let mut all_terminal = true;
                for snapshot in &snapshots {
                    let seen = printed.entry(snapshot.id).or_default();
                    for line in &snapshot.output[*seen..] {
                        println!("[{}] {}", snapshot.id, line);
                    }
                    *seen = snapshot.output.len();
                    if !snapshot.lifecycle.is_terminal() {
                        all_terminal = false;
                    }
                }
                if all_terminal {
                    report(&snapshots);
                    return Ok(());
                }
            }
        }
    }
}

fn report(snapshots: &[RunSnapshot]) {
    println!();
    println!("{:<10} {:<10} {:<8} SUMMARY", "RUN", "STATUS", "ANSWER");
    for snapshot in snapshots {
        println!(
            "{:<10} {:<10} {:<8} {}",
            snapshot.id.to_string(),
            snapshot.status.to_string(),
            snapshot.answer,
            snapshot.summary
        );
    }
}
