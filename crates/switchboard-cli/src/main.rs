mod fleet;

use clap::{Parser, Subcommand};
use fleet::SwitchboardConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::InMemoryMetrics;
use switchboard_orchestrator::{InMemoryAgentRegistry, InMemoryDispatcher, Orchestrator, Scheduler};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switchboard", about = "Switchboard — agent task orchestration and switch learning")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchboard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured tasks against a simulated agent fleet
    Run {
        /// Stop waiting after this many seconds (overrides config)
        #[arg(long)]
        max_secs: Option<u64>,
        /// Log every orchestration event
        #[arg(long)]
        events: bool,
    },
    /// Validate the config and print it with defaults filled in
    Check,
    /// Show upcoming maintenance runs
    Schedule {
        /// Fire times to list per job
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let mut config = SwitchboardConfig::parse(&config_str)?;

    match cli.command {
        Commands::Run { max_secs, events } => {
            if let Some(secs) = max_secs {
                config.simulation.max_runtime_secs = secs;
            }
            run(config, events).await?;
        }
        Commands::Check => {
            let resolved = serde_json::json!({
                "orchestrator": config.orchestrator,
                "agents": config.agents,
                "tasks": config.tasks,
            });
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Commands::Schedule { count } => {
            let scheduler = Scheduler::new(config.orchestrator.maintenance.clone());
            let jobs = scheduler.enabled_jobs();
            if jobs.is_empty() {
                println!("No maintenance jobs enabled.");
            }
            for job in jobs {
                println!("{} ({:?}): {}", job.name, job.job, job.cron_expression);
                let mut after = chrono::Utc::now();
                for _ in 0..count {
                    after = Scheduler::next_fire_after(&job.cron_expression, after)?;
                    println!("  {}", after.to_rfc3339());
                }
            }
        }
    }

    Ok(())
}

async fn run(config: SwitchboardConfig, log_events: bool) -> anyhow::Result<()> {
    let registry = Arc::new(InMemoryAgentRegistry::with_agents(config.agents));
    let (dispatcher, jobs) = InMemoryDispatcher::with_channel();
    let metrics = Arc::new(InMemoryMetrics::new());
    let poll = config.orchestrator.tick_interval();

    let orchestrator = Arc::new(
        Orchestrator::builder(config.orchestrator, registry, Arc::new(dispatcher))
            .metrics(metrics.clone())
            .build()?,
    );

    if log_events {
        let mut rx = orchestrator.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => info!(event = event.name(), detail = ?event, "Event"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Event log lagging");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    let worker = fleet::spawn_worker(orchestrator.clone(), jobs, config.simulation.clone());

    for task in config.tasks {
        let id = task.id.clone();
        if let Err(e) = orchestrator.submit(task).await {
            warn!(task_id = %id, error = %e, "Submission rejected");
        }
    }
    orchestrator.start();

    tokio::select! {
        settled = fleet::wait_until_settled(&orchestrator, &config.simulation, poll) => {
            if !settled {
                warn!("Stopping with unsettled tasks");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    let report = serde_json::json!({
        "orchestrator": orchestrator.to_json().await,
        "tasks": orchestrator.list_tasks(None).await,
        "patterns": orchestrator.patterns(),
        "insights": orchestrator.insights(),
        "metrics": metrics.to_json(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    worker.abort();
    orchestrator.shutdown().await;
    Ok(())
}
