//! beacon - the uptime monitor daemon.
//!
//! ```text
//! beacon run
//! beacon check <endpoint-id>
//! beacon add --name api --url https://api.example.com/health
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use beacon::Config;
use beacon::database::models::NewEndpoint;
use beacon::orchestrator::Orchestrator;
use beacon::stats::StatsWindow;

#[derive(Parser)]
#[command(name = "beacon", version, about = "HTTP endpoint uptime monitor")]
struct Cli {
    /// Config file; defaults to $XDG_CONFIG_HOME/beacon/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Probe every active endpoint until interrupted (default).
    Run,
    /// Probe one endpoint now and print the result.
    Check { id: Uuid },
    /// Register an endpoint.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long, default_value = "60")]
        interval: u64,
        #[arg(long, default_value = "200")]
        expected_status: u16,
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,
    },
    /// List registered endpoints.
    Endpoints,
    /// Print uptime and latency for one endpoint, or the overview.
    Stats {
        id: Option<Uuid>,
        #[arg(long, default_value = "24h")]
        window: StatsWindow,
    },
    /// Send a test message through a notification channel.
    NotifyTest {
        channel: Uuid,
        #[arg(long, default_value = "Test notification from Beacon")]
        message: String,
    },
    /// Print the effective configuration.
    Config,
}

#[derive(Serialize)]
struct EndpointStats {
    uptime: f64,
    response_time: beacon::stats::ResponseTimeStats,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!("Beacon {} starting", env!("CARGO_PKG_VERSION"));
            Orchestrator::start(config).await
        }
        Command::Config => {
            print!("{config}");
            Ok(())
        }
        command => run_once(config, command).await,
    }
}

/// One-shot commands share the wiring of the daemon but start no background work.
async fn run_once(config: Config, command: Command) -> Result<()> {
    let mut orchestrator = Orchestrator::new(config).await?;

    let outcome = match command {
        Command::Check { id } => {
            let result = orchestrator.scheduler().run_now(id).await?;
            print_json(&result)
        }
        Command::Add { name, url, method, interval, expected_status, timeout_ms } => {
            let mut new_endpoint = NewEndpoint::new(name, url);
            new_endpoint.method = method;
            new_endpoint.interval_seconds = interval;
            new_endpoint.expected_status = expected_status;
            new_endpoint.timeout_ms = timeout_ms;
            let endpoint = orchestrator.registry().register(new_endpoint).await?;
            print_json(&endpoint)
        }
        Command::Endpoints => print_json(&orchestrator.registry().list().await?),
        Command::Stats { id: Some(id), window } => {
            let stats = orchestrator.stats();
            let (uptime, response_time) =
                tokio::try_join!(stats.uptime(id, window), stats.response_time_stats(id, window))?;
            print_json(&EndpointStats { uptime, response_time })
        }
        Command::Stats { id: None, .. } => print_json(&orchestrator.stats().overview().await?),
        Command::NotifyTest { channel, message } => {
            orchestrator.dispatcher().test_send(channel, &message).await?;
            println!("Sent");
            Ok(())
        }
        Command::Run | Command::Config => Ok(()),
    };

    orchestrator.shutdown().await;
    outcome
}
