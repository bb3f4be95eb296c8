//! hacoord binary

use clap::{Parser, Subcommand};
use hacoord::common::{parse_duration, Config};
use hacoord::network::InMemoryNetwork;
use hacoord::protocol::heartbeat::{self, HeartbeatListener, HeartbeatMessage};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hacoord")]
#[command(about = "Cluster coordination: heartbeat failure detection and slave commits")]
#[command(version = hacoord::VERSION)]
struct Cli {
    /// Configuration file (TOML, optional)
    #[arg(long, default_value = "hacoord")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an in-process heartbeat cluster over a simulated network
    Simulate {
        /// Cluster members (comma-separated), defaults to the configured servers
        #[arg(long, value_delimiter = ',')]
        servers: Vec<String>,

        /// How long to run
        #[arg(long, default_value = "5s")]
        duration: String,

        /// Heartbeat interval override
        #[arg(long)]
        interval: Option<String>,

        /// Failure timeout override
        #[arg(long)]
        timeout: Option<String>,

        /// Member to cut off from the network part-way
        #[arg(long)]
        silence: Option<String>,

        /// When to cut it off
        #[arg(long, default_value = "2s")]
        silence_after: String,
    },

    /// Print the effective configuration
    Config,
}

/// Reports what one member observes about the others
struct EventLogger {
    observer: String,
}

impl HeartbeatListener for EventLogger {
    fn alive(&self, server: &str) {
        tracing::debug!(observer = %self.observer, server, "alive");
    }

    fn failed(&self, server: &str) {
        tracing::warn!(observer = %self.observer, server, "failed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load_from(&cli.config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Simulate {
            servers,
            duration,
            interval,
            timeout,
            silence,
            silence_after,
        } => {
            // CLI has priority over file and environment
            if !servers.is_empty() {
                config.servers = servers;
            }
            if config.servers.is_empty() {
                config.servers = vec!["a".into(), "b".into(), "c".into()];
            }
            if let Some(interval) = interval {
                config.heartbeat.interval_ms = parse_duration(&interval)?.as_millis() as u64;
            }
            if let Some(timeout) = timeout {
                config.heartbeat.timeout_ms = parse_duration(&timeout)?.as_millis() as u64;
            }
            config.validate()?;

            let silence = match silence {
                Some(member) => Some((member, parse_duration(&silence_after)?)),
                None => None,
            };
            simulate(config, parse_duration(&duration)?, silence).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn simulate(
    config: Config,
    duration: Duration,
    silence: Option<(String, Duration)>,
) -> anyhow::Result<()> {
    let network = InMemoryNetwork::<HeartbeatMessage>::new();
    let resolution = config.timer.resolution();
    let mut tasks = vec![network.spawn_delivery(resolution)];
    let mut members = Vec::new();

    for id in &config.servers {
        let mut member_config = config.clone();
        member_config.node_id = id.clone();

        let participant = heartbeat::participant(&member_config, network.clone());
        network.add_participant(id.clone(), participant.clone());
        tasks.push(participant.spawn_timer(resolution));

        let client = heartbeat::client(&participant, &member_config);
        client.possible_servers(config.servers.clone()).await?;
        client
            .add_listener(Arc::new(EventLogger {
                observer: id.clone(),
            }))
            .await?;
        members.push((participant, client));
    }

    tracing::info!(
        servers = ?config.servers,
        interval_ms = config.heartbeat.interval_ms,
        timeout_ms = config.heartbeat.timeout_ms,
        "starting simulation"
    );
    for (_, client) in &members {
        client.join().await?;
    }

    let run = async {
        match silence {
            Some((member, at)) if at < duration => {
                tokio::time::sleep(at).await;
                tracing::info!(member = %member, "isolating member");
                network.isolate(member);
                tokio::time::sleep(duration - at).await;
            }
            _ => tokio::time::sleep(duration).await,
        }
    };
    tokio::select! {
        _ = run => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    for (participant, client) in &members {
        client.leave().await?;
        let (alive, failed) = participant.with_context(|context| {
            (
                context.alive_servers().clone(),
                context.failed_servers().clone(),
            )
        });
        tracing::info!(member = participant.id(), ?alive, ?failed, "final view");
    }

    for task in tasks {
        task.abort();
    }
    Ok(())
}
