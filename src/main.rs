//! SendFleet CLI — serve the gateway, run reminder ticks, manage the
//! suppression list.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use sendfleet_core::SendFleetConfig;
use sendfleet_core::types::ChannelKind;
use sendfleet_gateway::AppState;

#[derive(Parser)]
#[command(
    name = "sendfleet",
    version,
    about = "Multi-channel outbound delivery engine: campaigns, provider fallback, appointment reminders"
)]
struct Cli {
    /// Path to config.toml (defaults to ~/.sendfleet/config.toml).
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway until stopped.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one reminder tick and print the summary.
    Tick,
    /// Manage the tenant suppression list.
    Suppression {
        #[command(subcommand)]
        action: SuppressionAction,
    },
}

#[derive(Subcommand)]
enum SuppressionAction {
    /// Suppress an address for a tenant + channel.
    Add {
        company_id: String,
        channel: String,
        address: String,
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// Remove a suppression.
    Remove {
        company_id: String,
        channel: String,
        address: String,
    },
    /// List a tenant's suppressions.
    List { company_id: String },
}

fn parse_channel(s: &str) -> anyhow::Result<ChannelKind> {
    match ChannelKind::parse(s) {
        Some(kind) => Ok(kind),
        None => bail!("Unknown channel '{s}' (expected email, sms, or whatsapp)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SendFleetConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SendFleetConfig::load().context("loading config")?,
    };

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            let state = AppState::from_config(config)?;
            sendfleet_gateway::serve(state).await?;
        }
        Command::Tick => {
            let state = AppState::from_config(config)?;
            let summary = state.ticker.run_tick(chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Suppression { action } => {
            let state = AppState::from_config(config)?;
            match action {
                SuppressionAction::Add {
                    company_id,
                    channel,
                    address,
                    reason,
                } => {
                    let channel = parse_channel(&channel)?;
                    state
                        .suppression
                        .add(&company_id, channel, &address, &reason, "cli")?;
                    println!("Suppressed {address} on {channel} for {company_id}");
                }
                SuppressionAction::Remove {
                    company_id,
                    channel,
                    address,
                } => {
                    let channel = parse_channel(&channel)?;
                    if state.suppression.remove(&company_id, channel, &address)? {
                        println!("Removed {address} from the {channel} suppression list");
                    } else {
                        println!("No matching suppression found");
                    }
                }
                SuppressionAction::List { company_id } => {
                    let entries = state.suppression.list(&company_id)?;
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                }
            }
        }
    }

    Ok(())
}
