//! Council CLI - operator tools for a deliberation council

mod client;
mod messages;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use council::config::CouncilConfig;

#[derive(Parser)]
#[command(name = "council-cli")]
#[command(about = "Operator client for the council deliberation server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a council configuration, then summarize it
    CheckConfig {
        /// Path to the TOML configuration
        path: PathBuf,
    },

    /// Stream council events as they happen
    Watch {
        /// Server URL
        #[arg(short, long, default_value = "ws://localhost:3000/ws")]
        url: String,

        /// Only show events for this session
        #[arg(short, long)]
        session: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "council_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { path } => run_check_config(&path),
        Commands::Watch { url, session } => run_watch(&url, session).await,
    }
}

fn run_check_config(path: &PathBuf) -> Result<()> {
    let config = CouncilConfig::load(path)?;
    print!("{}", summarize(&config));
    Ok(())
}

fn summarize(config: &CouncilConfig) -> String {
    let mut out = String::new();
    let name = if config.council.name.is_empty() {
        &config.council.id
    } else {
        &config.council.name
    };
    out.push_str(&format!("Council {} ({})\n", name, config.council.id));
    out.push_str(&format!("{:─<60}\n", ""));
    out.push_str(&format!(
        "Voting: {:?}, quorum {}\n",
        config.voting.scheme(),
        config.voting.quorum
    ));
    out.push_str(&format!(
        "Deliberation: starts in {}, max {} rounds, human approval {}\n",
        config.deliberation.initial_phase,
        config.deliberation.max_rounds,
        if config.deliberation.require_human_approval { "required" } else { "off" },
    ));
    if config.refinement.enabled {
        out.push_str(&format!(
            "Refinement: up to {} amendments{}\n",
            config.refinement.max_amendments,
            if config.refinement.auto_accept { ", auto-accepted" } else { "" },
        ));
    }

    out.push_str(&format!("\nAgents ({}):\n", config.agents.len()));
    for agent in &config.agents {
        let mut flags = Vec::new();
        if agent.can_propose {
            flags.push("propose");
        }
        if agent.can_veto {
            flags.push("veto");
        }
        out.push_str(&format!(
            "  {} - {} [{}] weight {}{}\n",
            agent.id,
            agent.display_name(),
            agent.role,
            agent.weight,
            if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            },
        ));
    }

    out.push_str(&format!("\nEscalation rules ({}):\n", config.rules.len()));
    for rule in &config.rules {
        out.push_str(&format!(
            "  {} (priority {}): {} -> {}{}\n",
            rule.name,
            rule.priority,
            rule.trigger.kind.as_str(),
            rule.action.kind.as_str(),
            if rule.stop_after { ", stops" } else { "" },
        ));
    }

    out.push_str(&format!("\nEvent routes ({}):\n", config.event_routing.len()));
    for route in &config.event_routing {
        out.push_str(&format!(
            "  {}:{} -> lead {}",
            route.source,
            route.event_type.as_deref().unwrap_or("*"),
            route.lead,
        ));
        if !route.consult.is_empty() {
            out.push_str(&format!(", consult {}", route.consult.join(", ")));
        }
        out.push('\n');
    }
    out
}

async fn run_watch(url: &str, session: Option<Uuid>) -> Result<()> {
    let mut client = client::ObserverClient::connect(url).await?;
    if let Some(session_id) = session {
        client.subscribe(session_id).await?;
        println!("Watching session {}", session_id);
    } else {
        println!("Watching all sessions");
    }

    client
        .listen(|event| {
            println!("{}", messages::describe(&event));
            true
        })
        .await?;

    println!("Connection closed");
    Ok(())
}
