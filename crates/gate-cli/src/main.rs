// ============================================================================
// gatectl - membership access inspection tool
// ============================================================================
// Usage:
//   gatectl status [--json]                      Load the session, print the decision
//   gatectl watch [--interval SECS]              Poll the beta window until Ctrl-C
//   gatectl recheck-discord                      Re-verify Discord, print the decision
//   gatectl evaluate --user u.json --beta b.json Offline evaluation from JSON files
// ============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gate_core::{
    evaluate, AccessEngine, AuthorizationDecision, BetaStatus, BypassConfig, GateConfig,
    SessionSnapshot, TracingDispatcher, User,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Membership access inspection tool
#[derive(Parser)]
#[command(name = "gatectl", version, about = "Inspect membership access decisions")]
struct Cli {
    /// Base URL of the membership API (default: GATE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session bearer token (default: GATE_SESSION_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the current session and print the access decision
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Poll the beta status and report the moment it ends
    Watch {
        /// Polling interval in seconds (default: GATE_BETA_POLL_SECS)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Re-run Discord verification for the current session
    RecheckDiscord,

    /// Evaluate a decision from JSON files without touching the network
    Evaluate {
        /// User JSON (omit for a signed-out visitor)
        #[arg(long)]
        user: Option<PathBuf>,

        /// Beta status JSON (omit while loading)
        #[arg(long)]
        beta: Option<PathBuf>,

        /// Access config JSON (omit if unavailable)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gate_core=info".parse()?)
                .add_directive("gatectl=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(cli: &Cli) -> Result<GateConfig> {
    let mut config = GateConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(token) = &cli.token {
        config.session_token = Some(token.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Could not load .env file: {}", e);
        }
    }
    init_logging()?;

    let cli = Cli::parse();

    match &cli.command {
        Commands::Evaluate { user, beta, config } => {
            cmd_evaluate(user.as_deref(), beta.as_deref(), config.as_deref())
        }
        Commands::Status { json } => {
            let engine = connect(&cli)?;
            cmd_status(&engine, *json).await
        }
        Commands::Watch { interval } => {
            let engine = connect(&cli)?;
            cmd_watch(engine, *interval).await
        }
        Commands::RecheckDiscord => {
            let engine = connect(&cli)?;
            cmd_recheck_discord(&engine).await
        }
    }
}

fn connect(cli: &Cli) -> Result<Arc<AccessEngine>> {
    let config = load_config(cli)?;
    info!("Using membership API at {}", config.api_base_url);
    let engine = AccessEngine::with_http(config, Arc::new(TracingDispatcher))
        .context("Failed to initialize access engine")?;
    Ok(Arc::new(engine))
}

async fn cmd_status(engine: &AccessEngine, json: bool) -> Result<()> {
    let decision = engine.load().await;
    let snapshot = engine.store().snapshot().await;

    if json {
        let report = serde_json::json!({
            "checked_at": Utc::now().to_rfc3339(),
            "session_id": engine.session_id().await.to_string(),
            "user": snapshot.user,
            "beta_status": snapshot.beta_status,
            "bypass_config": snapshot.bypass_config,
            "decision": decision,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&snapshot, &decision);
    }
    Ok(())
}

async fn cmd_watch(engine: Arc<AccessEngine>, interval: Option<u64>) -> Result<()> {
    let decision = engine.load().await;
    let snapshot = engine.store().snapshot().await;
    print_report(&snapshot, &decision);

    let every = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| engine.config().beta_poll_interval());

    println!("\nWatching beta status every {}s (Ctrl-C to stop)...", every.as_secs());
    let poller = Arc::clone(&engine).spawn_beta_poller(every);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    poller.stop();

    println!("\nFinal decision:");
    let snapshot = engine.store().snapshot().await;
    print_report(&snapshot, &engine.decision().await);
    Ok(())
}

async fn cmd_recheck_discord(engine: &AccessEngine) -> Result<()> {
    engine.load().await;
    let decision = engine
        .recheck_discord()
        .await
        .context("Discord re-verification failed")?;

    let snapshot = engine.store().snapshot().await;
    print_report(&snapshot, &decision);
    Ok(())
}

fn cmd_evaluate(user: Option<&Path>, beta: Option<&Path>, config: Option<&Path>) -> Result<()> {
    // A user file containing `null` is a signed-out visitor
    let user: Option<User> = read_json::<Option<User>>(user)?.flatten();
    let beta: Option<BetaStatus> = read_json(beta)?;
    let config: Option<BypassConfig> = read_json(config)?;

    let decision = evaluate(user.as_ref(), beta.as_ref(), config.as_ref());
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: Option<&Path>) -> Result<Option<T>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn print_report(snapshot: &SessionSnapshot, decision: &AuthorizationDecision) {
    println!("=== Access Decision ===");

    match &snapshot.user {
        Some(user) => {
            println!("User:");
            println!("  {:18} {}", "subscription", user.subscription_status);
            println!("  {:18} {}", "tier", user.tier().unwrap_or("-"));
            println!(
                "  {:18} {}",
                "discord",
                match (user.discord_verified, user.discord_username.as_deref()) {
                    (Some(true), Some(name)) => format!("verified ({})", name),
                    (Some(true), None) => "verified".to_string(),
                    (Some(false), _) => "not verified".to_string(),
                    (None, _) => "unknown".to_string(),
                }
            );
        }
        None => println!("User: (signed out)"),
    }

    match &snapshot.beta_status {
        Some(beta) => {
            let remaining = beta
                .time_remaining(Utc::now())
                .map(|d| format!("{}h {}m left", d.num_hours(), d.num_minutes() % 60))
                .unwrap_or_else(|| "no end date".to_string());
            println!(
                "Beta: {} ({})",
                if beta.expired { "ended" } else { "open" },
                remaining
            );
            if !beta.message.is_empty() {
                println!("  {}", beta.message);
            }
        }
        None => println!("Beta: (unavailable)"),
    }

    match &snapshot.bypass_config {
        Some(config) => println!(
            "Policy: discord free access {}, bypass tiers [{}]",
            if config.is_discord_free() { "on" } else { "off" },
            config.bypass_tiers.iter().cloned().collect::<Vec<_>>().join(", ")
        ),
        None => println!("Policy: (unavailable, no bypass)"),
    }

    println!();
    println!("  {:18} {}", "authorized", decision.is_authorized);
    println!("  {:18} {}", "subscribed", decision.is_subscribed);
    println!("  {:18} {}", "bypass payment", decision.can_bypass_payment);
    println!("  {:18} {}", "badge", decision.badge().unwrap_or("-"));
}
