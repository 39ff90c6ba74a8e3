//! gymgate-station - gate station and member pass
//!
//! `gate`: reads decoded QR payloads from stdin, verifies them with the hub,
//! shows results, and mirrors scans from other gates of the same gym.
//!
//! `pass`: keeps a member's rotating access token current and prints it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use gymgate_common::config::{self, TomlConfig};
use gymgate_common::{ScanOutcome, ScanResult};
use gymgate_station::camera::LineCamera;
use gymgate_station::channel::SseTransport;
use gymgate_station::client::HubClient;
use gymgate_station::feedback::LogFeedback;
use gymgate_station::scanner::{CameraFacing, ScannerState};
use gymgate_station::status::local_clock;
use gymgate_station::{AccessStation, CredentialRotator, PassState, StationDeps};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for gymgate-station
#[derive(Parser, Debug)]
#[command(name = "gymgate-station")]
#[command(about = "Gate station and member pass for GymGate")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, env = "GYMGATE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Hub base URL (overrides [station].hub_url)
    #[arg(long, env = "GYMGATE_HUB_URL", global = true)]
    hub_url: Option<String>,

    /// Gym served by this station (overrides [station].gym_id)
    #[arg(short, long, env = "GYMGATE_GYM_ID", global = true)]
    gym_id: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a gate station (default)
    Gate,
    /// Show a member's rotating pass
    Pass {
        #[arg(long, env = "GYMGATE_MEMBER_ID")]
        member_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_result = config::load_or_default(args.config.as_deref());
    let level = config_result
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting GymGate station (gymgate-station) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config: TomlConfig = config_result.context("Failed to load configuration")?;
    let hub_url = args.hub_url.unwrap_or_else(|| config.station.hub_url.clone());
    let gym_id = args
        .gym_id
        .or_else(|| config.station.gym_id.clone())
        .ok_or_else(|| anyhow!("No gym configured: pass --gym-id or set [station].gym_id"))?;
    let client = HubClient::new(&hub_url, config.station.verify_timeout())?;
    info!("Hub: {}  Gym: {}", hub_url, gym_id);

    match args.command.unwrap_or(Command::Gate) {
        Command::Gate => run_gate(config, client, gym_id).await,
        Command::Pass { member_id } => run_pass(client, gym_id, member_id).await,
    }
}

async fn run_gate(config: TomlConfig, client: HubClient, gym_id: String) -> Result<()> {
    let client = Arc::new(client);
    let camera = LineCamera::new(BufReader::new(tokio::io::stdin()), CameraFacing::Environment);
    let transport = SseTransport::new(client.base_url())?;

    let station = AccessStation::mount(
        &gym_id,
        &config.station,
        config.schedule.clone(),
        StationDeps {
            camera: Arc::new(camera),
            verifier: client.clone(),
            publisher: client.clone(),
            attendance: client.clone(),
            transport: Arc::new(transport),
            feedback: Arc::new(LogFeedback),
            clock: local_clock(),
        },
    );

    let status = station.gym_status().borrow().clone();
    info!(
        "Gym is {} ({}){}",
        if status.is_open { "open" } else { "closed" },
        status.current_session,
        status
            .next_status_change
            .map(|s| format!(", {}", s))
            .unwrap_or_default()
    );

    let mut results = station.results();
    let mut scanner = station.scanner_session();
    let mut gym_status = station.gym_status();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            changed = results.changed() => {
                if changed.is_err() { break; }
                if let Some(result) = results.borrow_and_update().clone() {
                    print_result(&result);
                }
            }
            changed = scanner.changed() => {
                if changed.is_err() { break; }
                let session = scanner.borrow_and_update().clone();
                match session.state {
                    ScannerState::Error { message } => warn!(
                        "Scanner error: {} ({})",
                        message,
                        session.last_error.as_deref().unwrap_or("unknown cause")
                    ),
                    state => info!("Scanner {}", state.name()),
                }
            }
            changed = gym_status.changed() => {
                if changed.is_err() { break; }
                let status = gym_status.borrow_and_update().clone();
                info!("Gym status: {}", status.current_session);
            }
        }
    }

    station.unmount().await;
    info!("Station shutdown complete");
    Ok(())
}

async fn run_pass(client: HubClient, gym_id: String, member_id: String) -> Result<()> {
    let rotator = CredentialRotator::start(Arc::new(client), gym_id, member_id);
    let mut pass = rotator.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = pass.changed() => {
                if changed.is_err() { break; }
                let state = pass.borrow_and_update().clone();
                match &state {
                    PassState::Generating => println!("Generating..."),
                    PassState::Active { token, remaining_secs } => {
                        let marker = if state.is_expiring_soon() { " (expiring soon)" } else { "" };
                        println!("{}s{}  {}", remaining_secs, marker, token);
                    }
                }
            }
        }
    }

    rotator.stop();
    Ok(())
}

fn print_result(result: &ScanResult) {
    match &result.outcome {
        ScanOutcome::Verifying => println!("Verifying..."),
        ScanOutcome::Granted {
            member_name,
            subscription_expiry,
            ..
        } => match subscription_expiry {
            Some(expiry) => {
                println!("GRANTED  {} (until {})", member_name, expiry.format("%Y-%m-%d"))
            }
            None => println!("GRANTED  {}", member_name),
        },
        ScanOutcome::Denied { reason } => println!("DENIED   {}", reason),
    }
}
