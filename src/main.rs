//! DICEPILOT: automated dice-game betting agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the ADB device into the capture coordinator, optionally serves
//! the dashboard, and runs until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use dicepilot::config;
use dicepilot::dashboard::{self, DashboardState};
use dicepilot::engine::{ActionSequencer, Coordinator, SequencerConfig};
use dicepilot::platforms::adb::AdbDevice;
use dicepilot::strategy::BettingEngine;

const BANNER: &str = r#"
 ____ ___ ____ _____ ____ ___ _     ___ _____
|  _ \_ _/ ___| ____|  _ \_ _| |   / _ \_   _|
| | | | | |   |  _| | |_) | || |  | | | || |
| |_| | | |___| |___|  __/| || |__| |_| || |
|____/___\____|_____|_|  |___|_____\___/ |_|

  Dice round recognizer and martingale wager actuator
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("DICEPILOT_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        config = %config_path,
        check_interval_ms = cfg.agent.check_interval_ms,
        base_bet = cfg.betting.base_bet,
        max_loss_count = cfg.betting.max_loss_count,
        color = %cfg.betting.selected_color,
        "DICEPILOT starting up"
    );

    // -- Initialise components -------------------------------------------

    let device = Arc::new(AdbDevice::from_config(&cfg.device));
    let settings = cfg.settings();
    let engine = BettingEngine::from_settings(&settings).with_payout(cfg.betting.payout_coefficient);
    let sequencer = ActionSequencer::new(device.clone(), SequencerConfig::from(&cfg.actuator));

    let (handle, coordinator) = Coordinator::spawn(device, sequencer, engine, settings);

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(Arc::new(DashboardState::new(handle.clone())), cfg.dashboard.port);
    }

    if cfg.agent.autostart {
        match handle.start().await {
            Ok(state) => info!(state = %state, "Autostart complete"),
            Err(e) => warn!(error = %e, "Autostart skipped"),
        }
    } else {
        info!("Waiting for a start command");
    }

    // -- Run until interrupted -------------------------------------------

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    handle.shutdown().await?;
    coordinator.await?;

    let state = handle.snapshot();
    info!(
        wins = state.total_wins,
        losses = state.total_losses,
        profit = state.total_profit,
        win_rate = format!("{:.1}%", state.win_rate()),
        "DICEPILOT shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dicepilot=info"));

    let json_logging = std::env::var("DICEPILOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
