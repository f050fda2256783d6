use std::path::PathBuf;

use attitude_core::{AttitudeController, ConfigStore, ControllerSettings, DEFAULT_UNIVERSE_COUNT};
use clap::Parser;

/// Networked lighting controller: schedules shows, renders effects, and
/// drives DMX fixtures over sACN.
#[derive(Parser, Debug)]
#[command(name = "attitude")]
#[command(about = "Attitude lighting control device")]
struct Args {
    /// Device configuration file (synced from the server)
    #[arg(long, default_value = "device_config.json")]
    config: PathBuf,

    /// Number of sACN universes to transmit
    #[arg(long, default_value_t = DEFAULT_UNIVERSE_COUNT)]
    universes: u16,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let snapshot = match ConfigStore::load_file(&args.config) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            log::error!("failed to load {}: {error}", args.config.display());
            Default::default()
        }
    };

    let mut controller = AttitudeController::new(
        snapshot,
        ControllerSettings {
            universe_count: args.universes,
        },
    );
    controller.start()?;

    tokio::signal::ctrl_c().await?;
    log::info!("shutdown requested");
    controller.shutdown().await;
    Ok(())
}
