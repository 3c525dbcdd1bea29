// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable program to run the loopback agent

use anyhow::{anyhow, Context};
use camino::Utf8PathBuf;
use clap::Parser;
use host_utils::host::HostExecutor;
use loopback_manager::config::Config;
use loopback_manager::{FleetConfig, LoopbackManager};
use slog::{info, warn, Logger};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[clap(name = "loopback-agent", about = "Manages loop-backed virtual drives")]
enum Args {
    /// Runs the agent, keeping this node's virtual drives converged.
    Run {
        #[clap(name = "CONFIG_FILE_PATH", action)]
        config_path: Utf8PathBuf,
    },
    /// Detaches and deletes every virtual drive found on this node.
    Cleanup {
        #[clap(name = "CONFIG_FILE_PATH", action)]
        config_path: Utf8PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    match args {
        Args::Run { config_path } => {
            let (config, log, manager) = start(&config_path)?;
            run(config, log, manager).await
        }
        Args::Cleanup { config_path } => {
            let (_config, log, manager) = start(&config_path)?;
            manager.cleanup_loop_devices()?;
            info!(log, "Removed all virtual drives");
            Ok(())
        }
    }
}

fn start(
    config_path: &Utf8PathBuf,
) -> anyhow::Result<(Config, Logger, Arc<LoopbackManager>)> {
    let config = Config::from_file(config_path)?;
    let log = config
        .log
        .to_logger("loopback-agent")
        .map_err(|err| anyhow!("initializing logger: {err}"))?;
    let settings = config.node_settings()?;

    // The agent still starts without a fleet document; reloads pick it up
    // once it appears.
    let fleet = match FleetConfig::from_file(&config.fleet_config) {
        Ok(fleet) => fleet,
        Err(err) => {
            warn!(log, "Starting with an empty fleet config"; "error" => %err);
            FleetConfig::default()
        }
    };

    let executor = HostExecutor::new(log.clone()).as_executor();
    let manager =
        Arc::new(LoopbackManager::new(executor, settings, fleet, &log));
    Ok((config, log, manager))
}

async fn run(
    config: Config,
    log: Logger,
    manager: Arc<LoopbackManager>,
) -> anyhow::Result<()> {
    let fleet_path = config.fleet_config.clone();
    let mut interval = tokio::time::interval(config.reload_period());
    info!(
        log,
        "Loopback agent running";
        "node_id" => manager.node_id(),
        "fleet_config" => %fleet_path,
        "period" => ?config.reload_period(),
    );

    loop {
        interval.tick().await;
        let manager = manager.clone();
        let fleet_path = fleet_path.clone();
        let log = log.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = manager.load_config(&fleet_path) {
                warn!(log, "Keeping previous fleet config"; "error" => %err);
            }
            if let Err(err) = manager.reconcile() {
                warn!(log, "Reconciliation failed"; "error" => %err);
            }
            if let Err(err) = manager.ensure_attached() {
                warn!(log, "Failed to attach virtual drives"; "error" => %err);
            }
        })
        .await
        .context("reconciliation task panicked")?;
    }
}
