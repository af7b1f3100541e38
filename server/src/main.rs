//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The `zard` lobby server.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use zard_server::{DEFAULT_CONFIG_PATH, Lobby, Mode, Result, Settings};
use zard_service::{ServerConfig, SessionRegistry, SessionServer};

#[derive(Parser)]
#[command(name = "zard")]
#[command(version)]
#[command(about = "Starts the zard lobby server", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Listening port, overrides the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    /// Worker threads, overrides the configuration file
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("Fatal: {}", error);
            eprintln!("zard: {}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    // Logging is configured by the file, so a read failure is reported once
    // the subscriber is installed
    let (settings, unreadable) = match Settings::load(&cli.config) {
        Ok(settings) => (settings, None),
        Err(error) if error.is_unreadable_config() => (Settings::default(), Some(error)),
        Err(error) => return Err(error),
    };
    let settings = settings.with_overrides(cli.port, cli.threads);

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(settings.log_level))
        .with_thread_names(true)
        .init();
    if let Some(error) = unreadable {
        warn!("{}, using defaults", error);
    }

    info!("Starting");
    let config = settings.server_config().validate()?;
    info!(
        threads = config.threads,
        port = config.bind_address.port(),
        reap_interval = ?config.reap_interval,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads)
        .thread_name("zard-worker")
        .enable_all()
        .build()?;
    let shutdown_timeout = config.shutdown_timeout;
    let result = runtime.block_on(serve(config));
    runtime.shutdown_timeout(shutdown_timeout);

    info!("Finished");
    result
}

async fn serve(config: ServerConfig) -> Result<()> {
    let registry = Arc::new(SessionRegistry::<Mode>::new());
    let lobby = Arc::new(Lobby::new(registry.clone()));
    let server = SessionServer::bind_with_registry(config, registry, lobby).await?;
    server.start()?;

    shutdown_signal().await;
    info!("Shutdown signal received");
    server.shutdown();
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            warn!("Unable to listen for SIGTERM: {}", error);
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for SIGINT: {}", error);
            }
            return;
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                error!("Unable to listen for SIGINT: {}", error);
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for Ctrl-C: {}", error);
    }
}
