//! Stagehand - Entry Point
//!
//! A staged application-deployment orchestrator: releases a versioned
//! artifact across a fleet of nodes with bounded parallelism,
//! health-driven automatic rollback, and crash-recoverable progress.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use stagehand::app::options::AppOptions;
use stagehand::app::run::run;
use stagehand::logs::{init_logging, LogOptions};
use stagehand::settings::Settings;
use stagehand::utils::version_info;
use stagehand::workers::reconciler;

use tracing::{error, info};

const DEFAULT_SETTINGS_PATH: &str = "/etc/stagehand/settings.json";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return;
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let settings = match Settings::load_or_default(&settings_path).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file {:?}: {}", settings_path, e);
            return;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Run the orchestrator
    let options = AppOptions {
        store: settings.store.clone(),
        enable_server: settings.enable_server,
        enable_reconciler: settings.enable_reconciler,
        server: settings.server.clone(),
        reconciler: reconciler::Options {
            interval: Duration::from_secs(settings.reconcile_interval_secs),
            ..Default::default()
        },
        executor: settings.executor.clone(),
        prom_base_url: settings.monitoring.prom_base_url.clone(),
        alert_webhook_url: settings.monitoring.alert_webhook_url.clone(),
        ..Default::default()
    };

    info!("Running stagehand {} with options: {:?}", version.version, options);
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the orchestrator: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
