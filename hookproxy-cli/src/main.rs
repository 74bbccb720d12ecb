mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use cli::Cli;
use hookproxy_core::listener::{Listener, ReadinessNotifier};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "hookproxy.toml";

/// The CLI's readiness notifier: logs at `info` and nothing else. Wiring a
/// systemd `sd_notify` call or similar is a drop-in replacement of this type.
struct LoggingReadiness;

#[async_trait]
impl ReadinessNotifier for LoggingReadiness {
    async fn notify_ready(&self) {
        tracing::info!("accepting connections");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    color_eyre::install().expect("color-eyre should only be installed once");
    let args = Cli::parse();
    init_tracing(args.verbose);

    if args.print_schema {
        let schema = schemars::schema_for!(hookproxy_core::config::HookConfiguration);
        println!("{}", serde_json::to_string_pretty(&schema).expect("schema should serialize"));
        return ExitCode::SUCCESS;
    }

    let config_path = config_path(&args);
    let config = match hookproxy_config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(path = %config_path.display(), error = %err, "failed to load configuration");
            eprintln!("{:?}", eyre::Report::new(err));
            return ExitCode::from(1);
        }
    };

    let listener = Listener::from_config(&config);
    let stop = shutdown_signal();
    match listener.serve(stop, Arc::new(LoggingReadiness)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "listener exited with an error");
            eprintln!("{:?}", eyre::Report::new(err));
            ExitCode::from(2)
        }
    }
}

fn config_path(args: &Cli) -> PathBuf {
    args.config
        .clone()
        .or_else(|| std::env::var_os("HOOKPROXY_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves once either `SIGINT` or `SIGTERM` is received.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
