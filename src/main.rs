use std::sync::Arc;

use clap::Parser;
use colored::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use feedpulse::cli::{Args, Command};
use feedpulse::ntp::{ClockProbe, SntpProbe};
use feedpulse::{AppConfig, Orchestrator, SignalrTransport};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_args(&args);

    match args.command {
        Command::Start => {
            if let Err(err) = run(&args, &config).await {
                eprintln!("{} {}", "fatal:".bright_red(), err);
                std::process::exit(1);
            }
        }
    }
}

async fn run(args: &Args, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(SignalrTransport::new());
    let probe = if args.skip_ntp_check {
        None
    } else {
        Some(Arc::new(SntpProbe::from_config(&config.ntp)) as Arc<dyn ClockProbe>)
    };

    let orchestrator = Orchestrator::new(config, transport, probe);

    orchestrator.bootstrap().await?;
    orchestrator.start().await?;
    info!("application started");

    shutdown_signal().await;

    info!("application is stopping");
    if let Err(err) = orchestrator.stop().await {
        error!(error = %err, "error during the application stopping");
        return Err(err.into());
    }
    info!("application successfully stopped");

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            info!("received signal SIGINT");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received signal SIGINT"),
        _ = sigterm.recv() => info!("received signal SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received signal SIGINT");
}
