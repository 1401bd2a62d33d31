//! rkernel - Remote kernel lifecycle management
//!
//! Host binary: lists kernel types and runs a single kernel in the foreground.

mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use rkernel_config::{Config, ConfigLoader, KernelSpecLoader, LoggingConfig};
use rkernel_core::{KernelEvent, KernelOverrides, KernelProvider, LifecycleRegistry};
use rkernel_lifecycle_process::ProcessLifecycleFactory;

use cli::{Cli, Commands};

/// Initialize tracing with console output and optional daily log files.
///
/// Logs go to stderr; stdout carries command output.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let console = if logging.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match &logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("rkernel")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Flushes pending lines on exit.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    Ok(())
}

/// Load the configuration; without kernel directories the user's Jupyter
/// kernel directory is scanned.
fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load(path)?,
        None => Config::default(),
    };
    if config.kernel_dirs.is_empty() {
        config.kernel_dirs = KernelSpecLoader::default_dirs()
            .iter()
            .map(|dir| dir.display().to_string())
            .collect();
    }
    Ok(config)
}

fn build_provider(config: &Config) -> Result<KernelProvider, Box<dyn std::error::Error>> {
    let registry = Arc::new(LifecycleRegistry::new());
    registry.register(Arc::new(ProcessLifecycleFactory::new()))?;
    Ok(KernelProvider::from_config(config, registry)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging)?;

    match cli.command {
        Commands::List { json } => list_kernels(&config, json),
        Commands::Launch {
            name,
            env,
            param,
            launch_timeout,
        } => {
            let mut overrides = KernelOverrides::new();
            for (key, value) in env {
                overrides = overrides.with_env(key, value);
            }
            for (key, value) in param {
                overrides = overrides.with_param(key, value);
            }
            if let Some(secs) = launch_timeout {
                overrides = overrides.with_launch_timeout_secs(secs);
            }
            run_kernel(&config, &name, overrides).await
        }
    }
}

fn list_kernels(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let provider = build_provider(config)?;
    let kernels = provider.list_kernel_types();

    if json {
        let specs: Vec<_> = kernels.iter().map(|spec| spec.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    if kernels.is_empty() {
        println!("No kernel types found.");
        return Ok(());
    }
    println!("{:<24} {:<16} DISPLAY NAME", "NAME", "LIFECYCLE");
    for spec in kernels {
        println!(
            "{:<24} {:<16} {}",
            spec.name,
            provider.resolve_class_name(&spec.lifecycle.class_name),
            spec.display_name
        );
    }
    Ok(())
}

/// Start a kernel, print its connection info and watch it until Ctrl-C.
async fn run_kernel(
    config: &Config,
    name: &str,
    overrides: KernelOverrides,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting rkernel v{}", env!("CARGO_PKG_VERSION"));

    let provider = build_provider(config)?;
    let manager = Arc::new(provider.create_kernel_manager(name, overrides)?);
    let mut events = manager.subscribe();

    let connection = match manager.start().await {
        Ok(connection) => connection,
        Err(e) => {
            error!(kernel_id = %manager.kernel_id(), "Kernel '{}' did not start: {}", name, e);
            return Err(e.into());
        }
    };
    println!("{}", connection.to_json()?);
    if let Some(path) = manager.connection_file() {
        info!("Connection file: {}", path.display());
    }

    let monitor = manager.spawn_monitor();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Received Ctrl-C, shutting down kernel {}", manager.kernel_id());
                break;
            }
            event = events.recv() => match event {
                Ok(KernelEvent::Failed { reason, .. }) => {
                    error!("Kernel {} failed: {}", manager.kernel_id(), reason);
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Missed {} kernel events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.shutdown(false).await?;
    if let Err(e) = monitor.await {
        warn!("Monitor task ended abnormally: {}", e);
    }

    match manager.failure_reason() {
        Some(reason) => Err(reason.into()),
        None => Ok(()),
    }
}
