//! App Starter - start, stop, restart and watch a list of applications.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app_starter::config::{ConfigError, ConfigLoader, StarterConfig};
use app_starter::display;
use app_starter::registry::{EntryId, EntryStatus};
use app_starter::supervisor::{
    BatchHandle, Poller, Supervisor, SupervisorError, SupervisorEvent, SupervisorOptions,
};

#[derive(Parser)]
#[command(
    name = "app-starter",
    about = "Start, stop, restart and watch a list of applications",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file to use instead of the default search locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Application list file, overriding the configured location.
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show registered applications and whether they are running.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Register an executable (disabled until enabled).
    Add {
        /// Path to the executable.
        path: PathBuf,
    },
    /// Unregister applications by index.
    Remove {
        /// Indices as shown by `list`.
        #[arg(required = true)]
        indices: Vec<usize>,
    },
    /// Let start/stop/restart manage an application.
    Enable { index: usize },
    /// Keep start/stop/restart away from an application.
    Disable { index: usize },
    /// Start every enabled application that is not running.
    Start,
    /// Kill every enabled application that is running.
    Stop,
    /// Stop, then start, every enabled application.
    Restart,
    /// Poll and report status changes until Ctrl-C.
    Watch,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to listen for Ctrl-C: {0}")]
    Signal(#[from] std::io::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<StarterConfig, ConfigError> {
    let loader = cli
        .config
        .clone()
        .map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let mut config = loader.load()?;
    if let Some(path) = loader.find_config_file() {
        tracing::info!(path = %path.display(), "Using settings file");
    }
    if let Some(registry) = &cli.registry {
        config.registry_path = Some(registry.clone());
    }
    Ok(config)
}

async fn set_enabled(supervisor: &Supervisor, index: usize, enabled: bool) -> Result<(), CliError> {
    let entry = supervisor.set_enabled(index, enabled).await?;
    supervisor.save().await?;
    display::print_info(&format!(
        "{} {}",
        if enabled { "Enabled" } else { "Disabled" },
        entry.path().display()
    ));
    Ok(())
}

async fn finish_batch(handle: BatchHandle) -> Result<ExitCode, CliError> {
    let report = handle.wait().await?;
    display::print_batch_report(&report);
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn watch(supervisor: &Supervisor, config: &StarterConfig) -> Result<ExitCode, CliError> {
    let mut events = BroadcastStream::new(supervisor.subscribe());
    let poller = Poller::start(supervisor.clone(), config.poll_interval());
    let mut last: Option<HashMap<EntryId, EntryStatus>> = None;

    display::print_info(&format!(
        "Watching {} every {}s, Ctrl-C to stop",
        supervisor.registry_path().display(),
        config.poll_interval().as_secs()
    ));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                break;
            }
            event = events.next() => {
                let Some(event) = event else { break };
                let Ok(SupervisorEvent::StatusRefreshed { entries, .. }) = event else {
                    continue;
                };

                match &last {
                    None => display::print_entries(&entries),
                    Some(previous) => {
                        for (index, entry) in entries.iter().enumerate() {
                            if previous.get(&entry.id()) != Some(&entry.status()) {
                                display::print_status_change(index, entry);
                            }
                        }
                    }
                }
                last = Some(entries.iter().map(|e| (e.id(), e.status())).collect());
            }
        }
    }

    poller.shutdown().await;
    display::print_info("Stopped watching");
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = load_config(&cli)?;
    let supervisor = Supervisor::with_system_table(SupervisorOptions::from(&config));
    supervisor.load().await?;

    match cli.command {
        Commands::List { json } => {
            supervisor.refresh_status().await;
            let entries = supervisor.list_entries().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                display::print_entries(&entries);
            }
        }
        Commands::Add { path } => {
            let entry = supervisor.add_entry(&path).await?;
            supervisor.save().await?;
            display::print_info(&format!(
                "Added {} ({})",
                entry.path().display(),
                entry.status()
            ));
        }
        Commands::Remove { indices } => {
            let removed = supervisor.remove_entries(&indices).await?;
            // Removing the last entry must still reach the disk.
            supervisor.save_allow_empty().await?;
            for entry in &removed {
                display::print_info(&format!("Removed {}", entry.path().display()));
            }
        }
        Commands::Enable { index } => set_enabled(&supervisor, index, true).await?,
        Commands::Disable { index } => set_enabled(&supervisor, index, false).await?,
        Commands::Start => return finish_batch(supervisor.start_all().await?).await,
        Commands::Stop => return finish_batch(supervisor.stop_all().await?).await,
        Commands::Restart => return finish_batch(supervisor.restart_all().await?).await,
        Commands::Watch => return watch(&supervisor, &config).await,
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
