mod session_commands;

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    stint_config::StintConfig,
    stint_sessions::{SessionManager, reap_once, spawn_reaper},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser, Debug)]
#[command(name = "stint", about = "Stint: session token store", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file. Defaults to discovery in ./ and ~/.config/stint/.
    #[arg(long, global = true, env = "STINT_CONFIG")]
    config: Option<PathBuf>,

    /// Session database path, overriding the config file.
    #[arg(long, global = true, env = "STINT_DB")]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Session(session_commands::SessionAction),
    /// Remove expired sessions.
    Reap {
        /// Keep running, reaping on an interval until Ctrl-C.
        #[arg(long)]
        watch: bool,
        /// Seconds between passes in watch mode (defaults to `reaper.interval_secs`).
        #[arg(long, requires = "watch")]
        every: Option<u64>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

fn effective_config(cli: &Cli) -> anyhow::Result<StintConfig> {
    let mut config = match &cli.config {
        Some(path) => stint_config::load_config(path)?,
        None => stint_config::discover_and_load(),
    };
    if let Some(db) = &cli.db {
        config.sessions.storage_path = db.clone();
    }
    Ok(config)
}

/// Open the session store, sweeping expired rows first when `reaper.enabled` is set.
async fn open_manager(config: &StintConfig) -> anyhow::Result<SessionManager> {
    let manager = SessionManager::open(&config.sessions).await?;
    if config.reaper.enabled {
        reap_once(&manager).await;
    }
    Ok(manager)
}

async fn reap(manager: SessionManager, watch: bool, every: Duration) -> anyhow::Result<()> {
    if !watch {
        let count = manager.remove_expired_sessions().await?;
        println!("{count}");
        return Ok(());
    }

    let manager = Arc::new(manager);
    reap_once(&manager).await;
    let handle = spawn_reaper(Arc::clone(&manager), every);
    info!(interval_secs = every.as_secs(), "reaper running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    handle.abort();
    info!("reaper stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "stint starting");

    let config = effective_config(&cli)?;

    match cli.command {
        Commands::Config {
            action: ConfigAction::Show,
        } => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
        Commands::Session(action) => {
            let manager = open_manager(&config).await?;
            session_commands::handle_session(action, &manager).await
        },
        Commands::Reap { watch, every } => {
            let manager = SessionManager::open(&config.sessions).await?;
            let every = Duration::from_secs(every.unwrap_or(config.reaper.interval_secs).max(1));
            reap(manager, watch, every).await
        },
    }
}
