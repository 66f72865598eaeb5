//! Binary entrypoint for the PerkUP Runner backend.
//!
//! Commands:
//! - `start [--port <n>]` - serve the JSON API
//! - `init` - write a starter `config.toml` and create the data directory
//! - `status` - print player/session counts and the top of the leaderboard
//! - `sign --user-id <id> ...` - print signed launch data for local testing (refused in production)
//!
//! See the library crate docs for module-level details: `perkup_runner::`.
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use log::info;

use perkup_runner::auth::{sign_init_data, PlatformUser};
use perkup_runner::config::Config;
use perkup_runner::http::{router, AppState};
use perkup_runner::ranking::RankingService;
use perkup_runner::storage::GameStore;

#[derive(Parser)]
#[command(name = "perkup-runner")]
#[command(about = "Game backend for the PerkUP Runner mini-app")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Start {
        /// Listen port, overriding the config file
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Initialize a new configuration and data directory
    Init,
    /// Show player and session statistics
    Status,
    /// Produce signed launch data for a test user
    Sign {
        #[arg(long)]
        user_id: u64,
        #[arg(long, default_value = "Tester")]
        first_name: String,
        #[arg(long)]
        username: Option<String>,
        /// Override auth_date (seconds since the epoch); defaults to now
        #[arg(long)]
        auth_date: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(None, cli.verbose);
        info!("Initializing new configuration");
        Config::create_default(&cli.config).await?;
        let cfg = Config::default();
        info!("Configuration file created at {}", cli.config);
        tokio::fs::create_dir_all(&cfg.storage.data_dir).await?;
        info!("Data directory ready at {}", cfg.storage.data_dir);
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    init_logging(Some(&config), cli.verbose);

    match cli.command {
        Commands::Start { port } => {
            info!("Starting PerkUP Runner v{}", env!("CARGO_PKG_VERSION"));
            let store = Arc::new(GameStore::open(&config.storage.data_dir)?);
            let state = AppState::new(&config, store)?;
            let app = router(state, &config.server.cors_allowed_origins);

            let port = port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{}:{}", config.server.bind, port)
                .parse()
                .map_err(|e| anyhow!("invalid listen address {}:{}: {}", config.server.bind, port, e))?;
            info!(
                "API listening on http://{} ({})",
                addr,
                config.server.environment.as_str()
            );
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            info!("Server stopped");
        }
        Commands::Status => {
            let store = Arc::new(GameStore::open(&config.storage.data_dir)?);
            println!("PerkUP Runner v{}", env!("CARGO_PKG_VERSION"));
            println!("Environment: {}", config.server.environment.as_str());
            println!("Players: {}", store.player_count());
            println!("Sessions: {}", store.session_count());
            let leaders = RankingService::new(store).leaderboard(5)?;
            if !leaders.is_empty() {
                println!("Top players:");
                for (i, p) in leaders.iter().enumerate() {
                    let name = p.username.as_deref().unwrap_or(&p.first_name);
                    println!("  {}. {} - {}", i + 1, name, p.high_score);
                }
            }
        }
        Commands::Sign {
            user_id,
            first_name,
            username,
            auth_date,
        } => {
            if config.server.environment.is_production() {
                bail!("refusing to sign launch data in production");
            }
            if config.telegram.bot_token.is_empty() {
                bail!("telegram.bot_token is not configured");
            }
            let user = PlatformUser {
                id: user_id,
                first_name,
                username,
                ..Default::default()
            };
            let user_json = serde_json::to_string(&user)?;
            let auth_date = auth_date
                .unwrap_or_else(|| chrono::Utc::now().timestamp())
                .to_string();
            let signed = sign_init_data(
                &[("auth_date", auth_date.as_str()), ("user", user_json.as_str())],
                &config.telegram.bot_token,
            )?;
            println!("{}", signed);
        }
        Commands::Init => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

fn init_logging(config: Option<&Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        })
        .map(|f| Arc::new(std::sync::Mutex::new(f)));
    let security_path = config.and_then(|c| c.logging.security_file.clone());
    // With a log file, only echo to the console when attached to a terminal
    let echo = file.is_none() || atty::is(atty::Stream::Stdout);

    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let line = format!("{} [{}] {}", ts, record.level(), record.args());

        if let Some(ref file) = file {
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
        }
        if record.target() == "security" {
            if let Some(ref sec_path) = security_path {
                if let Ok(mut sf) = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(sec_path)
                {
                    let _ = writeln!(sf, "{}", line);
                }
            }
        }
        if echo {
            writeln!(fmt, "{}", line)
        } else {
            Ok(())
        }
    });
    let _ = builder.try_init();
}
