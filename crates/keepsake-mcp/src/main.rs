//! `keepsake` – persistent memory for AI assistants over MCP.
//!
//! 1. Resolves configuration: flags, then `KEEPSAKE_*` variables, then
//!    `~/.keepsake/config.toml`, then defaults.
//! 2. Installs the tracing subscriber (stderr only).
//! 3. Creates the global and local area roots.
//! 4. Serves the memory tools over stdio until the client closes stdin.
//!
//! `keepsake init` writes a config file with the resolved settings instead of
//! serving.

mod config;
mod protocol;
mod server;
mod telemetry;
mod tools;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keepsake_memory::MemoryStore;
use tracing::{error, info, warn};

use config::{AreaRoots, Config, ConfigError};
use server::Server;
use telemetry::LogOptions;
use tools::MemoryTools;

#[derive(Parser)]
#[command(name = "keepsake")]
#[command(about = "Persistent categorized memory for AI assistants (MCP stdio server)")]
#[command(long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ~/.keepsake/config.toml)
    #[arg(short, long, env = "KEEPSAKE_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory of the global (user-wide) area
    #[arg(long)]
    global_dir: Option<PathBuf>,

    /// Root directory of the local (project) area
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// Log filter directive, e.g. "info" or "keepsake_memory=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs on stderr
    #[arg(long, env = "KEEPSAKE_LOG_JSON")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the memory tools over stdio (default)
    Serve,
    /// Write the resolved configuration to the config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("keepsake: cannot determine the current directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config_path = cli.config.clone().unwrap_or_else(|| config::config_path(&cwd));
    let (mut cfg, config_issue) = match config::load_from(&config_path) {
        Ok(Some(cfg)) => (cfg, None),
        Ok(None) => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            (cfg, None)
        }
        Err(e) => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            (cfg, Some(e))
        }
    };
    if let Some(dir) = &cli.global_dir {
        cfg.global_dir = Some(dir.clone());
    }
    if let Some(dir) = &cli.local_dir {
        cfg.local_dir = Some(dir.clone());
    }

    let _guard = telemetry::init_tracing(
        "keepsake",
        &LogOptions {
            cli_filter: cli.log_level.clone(),
            fallback_filter: cfg.log_level.clone(),
            json: cli.json_logs || telemetry::json_format_requested(),
        },
    );
    if let Some(e) = config_issue {
        warn!(error = %e, "config unusable; continuing with defaults");
    }

    let roots = cfg.area_roots(&config::home_dir(&cwd), &cwd);

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(roots),
        Command::Init { force } => init(&cfg, &roots, &config_path, force),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn serve(roots: AreaRoots) -> Result<(), String> {
    for root in [&roots.global, &roots.local] {
        std::fs::create_dir_all(root)
            .map_err(|e| format!("failed to create memory root {}: {e}", root.display()))?;
    }
    info!(
        global = %roots.global.display(),
        local = %roots.local.display(),
        "memory roots ready"
    );

    let server = Server::new(MemoryTools::new(MemoryStore::new(roots.global, roots.local)));

    // The runtime is built after tracing so the OTLP exporter's blocking
    // client is created outside of it.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start async runtime: {e}"))?;

    runtime
        .block_on(server.run_stdio())
        .map_err(|e| format!("stdio transport failed: {e}"))?;
    info!("client disconnected; shutting down");
    Ok(())
}

fn init(
    cfg: &Config,
    roots: &AreaRoots,
    path: &std::path::Path,
    force: bool,
) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    let persisted = Config {
        global_dir: Some(roots.global.clone()),
        local_dir: cfg.local_dir.clone(),
        log_level: cfg.log_level.clone(),
    };
    config::save_to(&persisted, path).map_err(|e: ConfigError| e.to_string())?;
    info!(path = %path.display(), "config written");
    Ok(())
}
