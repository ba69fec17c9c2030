//! mcp-dev-proxy — a transparent hot-reload development proxy for Model
//! Context Protocol servers.
//!
//! Sits between an interactive MCP client and a user-authored MCP server
//! launched as a child process: watches source files, rebuilds and
//! restarts the child on change, and preserves the logical session across
//! restarts so the client never sees a connection drop.

use std::path::PathBuf;

use clap::Parser;
use mcp_dev_proxy::config::{CliOverrides, Config};
use mcp_dev_proxy::{orchestrator, Result};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mcp-dev-proxy")]
#[command(about = "Transparent hot-reload development proxy for MCP servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Command used to launch the user's MCP server.
    #[arg(long, env = "MCP_DEV_PROXY_SERVER_COMMAND")]
    server_command: Option<String>,

    /// Argument to pass to the server command. Repeatable.
    #[arg(long = "server-arg")]
    server_args: Vec<String>,

    /// Shell command to run before each restart. Empty disables builds.
    #[arg(long)]
    build_command: Option<String>,

    /// Directory or glob pattern to watch. Repeatable.
    #[arg(long = "watch")]
    watch: Vec<String>,

    /// Milliseconds of silence required before a batch of file changes
    /// triggers a rebuild.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Working directory for the watcher, build command, and server.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Environment variable to pass to the server, as KEY=VALUE. Repeatable.
    #[arg(long = "env")]
    env: Vec<String>,

    /// Path to a TOML config file. CLI flags override its values
    /// field-by-field.
    #[arg(short, long, env = "MCP_DEV_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "MCP_DEV_PROXY_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl From<&Cli> for CliOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            server_command: cli.server_command.clone(),
            server_args: cli.server_args.clone(),
            build_command: cli.build_command.clone(),
            watch: cli.watch.clone(),
            debounce_ms: cli.debounce_ms,
            cwd: cli.cwd.clone(),
            env: cli.env.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    // The proxy is disabled as a no-op pass-through when nested under
    // another instance (spec §6); it still needs a resolved server command
    // to know what to exec, so configuration is loaded either way.
    let overrides = CliOverrides::from(&cli);
    let config = match Config::resolve(cli.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!("mcp-dev-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = orchestrator::run(config).await {
        error!(error = %e, "fatal error during startup");
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    // stderr, never stdout: stdout is the MCP wire to the client (spec §6).
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
