//! # toolwire-cli
//!
//! Command-line interface for Toolwire.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use toolwire_core::Config;

mod commands;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
    /// Server list to load, after flag/config/default resolution.
    pub mcp_config_path: PathBuf,
}

impl AppContext {
    fn new(config: Config, flag: Option<PathBuf>) -> Self {
        let mcp_config_path = flag
            .or_else(|| config.mcp.config_path.as_ref().map(PathBuf::from))
            .map(|p| toolwire_mcp::config::expand_tilde(&p))
            .unwrap_or_else(toolwire_mcp::default_config_path);

        Self { config, mcp_config_path }
    }
}

/// Toolwire - inspect MCP servers and call their tools
#[derive(Parser)]
#[command(name = "toolwire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the MCP server list (mcp.json)
    #[arg(long, value_name = "PATH", global = true, env = "TOOLWIRE_MCP_CONFIG")]
    mcp_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List loaded MCP servers
    Servers,
    /// List tools grouped by server
    Tools,
    /// Call a tool
    Call {
        /// Tool name
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(short, long, value_name = "JSON")]
        args: Option<String>,
    },
    /// Print tools in function-calling format
    Schema,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show effective settings
    Show,
    /// Show where configuration is read from
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load_validated();
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize logging; stdout carries command output.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });

    let ctx = AppContext::new(config, cli.mcp_config);

    match cli.command {
        Commands::Servers => commands::mcp::servers(&ctx).await?,
        Commands::Tools => commands::mcp::tools(&ctx).await?,
        Commands::Call { tool, args } => commands::mcp::call(&ctx, &tool, args.as_deref()).await?,
        Commands::Schema => commands::mcp::schema(&ctx).await?,
        Commands::Config { action } => commands::config::handle(action, &ctx)?,
    }

    Ok(())
}
