//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use plone_mcp_blocks::{
    AssemblyEngine, HttpImageChecker, ImageChecker, LenientImageChecker, SchemaRegistry,
};
use plone_mcp_client::PloneClient;
use plone_mcp_core::{ContentService, McpServer, StdioTransport};
use plone_mcp_shared::{AppConfig, init_config, load_config};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// plone-mcp — edit Plone content from AI assistants.
#[derive(Parser)]
#[command(
    name = "plone-mcp",
    version,
    about = "MCP server for the Plone REST API, with Markdown-to-blocks assembly.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json. Logs always go to stderr.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Plone site URL (overrides config and PLONE_URL).
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Username for basic auth (overrides config and PLONE_USERNAME).
    #[arg(long, global = true)]
    pub username: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the MCP server on stdio.
    Serve,

    /// Parse Markdown and print the rich-text AST as JSON.
    Parse {
        /// Markdown file to read (stdin when omitted).
        file: Option<PathBuf>,

        /// Print the text of each top-level node instead of the AST.
        #[arg(long)]
        plain: bool,
    },

    /// Print the block schema registry, or one block type.
    Schema {
        /// Block type to describe.
        block_type: Option<String>,
    },

    /// Print an MCP client configuration snippet.
    ClientConfig {
        /// Target client: claude-desktop, vscode, or cursor.
        #[arg(long, default_value = "claude-desktop")]
        target: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Stdout belongs to the MCP transport.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "plone_mcp=info",
        1 => "plone_mcp=debug",
        _ => "plone_mcp=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let overrides = Overrides {
        url: cli.url,
        username: cli.username,
    };
    match cli.command {
        Command::Serve => cmd_serve(&overrides).await,
        Command::Parse { file, plain } => cmd_parse(file, plain),
        Command::Schema { block_type } => cmd_schema(&overrides, block_type.as_deref()),
        Command::ClientConfig { target } => cmd_client_config(&target, &overrides),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&overrides),
        },
    }
}

/// Values given on the command line, applied after file and environment.
struct Overrides {
    url: Option<String>,
    username: Option<String>,
}

fn resolved_config(overrides: &Overrides) -> Result<AppConfig> {
    let mut config = load_config()?.with_env_overrides();
    if let Some(url) = &overrides.url {
        config.plone.url = url.clone();
    }
    if let Some(username) = &overrides.username {
        config.plone.username = Some(username.clone());
    }
    Ok(config)
}

/// The configured registry, or the built-in one. Startup fails if it cannot load.
fn load_registry(config: &AppConfig) -> Result<SchemaRegistry> {
    let registry = match &config.blocks.schema_path {
        Some(path) => SchemaRegistry::from_path(path)?,
        None => SchemaRegistry::builtin()?,
    };
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(overrides: &Overrides) -> Result<()> {
    let config = resolved_config(overrides)?;
    let site = config.site_url()?;
    let registry = Arc::new(load_registry(&config).wrap_err("failed to load block registry")?);

    let images: Arc<dyn ImageChecker> = if config.blocks.check_images {
        let timeout = Duration::from_secs(config.plone.timeout_secs);
        Arc::new(HttpImageChecker::new(timeout)?.with_base(site.clone()))
    } else {
        Arc::new(LenientImageChecker)
    };

    let engine = Arc::new(AssemblyEngine::new(registry, images));
    let client = PloneClient::from_config(&config)?;
    info!(site = %site, check_images = config.blocks.check_images, "starting plone-mcp");

    let server = McpServer::new(ContentService::new(client, engine));
    server.run(&mut StdioTransport::stdio()).await?;
    Ok(())
}

fn cmd_parse(file: Option<PathBuf>, plain: bool) -> Result<()> {
    let bytes = match &file {
        Some(path) => {
            std::fs::read(path).wrap_err_with(|| format!("cannot read {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .wrap_err("cannot read stdin")?;
            buf
        }
    };
    let nodes = plone_mcp_markdown::parse_bytes(&bytes)?;
    if plain {
        for node in &nodes {
            println!("{}", node.plain_text());
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
    }
    Ok(())
}

fn cmd_schema(overrides: &Overrides, block_type: Option<&str>) -> Result<()> {
    let config = resolved_config(overrides)?;
    let registry = load_registry(&config)?;
    let schema = registry.describe(block_type)?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn cmd_client_config(target: &str, overrides: &Overrides) -> Result<()> {
    let config = resolved_config(overrides)?;
    let binary = std::env::current_exe()
        .map_err(|e| eyre!("cannot determine binary path: {e}"))?
        .to_string_lossy()
        .to_string();

    let mut env = serde_json::Map::new();
    env.insert("PLONE_URL".into(), config.plone.url.clone().into());
    if let Some(username) = &config.plone.username {
        env.insert("PLONE_USERNAME".into(), username.clone().into());
    }
    let server = serde_json::json!({
        "command": binary,
        "args": ["serve"],
        "env": env,
    });

    let (heading, snippet) = match target {
        "claude-desktop" => (
            "// claude_desktop_config.json",
            serde_json::json!({ "mcpServers": { "plone": server } }),
        ),
        "vscode" => {
            let mut entry = server;
            entry["type"] = "stdio".into();
            (
                "// .vscode/mcp.json",
                serde_json::json!({ "servers": { "plone": entry } }),
            )
        }
        "cursor" => (
            "// Cursor MCP settings",
            serde_json::json!({ "mcpServers": { "plone": server } }),
        ),
        _ => {
            return Err(eyre!(
                "unknown config target '{target}': expected 'claude-desktop', 'vscode', or 'cursor'"
            ));
        }
    };
    println!("{heading}");
    println!("{}", serde_json::to_string_pretty(&snippet)?);
    println!(
        "// Set {} (or {}) in the server environment to authenticate.",
        config.plone.password_env, config.plone.token_env
    );
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(overrides: &Overrides) -> Result<()> {
    let config = resolved_config(overrides)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
