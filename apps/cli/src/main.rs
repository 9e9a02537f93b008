//! plone-mcp CLI — MCP server for Plone sites.
//!
//! Serves content and block-editing tools over stdio, and offers offline
//! helpers for parsing Markdown and inspecting the block registry.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
