//! Shared types, error model, and configuration for plone-mcp.
//!
//! This crate is the foundation depended on by all other plone-mcp crates.
//! It provides:
//! - [`PloneMcpError`] — the unified error type
//! - Block-document types ([`BlockSet`], [`BlockSpec`], [`WriteKind`])
//! - Configuration ([`AppConfig`], [`PloneConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BlocksConfig, PloneConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_credentials,
};
pub use error::{PloneMcpError, Result};
pub use types::{
    BlockMap, BlockSet, BlockSpec, Credentials, TITLE_BLOCK_TYPE, TYPE_KEY, WriteKind,
    block_type_of,
};
