//! Common types and utilities shared across commands

use crate::errors::{CliError, CliResult};
use clap::Parser;
use resdex_config::{Backend, Config};
use resdex_core::{ParamValue, Parameters};
use std::path::PathBuf;
use std::sync::Arc;

/// Global CLI options available to all commands
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    #[arg(short, long, global = true, help = "Decrease verbosity")]
    pub quiet: bool,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase verbosity (-v for debug, -vv for trace)")]
    pub verbose: u8,

    #[arg(long, global = true, value_name = "FILE", help = "Config file to use")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "FILE", help = "Discovery file to edit")]
    pub discovery: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR", help = "Root directory of the resources")]
    pub root: Option<PathBuf>,

    #[arg(long, global = true, value_name = "json|kv", help = "Storage backend of the discovery")]
    pub backend: Option<Backend>,
}

impl GlobalOpts {
    /// Get the effective verbosity level
    /// - 0: quiet/warn only
    /// - 1: debug (-v)
    /// - 2: trace (-vv)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::path)
    }

    pub fn load_config(&self) -> CliResult<Config> {
        Ok(Config::load_from(&self.config_path())?)
    }

    /// Effective settings: flags first, then the config file, then defaults
    pub fn settings(&self) -> CliResult<Settings> {
        let config = self.load_config()?;
        let backend = self.backend.unwrap_or_else(|| config.get_backend());
        let config = Config {
            backend: Some(backend),
            ..config
        };
        Ok(Settings {
            backend,
            discovery_path: self
                .discovery
                .clone()
                .unwrap_or_else(|| config.get_discovery_path()),
            repository_root: self
                .root
                .clone()
                .unwrap_or_else(|| config.get_repository_root()),
        })
    }
}

/// Where the discovery and its resources live
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend: Backend,
    pub discovery_path: PathBuf,
    pub repository_root: PathBuf,
}

/// Parse `NAME=VALUE` pairs; values are JSON when they parse, strings otherwise
pub fn parse_parameters(pairs: &[String]) -> CliResult<Parameters> {
    let mut parameters = Parameters::new();
    for pair in pairs {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            CliError::InvalidArgument(format!("expected NAME=VALUE, got '{}'", pair))
        })?;
        parameters.insert(Arc::from(name.trim()), ParamValue::parse_lenient(value));
    }
    Ok(parameters)
}
