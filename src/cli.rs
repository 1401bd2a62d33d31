//! CLI definitions for rkernel.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// rkernel CLI.
#[derive(Parser)]
#[command(name = "rkernel")]
#[command(about = "Remote kernel lifecycle management")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "RKERNEL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List available kernel types
    List {
        /// Print kernel specs as JSON
        #[arg(long)]
        json: bool,
    },

    /// Launch a kernel and keep it running until Ctrl-C
    Launch {
        /// Kernel type name
        name: String,

        /// Kernel environment entry (KERNEL_* or whitelisted keys)
        #[arg(short, long = "env", value_parser = parse_key_val)]
        env: Vec<(String, String)>,

        /// Command template parameter
        #[arg(short, long = "param", value_parser = parse_key_val)]
        param: Vec<(String, String)>,

        /// Launch timeout override in seconds
        #[arg(long)]
        launch_timeout: Option<u64>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
