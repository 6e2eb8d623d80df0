//! Command-line interface definition

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "stevedore",
    version,
    about = "Auto-containerize and run MCP servers",
    long_about = "Classifies a target (image, command, local directory, or git repository),\n\
                  builds a container image for it when needed, and runs it with stdio\n\
                  attached for line-oriented MCP traffic."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to a config file (default: platform config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (if needed) and run a target with stdio attached
    Run(RunArgs),

    /// Build a target's image without running it
    Build(BuildArgs),

    /// Inspect and manage the build cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show engine availability and cache summary
    Status,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference, command, directory path, or git URL
    pub target: String,

    /// Arguments forwarded to the server inside the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Environment variables for the container (KEY=VALUE, repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Volume mounts (host:container, repeatable)
    #[arg(long = "volume", value_name = "HOST:CONTAINER")]
    pub volumes: Vec<String>,

    /// Treat the target as an existing image, skipping classification
    #[arg(long)]
    pub direct: bool,

    /// Use the host network instead of an isolated one
    #[arg(long)]
    pub host_network: bool,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Command, directory path, or git URL to build
    pub target: String,

    /// Arguments that are part of the command target
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Emit the result as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Also tag the built image with this reference
    #[arg(long, value_name = "REFERENCE")]
    pub tag: Option<String>,

    /// Push the tagged reference after building (requires --tag)
    #[arg(long, requires = "tag")]
    pub push: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show entry counts and hit totals
    Stats,

    /// Remove every cached entry and its image
    Clear,

    /// Remove entries not used within the given number of days
    Evict {
        #[arg(long, value_name = "DAYS", default_value_t = 30)]
        older_than: u32,
    },
}
