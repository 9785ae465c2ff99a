use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "cortex",
    version,
    about = "Run and supervise Cortex Memory deployments during development"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Use a specific config file
    #[arg(short = 'f', long = "file", global = true, env = "CORTEX_CONFIG")]
    pub config_file: Option<PathBuf>,
}

/// Which services a session runs.
#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    /// Deployments or apps to run (all enabled if empty)
    pub names: Vec<String>,

    /// Skip companion apps
    #[arg(long)]
    pub no_apps: bool,

    /// Skip graph database containers
    #[arg(long)]
    pub no_graph: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run an interactive dev session with keyboard control
    Dev(SessionArgs),
    /// Run the dev session without keyboard control (signals only)
    Start(SessionArgs),
    /// Stop the session recorded for this project
    Stop {
        /// Kill immediately instead of asking processes to exit
        #[arg(long)]
        force: bool,
    },
    /// Show the recorded session and whether its services are alive
    Status,
    /// Find (and optionally kill) processes on common dev ports
    Ports {
        /// Kill the processes found
        #[arg(long)]
        kill: bool,
        /// Scan only these ports (repeatable)
        #[arg(long = "port", value_name = "PORT")]
        ports: Vec<u16>,
        /// Kill without asking for each process
        #[arg(long, requires = "kill")]
        all: bool,
        /// Send SIGKILL instead of SIGTERM
        #[arg(long, requires = "kill")]
        force: bool,
    },
    /// Start or stop a deployment's graph database container
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },
    /// Generate a starter cortex.toml
    Init,
    /// Validate the configuration file
    Validate,
    /// Check that external tools are installed
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum GraphCommands {
    /// Start (or create) the graph container
    Start {
        /// Deployment name
        deployment: String,
    },
    /// Stop the graph container
    Stop {
        /// Deployment name
        deployment: String,
    },
}
