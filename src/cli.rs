use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "vcluster-desk",
    version,
    about = "Manage vclusters in the local Kubernetes cluster from a terminal console."
)]
pub struct CliArgs {
    /// Refresh interval in milliseconds
    #[arg(long)]
    pub refresh_ms: Option<u64>,

    /// Switch the extension context before running
    #[arg(short, long)]
    pub context: Option<String>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write console logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Base URL of the staging backend service; files are staged locally when omitted
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Keep the extension context and connectivity flag in memory only
    #[arg(long)]
    pub no_persist: bool,

    /// Settings file (overrides VCLUSTER_DESK_CONFIG and the default locations)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Console)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Interactive terminal console (default)
    Console,
    /// List vclusters in the extension context
    List {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List namespaces in the extension context
    Namespaces,
    /// List user-facing extension contexts
    Contexts,
    /// Switch the extension context and check connectivity
    UseContext { context: String },
    /// Create a vcluster
    Create(CreateArgs),
    /// Upgrade an existing vcluster
    Upgrade(CreateArgs),
    /// Delete a vcluster and its leftover kubeconfig entries
    Delete(TargetArgs),
    Pause(TargetArgs),
    Resume(TargetArgs),
    /// Connect the host kubeconfig to a vcluster
    Connect(TargetArgs),
    /// Disconnect the host kubeconfig from vclusters in a namespace
    Disconnect {
        #[arg(short, long)]
        namespace: String,
    },
    /// Probe the extension context and show both kubeconfigs' current contexts
    Status,
    /// Ping the staging backend
    Hello,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CreateArgs {
    pub name: String,

    /// Defaults to vcluster-<name>
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Kubernetes distribution (ignored on upgrade)
    #[arg(long)]
    pub distro: Option<String>,

    #[arg(long)]
    pub chart_version: Option<String>,

    /// Helm values file passed through --extra-values
    #[arg(long)]
    pub values: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct TargetArgs {
    pub name: String,

    #[arg(short, long)]
    pub namespace: String,
}
