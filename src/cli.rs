use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Structured log line per pod
    Log,
    /// One JSON object per line on stdout
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "pod-ownership")]
#[command(about = "Watch pods and resolve their controller ownership chain")]
pub struct Cli {
    /// Path to a kubeconfig file; in-cluster config is used when absent
    #[arg(long, env = "KUBECONFIG_PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Only watch pods in this namespace (all namespaces when absent)
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Only watch pods scheduled on this node (all nodes when absent)
    #[arg(long, env = "NODE_NAME")]
    pub node: Option<String>,

    /// Seconds to wait for the initial pod list before giving up
    #[arg(long, default_value_t = 600)]
    pub sync_timeout: u64,

    /// Re-deliver unchanged pods as additions when the watch relists
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub honor_resyncs: bool,

    /// Seconds before a Job lookup is abandoned
    #[arg(long, default_value_t = 5)]
    pub lookup_timeout: u64,

    /// Maximum number of pods resolved concurrently
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_in_flight: u16,

    /// Additional controller kind to record (repeatable), e.g. Rollout
    #[arg(long = "extra-controller-kind")]
    pub extra_controller_kinds: Vec<String>,

    /// Where resolved ownership goes
    #[arg(long, value_enum, default_value_t = OutputFormat::Log)]
    pub output: OutputFormat,

    /// Address of the health/readiness endpoint
    #[arg(long, default_value = "127.0.0.1:6060")]
    pub diagnostics_addr: SocketAddr,

    /// Do not start the health/readiness endpoint
    #[arg(long)]
    pub no_diagnostics: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}
