//! # CLI Interface
//!
//! Command-line structure for `webpay-node` using `clap` derive. Every `run`
//! option has a `WEBPAY_*` environment fallback so the node can be configured
//! entirely from a container environment.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use webpay_protocol::config::{DEFAULT_HTTP_PORT, DEFAULT_METRICS_PORT};
use webpay_protocol::provider::DuplicateFinalizePolicy;

/// WebPay payment provider / acquirer node.
///
/// Publishes a signed Authority document and serves the single transaction
/// endpoint of a bank or a card acquirer. Exposes Prometheus metrics on a
/// separate port.
#[derive(Parser, Debug)]
#[command(
    name = "webpay-node",
    about = "WebPay payment provider and acquirer node",
    version,
    propagate_version = true
)]
pub struct WebpayNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the Authority document and the transaction endpoint.
    Run(RunArgs),
    /// Create a data directory with freshly issued devnet credentials.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Which party this node plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum NodeRole {
    /// A bank: reserve, debit and finalize of account-to-account payments.
    Provider,
    /// A card acquirer: finalize only.
    Acquirer,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Provider => "provider",
            NodeRole::Acquirer => "acquirer",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DuplicateFinalize {
    Replay,
    Reprocess,
}

impl From<DuplicateFinalize> for DuplicateFinalizePolicy {
    fn from(value: DuplicateFinalize) -> Self {
        match value {
            DuplicateFinalize::Replay => DuplicateFinalizePolicy::Replay,
            DuplicateFinalize::Reprocess => DuplicateFinalizePolicy::Reprocess,
        }
    }
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding `credentials.json`.
    #[arg(long, short = 'd', env = "WEBPAY_DATA_DIR", default_value = "./webpay-data")]
    pub data_dir: PathBuf,

    #[arg(long, value_enum, env = "WEBPAY_ROLE", default_value_t = NodeRole::Provider)]
    pub role: NodeRole,

    /// Port for `/health`, `/authority` and `/transact`.
    #[arg(long, env = "WEBPAY_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "WEBPAY_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Externally visible base URL. The published Authority names
    /// `<public-url>/authority` and `<public-url>/transact`.
    #[arg(long, env = "WEBPAY_PUBLIC_URL", default_value = "http://localhost:8442")]
    pub public_url: String,

    /// What to do with a second finalize of the same reservation.
    #[arg(long, value_enum, env = "WEBPAY_DUPLICATE_FINALIZE", default_value_t = DuplicateFinalize::Replay)]
    pub duplicate_finalize: DuplicateFinalize,

    /// `pretty` or `json`.
    #[arg(long, env = "WEBPAY_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    #[arg(long, short = 'd', env = "WEBPAY_DATA_DIR", default_value = "./webpay-data")]
    pub data_dir: PathBuf,

    /// Certificate subject of the bank.
    #[arg(long, default_value = "mybank.com")]
    pub provider_subject: String,

    /// Certificate subject of the acquirer.
    #[arg(long, default_value = "cardpay.com")]
    pub acquirer_subject: String,

    /// Overwrite existing credentials.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        WebpayNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = WebpayNodeCli::try_parse_from(["webpay-node", "run", "--role", "acquirer"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.role, NodeRole::Acquirer);
        assert_eq!(args.duplicate_finalize, DuplicateFinalize::Replay);
        assert_eq!(
            DuplicateFinalizePolicy::from(args.duplicate_finalize),
            DuplicateFinalizePolicy::Replay
        );
    }
}
