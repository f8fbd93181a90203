//! # CLI Interface
//!
//! `clap` derive definitions for `nomina-node`: `run`, `init`,
//! `sign-voucher`, `allowlist` and `version`.

use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Shown in `--help`. The RPC surface has no authentication.
pub const TRUST_WARNING: &str = "\
WARNING: the node does not authenticate RPC calls. The `caller` and `value`
fields of every request are trusted as sent, so anyone who can reach the RPC
port can act as the admin and register names without paying. Keep the node
bound to localhost (the default) and never expose it to an untrusted network.";

/// Nomina registrar node.
///
/// Hosts the name registry and its pricing controller, serves JSON-RPC,
/// REST and WebSocket APIs, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "nomina-node",
    about = "Nomina registrar node",
    after_help = TRUST_WARNING,
    version,
    propagate_version = true
)]
pub struct NominaNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    #[command(after_help = TRUST_WARNING)]
    Run(RunArgs),
    /// Create a data directory with a config file, an admin key and a
    /// voucher-signer key.
    Init(InitArgs),
    /// Sign a registration voucher with the signer key.
    SignVoucher(SignVoucherArgs),
    /// Compute an allowlist root, and optionally a member's proof.
    Allowlist(AllowlistArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file. Defaults to `config.toml` in the data directory.
    #[arg(long, short = 'c', env = "NOMINA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory holding the database and keys.
    #[arg(long, short = 'd', env = "NOMINA_DATA_DIR", default_value = ".nomina")]
    pub data_dir: PathBuf,

    /// Overrides `network.bind_address`. Anything but a loopback address
    /// exposes the unauthenticated RPC port.
    #[arg(long, env = "NOMINA_BIND_ADDRESS")]
    pub bind_address: Option<IpAddr>,

    /// Overrides `network.rpc_port`.
    #[arg(long, env = "NOMINA_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Overrides `network.metrics_port`.
    #[arg(long, env = "NOMINA_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Overrides `logging.format` (`pretty` or `json`).
    #[arg(long, env = "NOMINA_LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[arg(long, short = 'd', env = "NOMINA_DATA_DIR", default_value = ".nomina")]
    pub data_dir: PathBuf,

    /// mainnet, testnet, or devnet.
    #[arg(long, default_value = "devnet")]
    pub network: String,

    /// Overwrite an existing config and keys.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct SignVoucherArgs {
    #[arg(long, short = 'd', env = "NOMINA_DATA_DIR", default_value = ".nomina")]
    pub data_dir: PathBuf,

    /// Signer key file. Defaults to `signer.key` in the data directory.
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Name to authorize, with or without the TLD.
    #[arg(long)]
    pub name: String,

    /// Hex address of the future owner.
    #[arg(long)]
    pub owner: String,

    /// Registration length in days.
    #[arg(long, default_value_t = 365)]
    pub days: u64,

    /// Most the submitter may be charged, in native tokens (decimal).
    #[arg(long)]
    pub price_ceiling: String,

    /// Seconds from now until the voucher expires.
    #[arg(long, default_value_t = 3_600)]
    pub valid_for: u64,

    /// Owner's current voucher nonce.
    #[arg(long, default_value_t = 0)]
    pub nonce: u64,

    /// Sign for the auction path instead of the plain signature path.
    #[arg(long)]
    pub auction: bool,
}

#[derive(Args, Debug)]
pub struct AllowlistArgs {
    /// File with one hex address per line.
    #[arg(long)]
    pub addresses: PathBuf,

    /// Print the proof for this address as well.
    #[arg(long)]
    pub proof_for: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        NominaNodeCli::command().debug_assert();
    }

    #[test]
    fn help_warns_that_calls_are_unauthenticated() {
        let mut cmd = NominaNodeCli::command();
        let help = cmd.render_help().to_string();
        assert!(help.contains("does not authenticate RPC calls"));

        let run = cmd.find_subcommand_mut("run").unwrap();
        let help = run.render_long_help().to_string();
        assert!(help.contains("localhost"));
        assert!(help.contains("--bind-address"));
    }

    #[test]
    fn parses_bind_address() {
        let cli = NominaNodeCli::try_parse_from(["nomina-node", "run", "--bind-address", "10.0.0.5"])
            .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.bind_address, Some("10.0.0.5".parse().unwrap()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_sign_voucher() {
        let cli = NominaNodeCli::try_parse_from([
            "nomina-node",
            "sign-voucher",
            "--name",
            "alice",
            "--owner",
            "0xabc",
            "--price-ceiling",
            "10",
            "--auction",
        ])
        .unwrap();
        match cli.command {
            Commands::SignVoucher(args) => {
                assert_eq!(args.name, "alice");
                assert_eq!(args.days, 365);
                assert!(args.auction);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
