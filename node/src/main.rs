// Copyright (c) 2026 Nomina Contributors. MIT License.
// See LICENSE for details.

//! # Nomina Registrar Node
//!
//! Entry point for the `nomina-node` binary. Parses CLI arguments, loads the
//! node config, restores or creates the registrar, and serves the HTTP/WS
//! API alongside a Prometheus endpoint.
//!
//! Subcommands:
//!
//! - `run`          start the node
//! - `init`         create a data directory, config and keys
//! - `sign-voucher` sign a registration voucher with the signer key
//! - `allowlist`    compute an allowlist Merkle root and proofs
//! - `version`      print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use nomina_contracts::authorization::RegistrationVoucher;
use nomina_contracts::controller::RegistrarController;
use nomina_protocol::amount::NativeAmount;
use nomina_protocol::config::{chain_id_for_network, PROTOCOL_VERSION, SECONDS_PER_DAY};
use nomina_protocol::crypto::hash;
use nomina_protocol::crypto::keys::NominaKeypair;
use nomina_protocol::crypto::merkle::MerkleTree;
use nomina_protocol::crypto::signatures::sign_digest;
use nomina_protocol::identity::Address;
use nomina_protocol::storage::NominaDB;

use cli::{Commands, NominaNodeCli};
use config::NodeConfig;
use logging::LogFormat;
use metrics::NodeMetrics;

/// Capacity of the live event channel. Slow WebSocket clients past this
/// many events start skipping.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

const ADMIN_KEY_FILE: &str = "admin.key";
const SIGNER_KEY_FILE: &str = "signer.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NominaNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::SignVoucher(args) => sign_voucher(args),
        Commands::Allowlist(args) => allowlist(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config_file = args
        .config
        .clone()
        .unwrap_or_else(|| config::config_path(&args.data_dir));
    let mut node_config = NodeConfig::load(&config_file)?;
    if let Some(addr) = args.bind_address {
        node_config.network.bind_address = addr;
    }
    if let Some(port) = args.rpc_port {
        node_config.network.rpc_port = port;
    }
    if let Some(port) = args.metrics_port {
        node_config.network.metrics_port = port;
    }

    let format: LogFormat = args
        .log_format
        .as_deref()
        .unwrap_or(&node_config.logging.format)
        .parse()?;
    logging::init_logging(&node_config.logging.filter, format)?;

    let chain_id = node_config.chain_id()?;
    tracing::info!(
        network = %node_config.network.name,
        chain_id,
        bind = %node_config.network.bind_address,
        rpc_port = node_config.network.rpc_port,
        metrics_port = node_config.network.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting nomina-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = NominaDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Registrar ---
    let feed = Arc::new(node_config.price_feed());
    let registrar = api::bootstrap_registrar(
        &db,
        || {
            Ok(RegistrarController::new(
                node_config.controller_config()?,
                node_config.registry()?,
                feed.clone(),
            ))
        },
        feed.clone(),
    )?;
    if registrar.config().chain_id != chain_id {
        tracing::warn!(
            stored = registrar.config().chain_id,
            configured = chain_id,
            "stored registrar was created for a different chain id; keeping the stored one"
        );
    }

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics
        .names_registered
        .set(i64::try_from(registrar.registry().record_count()).unwrap_or(i64::MAX));

    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        network: node_config.network.name.clone(),
        chain_id,
        registrar: Arc::new(RwLock::new(registrar)),
        feed,
        db: db.clone(),
        event_tx,
        metrics: Arc::clone(&node_metrics),
        clock: api::system_clock(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let bind = node_config.network.bind_address;
    if !bind.is_loopback() {
        tracing::warn!(
            %bind,
            "RPC calls are not authenticated; callers can act as admin and skip payment"
        );
    }
    let api_addr = SocketAddr::new(bind, node_config.network.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = SocketAddr::new(bind, node_config.network.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    db.flush().context("failed to flush database")?;
    tracing::info!("nomina-node stopped");
    Ok(())
}

/// Creates a data directory with a devnet-style config, an admin key and
/// a voucher-signer key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("nomina_node=info", LogFormat::Pretty)?;

    if chain_id_for_network(&args.network).is_none() {
        bail!("unknown network {:?}; use mainnet, testnet or devnet", args.network);
    }

    let data_dir = &args.data_dir;
    let config_file = config::config_path(data_dir);
    if config_file.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite it and its keys",
            config_file.display()
        );
    }
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let admin = NominaKeypair::generate();
    let signer = NominaKeypair::generate();
    let admin_address = Address::from_public_key(&admin.public_key());

    let admin_path = data_dir.join(ADMIN_KEY_FILE);
    let signer_path = data_dir.join(SIGNER_KEY_FILE);
    write_secret_key(&admin_path, &admin)?;
    write_secret_key(&signer_path, &signer)?;

    let mut node_config = NodeConfig::devnet(admin_address, Some(signer.public_key()));
    node_config.network.name = args.network.clone();
    node_config.save(&config_file)?;

    tracing::info!(
        admin = %admin_address,
        signer = %signer.public_key().to_hex(),
        "keys generated"
    );

    println!("Node initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", args.network);
    println!("  Config         : {}", config_file.display());
    println!("  Admin address  : {}", admin_address);
    println!("  Signer key     : {}", signer.public_key().to_hex());

    Ok(())
}

fn write_secret_key(path: &Path, keypair: &NominaKeypair) -> Result<()> {
    std::fs::write(path, keypair.secret_key_hex())
        .with_context(|| format!("failed to write key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }
    Ok(())
}

fn read_secret_key(path: &Path) -> Result<NominaKeypair> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key from {}", path.display()))?;
    NominaKeypair::from_hex(contents.trim())
        .map_err(|e| anyhow!("invalid key in {}: {}", path.display(), e))
}

/// Signs a voucher for the configured registrar and prints it as JSON,
/// ready to paste into `nomina_registerWithSignature`.
fn sign_voucher(args: cli::SignVoucherArgs) -> Result<()> {
    let node_config = NodeConfig::load(&config::config_path(&args.data_dir))?;
    let key_path = args
        .key
        .clone()
        .unwrap_or_else(|| args.data_dir.join(SIGNER_KEY_FILE));
    let signer = read_secret_key(&key_path)?;

    if let Some(configured) = node_config.registrar.signer_public_key {
        if configured != signer.public_key() {
            eprintln!("warning: this key is not the configured signer; the registrar will reject the voucher");
        }
    }

    let owner = Address::from_hex(&args.owner).map_err(|e| anyhow!("invalid owner: {e}"))?;
    let price_ceiling = NativeAmount::parse_decimal(&args.price_ceiling)
        .map_err(|e| anyhow!("invalid price ceiling: {e}"))?;
    let duration = args
        .days
        .checked_mul(SECONDS_PER_DAY)
        .ok_or_else(|| anyhow!("--days is too large"))?;
    let valid_for = i64::try_from(args.valid_for).context("--valid-for is too large")?;

    let voucher = RegistrationVoucher {
        name: args.name.clone(),
        owner,
        duration,
        price_ceiling,
        deadline: chrono::Utc::now().timestamp().saturating_add(valid_for),
        nonce: args.nonce,
    };
    let domain = node_config.controller_config()?.typed_data_domain();
    let digest = if args.auction {
        voucher.auction_digest(&domain)
    } else {
        voucher.digest(&domain)
    };
    let signature = sign_digest(&signer, &digest);

    let out = serde_json::json!({
        "voucher": voucher,
        "signature": signature,
        "digest": hash::to_hex(&digest),
        "auction": args.auction,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Prints the Merkle root of an address list, and a proof when asked.
fn allowlist(args: cli::AllowlistArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.addresses)
        .with_context(|| format!("failed to read {}", args.addresses.display()))?;

    let mut addresses = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let address = Address::from_hex(line)
            .map_err(|e| anyhow!("line {}: invalid address {line:?}: {e}", line_no + 1))?;
        addresses.push(address);
    }
    if addresses.is_empty() {
        bail!("{} contains no addresses", args.addresses.display());
    }

    let tree = MerkleTree::from_addresses(&addresses);
    let mut out = serde_json::json!({
        "root": hash::to_hex(&tree.root()),
        "leaves": tree.leaf_count(),
    });

    if let Some(member) = &args.proof_for {
        let member = Address::from_hex(member).map_err(|e| anyhow!("invalid address: {e}"))?;
        let proof = tree
            .proof_for(&member)
            .ok_or_else(|| anyhow!("{member} is not in the allowlist"))?;
        out["proof"] = serde_json::json!(proof.iter().map(hash::to_hex).collect::<Vec<_>>());
    }

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn print_version() {
    println!("nomina-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", PROTOCOL_VERSION);
    println!("rustc       {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT or SIGTERM. If a handler cannot be installed the
/// failure is logged and that signal is never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
