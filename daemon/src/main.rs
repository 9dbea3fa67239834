#[macro_use]
extern crate log;

use clap::Parser;
use lattice_common::crypto::{KeyPair, PublicKey, SecretKey};
use lattice_common::network::Network;
use lattice_daemon::config::{ensure_data_directory, working_path, DaemonConfig};
use lattice_daemon::core::storage::{
    AccountProvider, BlockProvider, LedgerStore, PendingProvider,
};
use lattice_daemon::core::voting::LocalRepresentatives;
use lattice_daemon::logger;
use lattice_daemon::node::Node;
use lattice_daemon::p2p::NullNetwork;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

// Command line error taxonomy. Argument parse failures exit 2 through
// the parser itself.
const EXIT_GENERIC: u8 = 1;
const EXIT_INVALID_ARGUMENTS: u8 = 3;
const EXIT_UNKNOWN_COMMAND: u8 = 4;

#[derive(Parser)]
#[command(
    name = "lattice_daemon",
    version,
    about = "Lattice Network block-lattice node",
    styles = lattice_common::get_cli_styles()
)]
struct Opts {
    /// Use the given directory instead of the default data path
    #[arg(long, value_name = "PATH")]
    data_path: Option<PathBuf>,

    /// Network to participate in: mainnet, testnet or devnet
    #[arg(long, default_value = "mainnet")]
    network: Network,

    /// Start the node
    #[arg(long)]
    daemon: bool,

    /// Create the data directory, config file and genesis record
    #[arg(long)]
    initialize: bool,

    /// Print store statistics
    #[arg(long)]
    diagnostics: bool,

    /// Generate a random keypair
    #[arg(long)]
    key_create: bool,

    /// Derive the public key and account for a private key
    #[arg(long, value_name = "KEY")]
    key_expand: Option<String>,

    /// Print the account for a public key
    #[arg(long, value_name = "KEY")]
    account_get: Option<String>,

    /// Print the public key for an account
    #[arg(long, value_name = "ACCOUNT")]
    account_key: Option<String>,
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run(opts: Opts) -> Result<(), u8> {
    let data_path = opts
        .data_path
        .clone()
        .unwrap_or_else(|| working_path(opts.network));

    if opts.key_create {
        let key = KeyPair::new();
        println!("Private: {}", key.secret_key().to_hex());
        println!("Public: {}", key.public_key().to_hex());
        println!("Account: {}", key.public_key().to_address());
        Ok(())
    } else if let Some(private) = &opts.key_expand {
        let secret = SecretKey::from_hex(private).map_err(|e| {
            eprintln!("Invalid private key: {}", e);
            EXIT_INVALID_ARGUMENTS
        })?;
        let key = KeyPair::from_secret(secret);
        println!("Private: {}", key.secret_key().to_hex());
        println!("Public: {}", key.public_key().to_hex());
        println!("Account: {}", key.public_key().to_address());
        Ok(())
    } else if let Some(public) = &opts.account_get {
        let key = PublicKey::from_hex(public).map_err(|e| {
            eprintln!("Invalid public key: {}", e);
            EXIT_INVALID_ARGUMENTS
        })?;
        println!("Account: {}", key.to_address());
        Ok(())
    } else if let Some(account) = &opts.account_key {
        let key = PublicKey::from_address(account).map_err(|e| {
            eprintln!("Invalid account: {}", e);
            EXIT_INVALID_ARGUMENTS
        })?;
        println!("Public: {}", key.to_hex());
        Ok(())
    } else if opts.initialize {
        initialize(&data_path, opts.network).map_err(|e| {
            eprintln!("Error initializing node: {:#}", e);
            EXIT_GENERIC
        })
    } else if opts.diagnostics {
        diagnostics(&data_path).map_err(|e| {
            eprintln!("Error running diagnostics: {:#}", e);
            EXIT_GENERIC
        })
    } else if opts.daemon {
        run_daemon(&data_path, opts.network).map_err(|e| {
            eprintln!("Error while running node: {:#}", e);
            EXIT_GENERIC
        })
    } else {
        eprintln!("No command given; try --help");
        Err(EXIT_UNKNOWN_COMMAND)
    }
}

fn open_store(data_path: &std::path::Path, max_dbs: u32) -> anyhow::Result<LedgerStore> {
    Ok(LedgerStore::open(&data_path.join("data.ldb"), max_dbs)?)
}

fn initialize(data_path: &std::path::Path, network: Network) -> anyhow::Result<()> {
    ensure_data_directory(data_path)?;
    let config = DaemonConfig::load_or_create(&data_path.join("config.json"))?;
    let store = open_store(data_path, config.node.lmdb_max_dbs)?;
    let mut txn = store.tx_begin_write()?;
    if store.is_empty(&txn)? {
        store.initialize(&mut txn, network)?;
    }
    txn.commit()?;
    println!("Initialized {} data directory at {}", network, data_path.display());
    Ok(())
}

fn diagnostics(data_path: &std::path::Path) -> anyhow::Result<()> {
    let config = DaemonConfig::load_or_create(&data_path.join("config.json"))?;
    let store = open_store(data_path, config.node.lmdb_max_dbs)?;
    let txn = store.tx_begin_read()?;
    println!("Blocks: {}", store.block_count(&txn)?);
    println!("Accounts: {}", store.account_count(&txn)?);
    println!("Pending: {}", store.pending_count(&txn)?);
    println!("Frontiers: {}", store.frontier_count(&txn)?);
    println!("Representatives: {}", store.rep_weights(&txn)?.len());
    println!("Stored votes: {}", store.votes(&txn)?.len());
    Ok(())
}

fn run_daemon(data_path: &std::path::Path, network: Network) -> anyhow::Result<()> {
    ensure_data_directory(data_path)?;
    let config = DaemonConfig::load_or_create(&data_path.join("config.json"))?;
    logger::init(data_path, log::LevelFilter::Info)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.node.io_threads.max(1) as usize)
        .thread_name("I/O")
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        // the transport and wallet attach here once their services run
        let node = Node::new(
            data_path,
            config,
            network,
            Arc::new(NullNetwork),
            Arc::new(LocalRepresentatives::default()),
        )
        .await?;
        node.start();
        info!("Node running, data path {}", data_path.display());
        tokio::signal::ctrl_c().await?;
        node.stop().await;
        anyhow::Ok(())
    })?;
    Ok(())
}
