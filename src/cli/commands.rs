use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::core::blockchain::LAST_KEY;
use crate::core::{Block, Blockchain, Transaction, UtxoSet};
use crate::crypto::hash::Hash256;
use crate::crypto::keys::{address_to_hash160, is_valid_address};
use crate::storage::{Database, KvStore, TREE_BLOCKS, TREE_CHAINSTATE};
use crate::wallet::Wallets;
use crate::{ChainError, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "tinychain")]
#[command(about = "A single-node proof-of-work UTXO ledger")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Database path (overrides config)")]
    pub db: Option<PathBuf>,

    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable debug logging")]
    pub debug: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Generate a new key pair and store it in the wallet file
    Createwallet,

    /// List every address held in the wallet file
    Listaddresses,

    /// Create a chain whose genesis reward pays ADDRESS
    Createchain {
        #[arg(long)]
        address: String,
    },

    /// Print every block from the tip back to genesis
    Printchain,

    /// Send AMOUNT from one wallet address to another and mine it
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },

    /// Show the spendable balance of ADDRESS
    Balance {
        #[arg(long)]
        address: String,
    },

    /// Rebuild the UTXO index from the chain
    Reindexutxo,
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging once
    let _ = if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).try_init()
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init()
    };

    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = Config::load(&config_path)?;
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }

    execute(&config, cli.command, &mut std::io::stdout())
}

/// Runs one command against the stores named by `config`, printing to `out`.
pub fn execute<W: Write>(config: &Config, command: Commands, out: &mut W) -> Result<()> {
    match command {
        Commands::Createwallet => {
            let address = create_wallet(config)?;
            writeln!(out, "Your new address: {}", address)?;
        }

        Commands::Listaddresses => {
            for address in Wallets::load(config.wallet_path())?.addresses() {
                writeln!(out, "{}", address)?;
            }
        }

        Commands::Createchain { address } => {
            let tip = create_chain(config, &address)?;
            writeln!(out, "Done! Genesis block {}", tip)?;
        }

        Commands::Printchain => print_chain(config, out)?,

        Commands::Transfer { from, to, amount } => {
            transfer(config, &from, &to, amount)?;
            writeln!(out, "Success!")?;
        }

        Commands::Balance { address } => {
            let balance = balance(config, &address)?;
            writeln!(out, "Balance of '{}': {}", address, balance)?;
        }

        Commands::Reindexutxo => {
            let count = reindex_utxo(config)?;
            writeln!(out, "Done! There are {} transactions in the UTXO set.", count)?;
        }
    }

    Ok(())
}

struct Stores {
    db: Database,
    blocks: Arc<dyn KvStore>,
    utxo: UtxoSet,
}

fn open_stores(config: &Config) -> Result<Stores> {
    let db = Database::open(&config.storage.db_path)?;
    let blocks: Arc<dyn KvStore> = Arc::new(db.tree(TREE_BLOCKS)?);
    let utxo = UtxoSet::new(Arc::new(db.tree(TREE_CHAINSTATE)?));

    Ok(Stores { db, blocks, utxo })
}

fn require_address(address: &str) -> Result<()> {
    if is_valid_address(address) {
        Ok(())
    } else {
        Err(ChainError::InvalidInput(format!("Invalid address: {}", address)))
    }
}

pub fn create_wallet(config: &Config) -> Result<String> {
    let mut wallets = Wallets::load(config.wallet_path())?;
    let address = wallets.create_wallet()?;
    wallets.save()?;
    Ok(address)
}

pub fn create_chain(config: &Config, address: &str) -> Result<Hash256> {
    let recipient = address_to_hash160(address)?;
    let stores = open_stores(config)?;

    if stores.blocks.get(LAST_KEY)?.is_some() {
        return Err(ChainError::InvalidInput("Blockchain already exists.".to_string()));
    }

    let reward = Transaction::new_reward(recipient, &config.consensus.genesis_memo, config.consensus.subsidy);
    let chain = Blockchain::open(stores.blocks.clone(), config.proof_of_work()?, Some(reward))?;
    stores.utxo.rebuild(&chain)?;
    stores.db.flush()?;

    Ok(chain.tip())
}

fn open_chain(config: &Config, stores: &Stores) -> Result<Blockchain> {
    Blockchain::open(stores.blocks.clone(), config.proof_of_work()?, None)
}

pub fn print_chain<W: Write>(config: &Config, out: &mut W) -> Result<()> {
    let stores = open_stores(config)?;
    let chain = open_chain(config, &stores)?;
    let pow = chain.proof_of_work();

    for block in chain.iter() {
        let block = block?;
        match &block.previous_hash {
            Some(_) => writeln!(out, "============ Block {} ============", block.hash)?,
            None => writeln!(out, "============ Genesis {} ============", block.hash)?,
        }
        writeln!(
            out,
            "Prev. block: {}",
            block.previous_hash.map(|h| h.to_hex()).unwrap_or_default()
        )?;
        writeln!(out, "Timestamp: {}", block.timestamp)?;
        writeln!(out, "Nonce: {}", block.nonce)?;
        writeln!(out, "PoW: {}", pow.validate(&block)?)?;
        for tx in &block.transactions {
            write!(out, "{}", tx)?;
        }
        writeln!(out)?;
    }

    Ok(())
}

/// Builds, mines and indexes a transfer. Returns the sealed block.
pub fn transfer(config: &Config, from: &str, to: &str, amount: u64) -> Result<Block> {
    require_address(from)?;
    require_address(to)?;

    let wallets = Wallets::load(config.wallet_path())?;
    let sender = wallets.get(from)?;

    let stores = open_stores(config)?;
    let mut chain = open_chain(config, &stores)?;

    let tx = Transaction::new_transfer(&sender, to, amount, &stores.utxo, &chain)?;
    let mut transactions = Vec::with_capacity(2);
    if config.consensus.reward_on_transfer {
        transactions.push(Transaction::new_reward(
            sender.public_key.hash160(),
            "",
            config.consensus.subsidy,
        ));
    }
    transactions.push(tx);

    let block = chain.append(transactions)?;
    stores.utxo.update(&block)?;
    stores.db.flush()?;

    Ok(block)
}

pub fn balance(config: &Config, address: &str) -> Result<u64> {
    let pubkey_hash = address_to_hash160(address)?;
    let stores = open_stores(config)?;
    // Refuse to report on a store that holds no chain
    open_chain(config, &stores)?;

    stores.utxo.find_balance(&pubkey_hash)
}

pub fn reindex_utxo(config: &Config) -> Result<usize> {
    let stores = open_stores(config)?;
    let chain = open_chain(config, &stores)?;
    let count = stores.utxo.rebuild(&chain)?;
    stores.db.flush()?;
    Ok(count)
}
