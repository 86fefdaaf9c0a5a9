use crate::mining::{ProofOfWork, DEFAULT_MAX_NONCE, DEFAULT_TARGET_BITS};
use crate::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "tinychain.json";
pub const WALLET_FILE: &str = "wallets.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub mining: MiningConfig,
    pub consensus: ConsensusConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningConfig {
    pub target_bits: u32,
    pub max_nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub subsidy: u64,
    /// Pay a block reward to the sender of every CLI transfer.
    pub reward_on_transfer: bool,
    pub genesis_memo: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                db_path: PathBuf::from("./tinychain.db"),
            },
            mining: MiningConfig {
                target_bits: DEFAULT_TARGET_BITS,
                max_nonce: DEFAULT_MAX_NONCE,
            },
            consensus: ConsensusConfig {
                subsidy: 10,
                reward_on_transfer: true,
                genesis_memo: "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks".to_string(),
            },
        }
    }
}

impl Config {
    /// Reads the config at `path`, writing out the defaults first if the file
    /// does not exist yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            let config = Self::default();
            config.save(path)?;
            log::debug!("Wrote default config to {}", path.display());
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.mining.target_bits > 255 {
            return Err(ChainError::InvalidDifficulty(self.mining.target_bits));
        }
        if self.mining.max_nonce == 0 {
            return Err(ChainError::InvalidInput("mining.max_nonce must be positive".to_string()));
        }
        if self.consensus.subsidy == 0 {
            return Err(ChainError::InvalidInput("consensus.subsidy must be positive".to_string()));
        }
        Ok(())
    }

    pub fn proof_of_work(&self) -> Result<ProofOfWork> {
        Ok(ProofOfWork::new(self.mining.target_bits)?.with_max_nonce(self.mining.max_nonce))
    }

    /// Wallet file kept beside the database.
    pub fn wallet_path(&self) -> PathBuf {
        match self.storage.db_path.parent() {
            Some(parent) => parent.join(WALLET_FILE),
            None => PathBuf::from(WALLET_FILE),
        }
    }
}
