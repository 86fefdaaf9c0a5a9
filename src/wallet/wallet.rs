use crate::crypto::keys::{is_valid_address, KeyPair, PrivateKey};
use crate::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
    /// Hex-encoded secp256k1 secret key. Stored unencrypted.
    pub private_key: String,
    pub created_at: u64,
}

/// Address to key mapping persisted as a JSON file.
#[derive(Debug)]
pub struct Wallets {
    path: PathBuf,
    wallets: BTreeMap<String, WalletEntry>,
}

impl Wallets {
    /// Opens the wallet file at `path`; a missing file is an empty wallet set.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let wallets = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, wallets })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.wallets)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Generates a fresh key pair and returns its address. Call [`Wallets::save`]
    /// to persist it.
    pub fn create_wallet(&mut self) -> Result<String> {
        let keypair = KeyPair::new()?;
        let address = keypair.address();

        self.wallets.insert(
            address.clone(),
            WalletEntry {
                private_key: keypair.private_key.to_hex(),
                created_at: chrono::Utc::now().timestamp() as u64,
            },
        );

        log::info!("🔑 Created wallet {}", address);
        Ok(address)
    }

    pub fn get(&self, address: &str) -> Result<KeyPair> {
        if !is_valid_address(address) {
            return Err(ChainError::InvalidInput(format!("Invalid address: {}", address)));
        }

        let entry = self
            .wallets
            .get(address)
            .ok_or_else(|| ChainError::Wallet(format!("No wallet for address {}", address)))?;

        let keypair = KeyPair::from_private_key(PrivateKey::from_hex(&entry.private_key)?);
        if keypair.address() != address {
            return Err(ChainError::Wallet(format!("Stored key does not match address {}", address)));
        }
        Ok(keypair)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_save_and_reload() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wallets.json");

        let mut wallets = Wallets::load(&path)?;
        assert!(wallets.is_empty());

        let first = wallets.create_wallet()?;
        let second = wallets.create_wallet()?;
        assert_ne!(first, second);
        wallets.save()?;

        let reloaded = Wallets::load(&path)?;
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.addresses().contains(&first));

        let keypair = reloaded.get(&first)?;
        assert_eq!(keypair.address(), first);
        assert_eq!(keypair.public_key, wallets.get(&first)?.public_key);

        Ok(())
    }

    #[test]
    fn test_unknown_and_invalid_addresses() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let wallets = Wallets::load(temp_dir.path().join("wallets.json"))?;

        let stranger = KeyPair::new()?.address();
        assert!(matches!(wallets.get(&stranger), Err(ChainError::Wallet(_))));
        assert!(matches!(wallets.get("not-an-address"), Err(ChainError::InvalidInput(_))));

        Ok(())
    }

    #[test]
    fn test_mismatched_key_is_rejected() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wallets.json");

        let address = KeyPair::new()?.address();
        let other_key = KeyPair::new()?.private_key.to_hex();
        let content = format!(
            "{{\"{}\": {{\"private_key\": \"{}\", \"created_at\": 0}}}}",
            address, other_key
        );
        std::fs::write(&path, content).unwrap();

        let wallets = Wallets::load(&path)?;
        assert!(matches!(wallets.get(&address), Err(ChainError::Wallet(_))));

        Ok(())
    }
}
