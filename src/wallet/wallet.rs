use crate::error::Result;
use crate::wallet::{Keypair, PublicKey};
use std::collections::HashMap;

/// The operator's private keys, indexed by public key.
///
/// Keys live only in memory; losing the process loses the wallet.
#[derive(Default)]
pub struct Wallet {
    keys: HashMap<PublicKey, Keypair>,
}

impl Wallet {
    pub fn new() -> Wallet {
        Wallet {
            keys: HashMap::new(),
        }
    }

    pub fn add_key(&mut self, key: Keypair) {
        self.keys.insert(key.public().clone(), key);
    }

    /// Generate a fresh keypair, store it, and return its public key
    pub fn gen_key(&mut self) -> Result<PublicKey> {
        let key = Keypair::generate()?;
        let public = key.public().clone();
        self.add_key(key);
        Ok(public)
    }

    pub fn get(&self, public: &PublicKey) -> Option<&Keypair> {
        self.keys.get(public)
    }

    pub fn public_keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.keys.keys()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
