use crate::core::Transaction;
use crate::error::Result;
use crate::utils::{serialize, sha256_digest};
use rand::Rng;
use serde::{Deserialize, Serialize};

// Proof-of-work target: the first 17 bits of the block hash must be zero.
// Expected 2^17 attempts per block; every peer must use the same target.
const POW_ZERO_BYTES: usize = 2;
const POW_THIRD_BYTE_MASK: u8 = 0x80;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    prev_hash: Option<Vec<u8>>,
    nonce: u32,
    txns: Vec<Transaction>,
}

impl Block {
    pub fn new(prev_hash: Option<Vec<u8>>, txns: Vec<Transaction>) -> Block {
        Block {
            prev_hash,
            nonce: 0,
            txns,
        }
    }

    pub fn prev_hash(&self) -> Option<&[u8]> {
        self.prev_hash.as_deref()
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn set_nonce(&mut self, nonce: u32) {
        self.nonce = nonce;
    }

    pub fn txns(&self) -> &[Transaction] {
        self.txns.as_slice()
    }

    /// SHA-256 over the canonical encoding of the whole block, nonce included
    pub fn hash(&self) -> Vec<u8> {
        match serialize(self) {
            Ok(bytes) => sha256_digest(&bytes),
            Err(_) => {
                log::error!("Block serialization failed during hash calculation");
                sha256_digest(b"block_serialization_error")
            }
        }
    }

    /// True iff the block hash meets the proof-of-work target
    pub fn verify(&self) -> bool {
        let hash = self.hash();
        hash[..POW_ZERO_BYTES].iter().all(|b| *b == 0)
            && hash[POW_ZERO_BYTES] & POW_THIRD_BYTE_MASK == 0
    }

    /// Search random nonces until the block verifies or `cancelled` reports
    /// true. Returns whether a solution was found.
    pub fn solve(&mut self, cancelled: impl Fn() -> bool) -> bool {
        let mut rng = rand::thread_rng();
        while !cancelled() {
            self.nonce = rng.gen();
            if self.verify() {
                return true;
            }
        }
        false
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }
}
