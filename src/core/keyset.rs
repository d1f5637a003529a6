// The unspent-output index. Every entry maps a recipient key to the
// transaction whose output for that key is still unspent; keys are unique in
// the map, so one key never holds more than one active output.

use crate::core::{Transaction, MINING_REWARD};
use crate::error::ValidationError;
use crate::wallet::PublicKey;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct KeySet {
    entries: HashMap<PublicKey, Transaction>,
}

impl KeySet {
    pub fn new() -> KeySet {
        KeySet {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &PublicKey) -> Option<&Transaction> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.entries.keys()
    }

    /// Shallow copy; transactions are immutable once constructed, so sharing
    /// the values is safe
    pub fn copy(&self) -> KeySet {
        self.clone()
    }

    /// The unspent amount held by `key`, if the set has an entry for it
    pub fn unspent_amount(&self, key: &PublicKey) -> Option<u64> {
        self.entries.get(key).map(|txn| match txn.output_amount(key) {
            Some(amount) => amount,
            None => panic!(
                "key set corrupt: entry for {} does not pay that key",
                key.fingerprint()
            ),
        })
    }

    /// Apply a transaction to the set.
    ///
    /// Inputs are consumed as they are checked, so a transaction that names
    /// the same key in two inputs fails on the second one. On any error the
    /// set may be left partially updated - callers that need atomicity apply
    /// the transaction to a copy first.
    pub fn add(&mut self, txn: &Transaction) -> Result<(), ValidationError> {
        if !txn.verify_signatures() {
            return Err(ValidationError::SignatureInvalid);
        }

        let mut in_total: u64 = 0;
        for input in txn.inputs() {
            let prev = match self.entries.get(input.key()) {
                Some(prev) => prev,
                None => return Err(ValidationError::MissingInput),
            };
            if prev.hash() != input.prev_hash() {
                return Err(ValidationError::StaleInput);
            }
            let amount = match prev.output_amount(input.key()) {
                Some(amount) => amount,
                // An entry is only ever inserted under one of its own output
                // keys, so a miss here means the index itself is broken.
                None => panic!(
                    "key set corrupt: entry for {} does not pay that key",
                    input.key().fingerprint()
                ),
            };
            in_total += amount;
            self.entries.remove(input.key());
        }

        let mut out_total: u64 = 0;
        for output in txn.outputs() {
            out_total += output.amount();
            if self.entries.contains_key(output.key()) {
                return Err(ValidationError::OutputKeyReused);
            }
            self.entries.insert(output.key().clone(), txn.clone());
        }

        if txn.is_miner() {
            in_total = MINING_REWARD;
        }

        if in_total != out_total {
            return Err(ValidationError::AmountMismatch);
        }

        Ok(())
    }
}
