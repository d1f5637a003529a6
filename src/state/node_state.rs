// The shared node state. One reader-writer lock protects every field; the
// miner additionally observes `reset_miner` without the lock, so the flag is
// an atomic. Stores to the flag only ever happen while the write lock is
// held: mutators set it, construct_block clears it.

use crate::core::{Block, BlockChain, KeySet, Transaction, TxnInput};
use crate::error::{NodeError, Result};
use crate::network::NodeHandle;
use crate::wallet::{Keypair, PublicKey, Wallet};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct NodeState {
    inner: RwLock<StateInner>,
    reset_miner: AtomicBool,
}

struct StateInner {
    /// The longest known valid chain
    primary: BlockChain,
    /// Previously primary chains, kept so peers can still request them by
    /// tip hash
    alternates: Vec<BlockChain>,
    wallet: Wallet,
    /// The primary chain's unspent outputs with mempool effects applied
    keys: KeySet,
    /// Valid transactions not yet included in a mined block
    pending_txns: Vec<Transaction>,
    /// How many transactions the current mining template carries (miner's
    /// transaction included); zero when no template is outstanding
    being_mined: usize,
}

/// A consistent copy of the fields the operator console displays
pub struct StateSnapshot {
    pub primary: BlockChain,
    pub alternates: usize,
    pub pending: Vec<Transaction>,
    pub being_mined: usize,
}

#[derive(Clone, Copy)]
enum ChainPos {
    Primary,
    Alternate(usize),
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeState {
    pub fn new() -> NodeState {
        NodeState {
            inner: RwLock::new(StateInner {
                primary: BlockChain::new(),
                alternates: vec![],
                wallet: Wallet::new(),
                keys: KeySet::new(),
                pending_txns: vec![],
                being_mined: 0,
            }),
            reset_miner: AtomicBool::new(false),
        }
    }

    /// Per-key balances for every wallet key.
    ///
    /// A balance is reported only for outputs that are both confirmed
    /// (present in the primary chain's key set) and not consumed by a
    /// pending transaction; everything else reads zero until the next block
    /// settles it.
    pub fn get_wallet(&self) -> HashMap<PublicKey, u64> {
        let inner = self.read_inner();

        let mut balances = HashMap::new();
        for key in inner.wallet.public_keys() {
            let confirmed = inner.primary.active_keys().contains(key);
            let balance = if confirmed {
                inner.keys.unspent_amount(key).unwrap_or(0)
            } else {
                0
            };
            balances.insert(key.clone(), balance);
        }
        balances
    }

    /// Build the input that spends `key`'s unspent output
    pub fn gen_txn_input(&self, key: &PublicKey) -> Result<TxnInput> {
        let inner = self.read_inner();
        let prev = inner.keys.get(key).ok_or_else(|| {
            NodeError::Wallet(format!("no unspent output for key {}", key.fingerprint()))
        })?;
        Ok(TxnInput::new(key.clone(), prev.hash()))
    }

    /// Sign every input of `txn` with this node's wallet
    pub fn sign_txn(&self, txn: &mut Transaction) -> Result<()> {
        let inner = self.read_inner();
        txn.sign(&inner.wallet)
    }

    /// Validate a transaction against the mempool-applied key set and, on
    /// success, queue it for mining. Rejection leaves the state untouched.
    pub fn add_txn(&self, txn: Transaction) -> bool {
        let mut inner = self.write_inner();

        let mut tentative = inner.keys.copy();
        if let Err(e) = tentative.add(&txn) {
            debug!("rejecting txn: {e}");
            return false;
        }

        inner.keys = tentative;
        inner.pending_txns.push(txn);
        self.reset_miner.store(true, Ordering::Relaxed);
        true
    }

    pub fn add_to_wallet(&self, key: Keypair) {
        let mut inner = self.write_inner();
        inner.wallet.add_key(key);
    }

    /// Produce a fresh mining template: a miner's transaction paying a new
    /// key, followed by the current mempool, on top of the primary tip.
    /// Clears the reset flag; the returned private key stays out of the
    /// wallet until the block is actually mined and appended.
    pub fn construct_block(&self) -> Result<(Block, Keypair)> {
        // key generation is slow; do it before taking the lock
        let key = Keypair::generate()?;

        let mut inner = self.write_inner();

        let mut txns = Vec::with_capacity(inner.pending_txns.len() + 1);
        txns.push(Transaction::new_miners_txn(key.public().clone()));
        txns.extend(inner.pending_txns.iter().cloned());

        let prev_hash = inner.primary.last().map(|b| b.hash());
        inner.being_mined = txns.len();
        self.reset_miner.store(false, Ordering::Relaxed);

        Ok((Block::new(prev_hash, txns), key))
    }

    /// The chain whose tip hash equals `tip`, or the primary chain when
    /// `tip` is None. Used to serve chain requests from peers.
    pub fn chain_from_hash(&self, tip: Option<&[u8]>) -> Option<BlockChain> {
        let inner = self.read_inner();

        let tip = match tip {
            None => return Some(inner.primary.clone()),
            Some(tip) => tip,
        };

        if Self::tip_matches(&inner.primary, Some(tip)) {
            return Some(inner.primary.clone());
        }
        inner
            .alternates
            .iter()
            .find(|chain| Self::tip_matches(chain, Some(tip)))
            .cloned()
    }

    /// Adopt a verified chain if it is strictly longer than the primary,
    /// demoting the current primary into the alternates
    pub fn add_block_chain(&self, chain: BlockChain) {
        let mut inner = self.write_inner();

        if chain.len() > inner.primary.len() {
            info!(
                "Adopting a longer chain: {} blocks (had {})",
                chain.len(),
                inner.primary.len()
            );
            let old = std::mem::replace(&mut inner.primary, chain);
            inner.alternates.push(old);
            self.reset_unlocked(&mut inner);
        }
    }

    /// Accept a block into whichever chain's tip matches its prev_hash.
    ///
    /// Returns (accepted, have_chain). (true, false) means the block is
    /// plausible but no known chain can parent it - the caller should fetch
    /// the whole chain. The tip match is re-checked under the lock, so a
    /// stale mining attempt can never land.
    pub fn add_block(&self, block: &Block) -> (bool, bool) {
        if !block.verify() {
            return (false, true);
        }

        let mut inner = self.write_inner();

        let pos = match Self::parent_chain_pos(&inner, block.prev_hash()) {
            Some(pos) => pos,
            None => return (true, false),
        };

        let appended = match pos {
            ChainPos::Primary => inner.primary.append(block.clone()),
            ChainPos::Alternate(i) => inner.alternates[i].append(block.clone()),
        };
        if !appended {
            return (false, true);
        }

        if matches!(pos, ChainPos::Primary) {
            info!("Primary chain extended to {} blocks", inner.primary.len());
            self.reset_unlocked(&mut inner);
        }

        (true, true)
    }

    /// Whether the miner should abandon its current attempt
    pub fn reset_requested(&self) -> bool {
        self.reset_miner.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.read_inner();
        StateSnapshot {
            primary: inner.primary.clone(),
            alternates: inner.alternates.len(),
            pending: inner.pending_txns.clone(),
            being_mined: inner.being_mined.min(inner.pending_txns.len() + 1),
        }
    }

    /// Rebase the mempool after a chain change: rebuild `keys` from the
    /// primary tip and replay the pending transactions, dropping any that no
    /// longer validate. Must be called with the write lock held.
    fn reset_unlocked(&self, inner: &mut StateInner) {
        let mut keys = inner.primary.active_keys().copy();
        let pending = std::mem::take(&mut inner.pending_txns);

        let mut kept = Vec::with_capacity(pending.len());
        for txn in pending {
            let mut tentative = keys.copy();
            match tentative.add(&txn) {
                Ok(()) => {
                    keys = tentative;
                    kept.push(txn);
                }
                Err(e) => debug!("dropping pending txn during rebase: {e}"),
            }
        }

        inner.keys = keys;
        inner.pending_txns = kept;
        inner.being_mined = 0;
        self.reset_miner.store(true, Ordering::Relaxed);
    }

    fn tip_matches(chain: &BlockChain, tip: Option<&[u8]>) -> bool {
        match (chain.last(), tip) {
            (None, None) => true,
            (Some(block), Some(hash)) => block.hash() == hash,
            _ => false,
        }
    }

    // A block's parent chain is the one whose tip equals the block's
    // prev_hash exactly; a genesis block (no prev_hash) only parents onto a
    // chain with no blocks.
    fn parent_chain_pos(inner: &StateInner, prev_hash: Option<&[u8]>) -> Option<ChainPos> {
        if Self::tip_matches(&inner.primary, prev_hash) {
            return Some(ChainPos::Primary);
        }
        inner
            .alternates
            .iter()
            .position(|chain| Self::tip_matches(chain, prev_hash))
            .map(ChainPos::Alternate)
    }

    // A poisoned lock means another thread died mid-mutation; the state can
    // no longer be trusted, so terminate instead of cascading panics through
    // every caller.
    fn read_inner(&self) -> RwLockReadGuard<'_, StateInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("Node state lock poisoned, aborting");
                std::process::exit(1);
            }
        }
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, StateInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("Node state lock poisoned, aborting");
                std::process::exit(1);
            }
        }
    }
}

// The network event dispatcher drives the state through this interface; the
// state never holds a reference back to the network.
impl NodeHandle for NodeState {
    fn on_chain_request(&self, tip: Option<&[u8]>) -> Option<BlockChain> {
        self.chain_from_hash(tip)
    }

    fn on_chain_response(&self, chain: BlockChain) {
        self.add_block_chain(chain);
    }

    fn on_block(&self, block: &Block) -> (bool, bool) {
        self.add_block(block)
    }

    fn on_txn(&self, txn: Transaction) -> bool {
        self.add_txn(txn)
    }

    fn on_pay_request(&self) -> Result<PublicKey> {
        let mut inner = self.write_inner();
        inner.wallet.gen_key()
    }
}
