//! Core consensus data model
//!
//! This module contains the fundamental chain components: blocks,
//! transactions, the unspent-output index, and the chain container with its
//! validation rules.

pub mod block;
pub mod blockchain;
pub mod keyset;
pub mod transaction;

pub use block::Block;
pub use blockchain::BlockChain;
pub use keyset::KeySet;
pub use transaction::{Transaction, TxnInput, TxnOutput};

/// The fixed bonus paid by every block's miner transaction
pub const MINING_REWARD: u64 = 10;
