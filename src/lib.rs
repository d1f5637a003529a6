//! # Ferrocoin - a peer-to-peer cryptocurrency node
//!
//! Each node participates in an unpermissioned network that collectively
//! maintains an append-only sequence of proof-of-work blocks carrying signed
//! value-transfer transactions. Nodes mine independently, gossip blocks and
//! transactions over TCP, converge on the longest valid chain, and expose an
//! interactive wallet to the operator. Everything is memory-resident: chains
//! and keys do not survive the process.
//!
//! ## How the code is organized
//! - `core/`: blocks, transactions, the unspent-output index, chain rules
//! - `state/`: the locked node state shared by every thread, and the miner
//! - `network/`: wire messages, peer connections, the event dispatcher
//! - `wallet/`: key identity and the in-memory wallet
//! - `utils/`: hashing, signatures, canonical serialization
//! - `cli/`: flags and the operator console
//!
//! ## Threading at a glance
//! The miner, one reader per peer connection, the accept loop, the network
//! event dispatcher, and the operator console run as separate threads. All
//! of them mutate the node through `NodeState`'s locked API; the dispatcher
//! additionally serialises every network-originated mutation into arrival
//! order.

pub mod cli;
pub mod core;
pub mod error;
pub mod network;
pub mod state;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use cli::Opt;
pub use core::{Block, BlockChain, KeySet, Transaction, TxnInput, TxnOutput, MINING_REWARD};
pub use error::{NodeError, Result, ValidationError};
pub use network::{NetEvent, NetworkMessage, NodeHandle, PeerNetwork};
pub use state::{mine_for_gold, NodeState, StateSnapshot};
pub use wallet::{Keypair, PublicKey, Wallet};
