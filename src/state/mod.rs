//! Shared node state and the miner that works against it
//!
//! The state owns the chains, the mempool, and the wallet; the network
//! dispatcher, the miner, and the operator console all mutate it through its
//! locked API.

pub mod miner;
pub mod node_state;

pub use miner::mine_for_gold;
pub use node_state::{NodeState, StateSnapshot};
