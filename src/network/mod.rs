//! Peer-to-peer networking
//!
//! This module handles communication between nodes: the typed wire messages
//! and their framing, persistent peer connections, and the server that
//! linearises all network events onto a single dispatcher thread.

pub mod message;
pub mod peer;
pub mod server;

pub use message::{NetEvent, NetworkMessage};
pub use peer::PeerConn;
pub use server::{NodeHandle, PeerNetwork};
