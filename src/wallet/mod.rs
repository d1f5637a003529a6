//! Wallet management and key identity
//!
//! This module handles keypair generation, the public-key identity type used
//! throughout the node, and the in-memory wallet.

pub mod keys;
#[allow(clippy::module_inception)]
pub mod wallet;

pub use keys::{Keypair, PublicKey};
pub use wallet::Wallet;
