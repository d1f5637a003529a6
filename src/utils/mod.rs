//! Utility functions and helpers
//!
//! This module contains cryptographic utilities and the canonical
//! serialization helpers used throughout the node.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, new_key_pair,
    public_key_from_pkcs8, sha256_digest,
};

pub use serialization::{deserialize, serialize};
