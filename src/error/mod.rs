//! Error handling for the node
//!
//! This module provides the error types for all node operations.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Error types for node operations
#[derive(Debug, Clone)]
pub enum NodeError {
    /// Socket read/write/accept failures
    Network(String),
    /// The remote side closed the connection cleanly
    Disconnected,
    /// Malformed or oversized wire frames
    Codec(String),
    /// Well-formed message of the wrong kind for its context
    Protocol(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Block or transaction rejected by a consensus rule
    Validation(ValidationError),
    /// Wallet operation errors
    Wallet(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
}

/// The consensus rules a transaction can break when applied to a key set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// An input signature does not verify against its key
    SignatureInvalid,
    /// An input names a key with no unspent output
    MissingInput,
    /// An input's prev_hash does not match the unspent output's transaction
    StaleInput,
    /// An output names a key that already has an unspent output
    OutputKeyReused,
    /// Input total does not equal output total
    AmountMismatch,
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Network(msg) => write!(f, "Network error: {msg}"),
            NodeError::Disconnected => write!(f, "Connection closed by peer"),
            NodeError::Codec(msg) => write!(f, "Codec error: {msg}"),
            NodeError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            NodeError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            NodeError::Validation(kind) => write!(f, "Validation error: {kind}"),
            NodeError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            NodeError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            NodeError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::SignatureInvalid => write!(f, "input signature invalid"),
            ValidationError::MissingInput => write!(f, "input references no unspent output"),
            ValidationError::StaleInput => write!(f, "input references a superseded output"),
            ValidationError::OutputKeyReused => {
                write!(f, "output key already has an unspent output")
            }
            ValidationError::AmountMismatch => {
                write!(f, "input total does not match output total")
            }
        }
    }
}

impl std::error::Error for NodeError {}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

impl From<ValidationError> for NodeError {
    fn from(err: ValidationError) -> Self {
        NodeError::Validation(err)
    }
}
