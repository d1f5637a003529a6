use crate::error::Result;
use crate::utils::{ecdsa_p256_sha256_sign_digest, new_key_pair, public_key_from_pkcs8};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ECDSA P-256 public key, identified by its raw point encoding.
///
/// Two keys are equal iff their encodings are byte-identical, which makes the
/// key usable directly as a map key for the unspent-output index.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: Vec<u8>) -> PublicKey {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Short hex prefix for logs and console output
    pub fn fingerprint(&self) -> String {
        let hex = HEXLOWER.encode(self.0.as_slice());
        hex.chars().take(8).collect()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", self.fingerprint())
    }
}

/// A private key (PKCS#8 document) together with its derived public key
#[derive(Clone)]
pub struct Keypair {
    pkcs8: Vec<u8>,
    public: PublicKey,
}

impl Keypair {
    pub fn generate() -> Result<Keypair> {
        let pkcs8 = new_key_pair()?;
        let public = PublicKey(public_key_from_pkcs8(&pkcs8)?);
        Ok(Keypair { pkcs8, public })
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        ecdsa_p256_sha256_sign_digest(&self.pkcs8, message)
    }
}
