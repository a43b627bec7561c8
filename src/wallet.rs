//! Peer identity and the local wallet.
//!
//! A peer's identity *is* its RSA public key — unlike the teacher's
//! ECDSA+RIPEMD160 address scheme, NoobCash has no separate address space.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::CryptoProvider;
use crate::error::CryptoError;

pub type Hash256 = [u8; 32];

/// An RSA public key in PKCS#1 DER form. Doubles as a peer's network identity.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

/// An RSA private key in PKCS#1 DER form. Never serialized over the wire.
#[derive(Clone, Serialize, Deserialize)]
pub struct PrivateKey(pub Vec<u8>);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0.len().min(8);
        write!(f, "PublicKey({}…, {} bytes)", hex::encode(&self.0[..n]), self.0.len())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(<redacted>, {} bytes)", self.0.len())
    }
}

/// A peer's keypair plus a cached balance. The balance is a view over the
/// peer's [`crate::utxo::UtxoLedger`] entry and is kept in sync by whichever
/// code path applies a transaction (see `crate::state`).
#[derive(Debug, Clone)]
pub struct Wallet {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
    pub balance: i64,
}

impl Wallet {
    /// Generates a fresh keypair through the given crypto provider.
    pub fn generate(crypto: &dyn CryptoProvider) -> Result<Self, CryptoError> {
        let (public_key, private_key) = crypto.keygen()?;
        Ok(Self { public_key, private_key, balance: 0 })
    }
}
