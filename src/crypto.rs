//! Cryptographic primitives behind a capability trait, per the boundary
//! called out in spec.md's design notes ("the crypto scheme is pluggable").
//!
//! The default implementation is RSA-2048 with PKCS#1 v1.5 signatures over a
//! SHA-256 digest, matching the original NoobCash's `rsa`/`Crypto.Signature`
//! usage: the signer hashes the message itself and signs the resulting
//! digest directly, rather than re-hashing inside the signing call.

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::wallet::{Hash256, PrivateKey, PublicKey};

/// Default RSA modulus size for production keys.
pub const RSA_KEY_BITS: usize = 2048;

pub type Signature = Vec<u8>;

/// Capability interface for hashing and signing. Kept as a trait object
/// (rather than a generic parameter threaded through every function) so a
/// `PeerState` can be built once with a provider chosen at startup.
pub trait CryptoProvider: Send + Sync {
    fn sha256(&self, data: &[u8]) -> Hash256;
    fn keygen(&self) -> Result<(PublicKey, PrivateKey), CryptoError>;
    fn sign(&self, key: &PrivateKey, digest: &Hash256) -> Result<Signature, CryptoError>;
    fn verify(&self, key: &PublicKey, digest: &Hash256, signature: &Signature) -> bool;
}

fn sha256_bytes(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn rsa_keygen(bits: usize) -> Result<(PublicKey, PrivateKey), CryptoError> {
    let mut rng = OsRng;
    let private = RsaPrivateKey::new(&mut rng, bits).map_err(|e| CryptoError::KeyGen(e.to_string()))?;
    let public = RsaPublicKey::from(&private);

    let private_der = private.to_pkcs1_der().map_err(|e| CryptoError::Encoding(e.to_string()))?;
    let public_der = public.to_pkcs1_der().map_err(|e| CryptoError::Encoding(e.to_string()))?;

    Ok((PublicKey(public_der.as_bytes().to_vec()), PrivateKey(private_der.as_bytes().to_vec())))
}

fn rsa_sign(key: &PrivateKey, digest: &Hash256) -> Result<Signature, CryptoError> {
    let private =
        RsaPrivateKey::from_pkcs1_der(&key.0).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    private
        .sign(Pkcs1v15Sign::new::<Sha256>(), digest)
        .map_err(|e| CryptoError::Signing(e.to_string()))
}

fn rsa_verify(key: &PublicKey, digest: &Hash256, signature: &Signature) -> bool {
    let public = match RsaPublicKey::from_pkcs1_der(&key.0) {
        Ok(k) => k,
        Err(_) => return false,
    };
    public.verify(Pkcs1v15Sign::new::<Sha256>(), digest, signature).is_ok()
}

/// Production provider: RSA-2048 keys, PKCS#1 v1.5 signatures over SHA-256.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaSha256Provider;

impl CryptoProvider for RsaSha256Provider {
    fn sha256(&self, data: &[u8]) -> Hash256 {
        sha256_bytes(data)
    }

    fn keygen(&self) -> Result<(PublicKey, PrivateKey), CryptoError> {
        rsa_keygen(RSA_KEY_BITS)
    }

    fn sign(&self, key: &PrivateKey, digest: &Hash256) -> Result<Signature, CryptoError> {
        rsa_sign(key, digest)
    }

    fn verify(&self, key: &PublicKey, digest: &Hash256, signature: &Signature) -> bool {
        rsa_verify(key, digest, signature)
    }
}

pub mod test_support {
    use super::*;

    /// Same scheme as [`RsaSha256Provider`] but with a configurable (small)
    /// modulus, so test suites that mint several wallets don't each pay full
    /// RSA-2048 keygen cost.
    #[derive(Debug, Clone, Copy)]
    pub struct SmallRsaProvider {
        pub bits: usize,
    }

    impl Default for SmallRsaProvider {
        fn default() -> Self {
            Self { bits: 512 }
        }
    }

    impl CryptoProvider for SmallRsaProvider {
        fn sha256(&self, data: &[u8]) -> Hash256 {
            sha256_bytes(data)
        }

        fn keygen(&self) -> Result<(PublicKey, PrivateKey), CryptoError> {
            rsa_keygen(self.bits)
        }

        fn sign(&self, key: &PrivateKey, digest: &Hash256) -> Result<Signature, CryptoError> {
            rsa_sign(key, digest)
        }

        fn verify(&self, key: &PublicKey, digest: &Hash256, signature: &Signature) -> bool {
            rsa_verify(key, digest, signature)
        }
    }
}
