//! ECDSA P-256 and SHA-256 implementations of the crypto capability traits

use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;
use palisade_core::{EccPublicKey, Hasher, PermissionError, Result, Signer, Verifier};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Signer over an in-memory P-256 private key
#[derive(Clone)]
pub struct P256Signer {
    key: SigningKey,
}

impl P256Signer {
    /// Fresh random key
    pub fn generate() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Decode a PKCS#8 DER private key
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let key = SigningKey::from_pkcs8_der(der)
            .map_err(|e| PermissionError::invalid_data(format!("Invalid private key DER: {e}")))?;
        Ok(Self { key })
    }

    /// Decode a PKCS#8 `PRIVATE KEY` PEM block
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let normalized = pem
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let key = SigningKey::from_pkcs8_pem(&normalized)
            .map_err(|e| PermissionError::invalid_data(format!("Invalid private key PEM: {e}")))?;
        Ok(Self { key })
    }
}

impl std::fmt::Debug for P256Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("P256Signer")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl Signer for P256Signer {
    fn public_key(&self) -> EccPublicKey {
        EccPublicKey::from_p256(&p256::PublicKey::from(self.key.verifying_key()))
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signature: Signature = self
            .key
            .try_sign(data)
            .map_err(|e| PermissionError::crypto(format!("ECDSA signing failed: {e}")))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

/// Verifier for DER or fixed-width P-256 signatures
#[derive(Debug, Clone, Copy, Default)]
pub struct P256Verifier;

impl Verifier for P256Verifier {
    fn verify(&self, data: &[u8], signature: &[u8], public_key: &EccPublicKey) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(public_key.as_bytes()) else {
            return false;
        };
        let signature = match Signature::from_der(signature) {
            Ok(signature) => signature,
            Err(_) => match Signature::from_slice(signature) {
                Ok(signature) => signature,
                Err(_) => return false,
            },
        };
        key.verify(data, &signature).is_ok()
    }
}

/// SHA-256 hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }
}
