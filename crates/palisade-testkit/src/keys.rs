//! Key fixtures and an in-memory key store

use palisade_core::{EccPublicKey, KeyInfo, KeyStore, Result, Signer};
use palisade_trust::P256Signer;
use rcgen::KeyPair;
use std::sync::Arc;
use uuid::Uuid;

/// P-256 key usable both for rcgen certificates and as a [`Signer`]
pub struct KeyTestFixture {
    key_pair: KeyPair,
    signer: Arc<P256Signer>,
}

impl KeyTestFixture {
    /// Fresh random key
    pub fn generate() -> Self {
        let key_pair = KeyPair::generate().unwrap();
        let signer = P256Signer::from_pkcs8_der(&key_pair.serialize_der()).unwrap();
        Self {
            key_pair,
            signer: Arc::new(signer),
        }
    }

    /// rcgen key pair for certificate generation
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Signer over this key
    pub fn signer(&self) -> Arc<P256Signer> {
        self.signer.clone()
    }

    /// Public key
    pub fn public_key(&self) -> EccPublicKey {
        self.signer.public_key()
    }

    /// Public key with its derived key id
    pub fn key_info(&self) -> KeyInfo {
        self.signer.key_info()
    }

    /// PKCS#8 PEM of the private key
    pub fn private_key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }
}

impl std::fmt::Debug for KeyTestFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyTestFixture")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Key store holding one key pair and GUID in memory
#[derive(Debug, Clone)]
pub struct MemoryKeyStore {
    signer: Arc<P256Signer>,
    guid: Uuid,
}

impl MemoryKeyStore {
    /// Store over `key`
    pub fn new(key: &KeyTestFixture) -> Self {
        Self {
            signer: key.signer(),
            guid: Uuid::new_v4(),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn local_signer(&self) -> Result<Arc<dyn Signer>> {
        Ok(self.signer.clone())
    }

    fn local_guid(&self) -> Result<Uuid> {
        Ok(self.guid)
    }
}
