//! ECDSA P-256 public keys and key identifiers

use crate::{PermissionError, Result};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a key identifier derived from a public key
pub const KEY_ID_LEN: usize = 20;

/// Validated P-256 public key stored as an uncompressed SEC1 point
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct EccPublicKey(Vec<u8>);

impl EccPublicKey {
    /// Decode from SEC1 bytes (compressed or uncompressed)
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        let key = p256::PublicKey::from_sec1_bytes(bytes)
            .map_err(|e| PermissionError::invalid_data(format!("Invalid P-256 point: {e}")))?;
        Ok(Self::from_p256(&key))
    }

    /// Wrap a decoded P-256 key
    pub fn from_p256(key: &p256::PublicKey) -> Self {
        Self(key.to_encoded_point(false).as_bytes().to_vec())
    }

    /// Decode a DER SubjectPublicKeyInfo
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        let key = p256::PublicKey::from_public_key_der(der)
            .map_err(|e| PermissionError::invalid_data(format!("Invalid public key DER: {e}")))?;
        Ok(Self::from_p256(&key))
    }

    /// Decode a PEM `PUBLIC KEY` block
    ///
    /// Lines are trimmed first so PEM embedded in indented XML still decodes.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let normalized = pem
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let key = p256::PublicKey::from_public_key_pem(&normalized)
            .map_err(|e| PermissionError::invalid_data(format!("Invalid public key PEM: {e}")))?;
        Ok(Self::from_p256(&key))
    }

    /// Encode as a PEM `PUBLIC KEY` block
    pub fn to_pem(&self) -> Result<String> {
        self.to_p256()?
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| PermissionError::crypto(format!("PEM encoding failed: {e}")))
    }

    /// Decode into a P-256 key
    pub fn to_p256(&self) -> Result<p256::PublicKey> {
        p256::PublicKey::from_sec1_bytes(&self.0)
            .map_err(|e| PermissionError::invalid_data(format!("Invalid P-256 point: {e}")))
    }

    /// Uncompressed SEC1 bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key identifier: leading bytes of the SHA-256 of the public point
    pub fn key_id(&self) -> Vec<u8> {
        let digest = Sha256::digest(&self.0);
        digest[..KEY_ID_LEN].to_vec()
    }
}

impl TryFrom<Vec<u8>> for EccPublicKey {
    type Error = PermissionError;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Self::from_sec1_bytes(&bytes)
    }
}

impl From<EccPublicKey> for Vec<u8> {
    fn from(key: EccPublicKey) -> Self {
        key.0
    }
}

impl fmt::Debug for EccPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EccPublicKey({})", hex::encode(&self.0))
    }
}

/// Public key paired with its key identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Key identifier
    pub key_id: Vec<u8>,
    /// Public key
    pub public_key: EccPublicKey,
}

impl KeyInfo {
    /// Key info with the identifier derived from the key
    pub fn new(public_key: EccPublicKey) -> Self {
        Self {
            key_id: public_key.key_id(),
            public_key,
        }
    }

    /// Key info with an explicit identifier
    pub fn with_key_id(public_key: EccPublicKey, key_id: Vec<u8>) -> Self {
        Self { key_id, public_key }
    }

    /// Decode a PEM public key and derive its identifier
    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self::new(EccPublicKey::from_pem(pem)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    fn random_key() -> EccPublicKey {
        let signing = SigningKey::random(&mut OsRng);
        EccPublicKey::from_p256(&p256::PublicKey::from(signing.verifying_key()))
    }

    #[test]
    fn test_pem_survives_indentation() {
        let key = random_key();
        let pem = key.to_pem().unwrap();
        let indented: String = pem.lines().map(|l| format!("        {l}\n")).collect();
        assert_eq!(EccPublicKey::from_pem(&indented).unwrap(), key);
    }

    #[test]
    fn test_garbage_pem_is_invalid_data() {
        let err = EccPublicKey::from_pem("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----")
            .unwrap_err();
        assert!(matches!(err, PermissionError::InvalidData { .. }));
    }

    #[test]
    fn test_key_id_is_stable() {
        let key = random_key();
        let info = KeyInfo::new(key.clone());
        assert_eq!(info.key_id.len(), KEY_ID_LEN);
        assert_eq!(info.key_id, key.key_id());
    }

    #[test]
    fn test_deserialize_rejects_bad_point() {
        let bytes = bincode::serialize(&vec![4u8; 65]).unwrap();
        assert!(bincode::deserialize::<EccPublicKey>(&bytes).is_err());
    }
}
