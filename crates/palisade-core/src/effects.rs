//! External capability traits
//!
//! The security engine never implements transport, key storage or the
//! cryptographic primitives itself. Callers inject them through these traits.
//!
//! # Effect Classification
//!
//! - **Crypto** ([`Signer`], [`Verifier`], [`Hasher`]): ECDSA P-256 / SHA-256,
//!   implemented in `palisade-trust`
//! - **Transport** ([`BusTransport`]): blocking request/response against one
//!   remote peer
//! - **Storage** ([`KeyStore`]): the local peer's key pair and GUID

use crate::types::{EccPublicKey, KeyInfo};
use crate::wire::{MsgArg, RpcError};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Produces ECDSA P-256 signatures with one private key
pub trait Signer: Send + Sync {
    /// Public half of the signing key
    fn public_key(&self) -> EccPublicKey;

    /// Sign `data` (hashed with SHA-256 by the signer), returning a DER signature
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Public key with its derived key id
    fn key_info(&self) -> KeyInfo {
        KeyInfo::new(self.public_key())
    }
}

/// Checks ECDSA P-256 signatures
pub trait Verifier: Send + Sync {
    /// Whether `signature` is valid for `data` under `public_key`
    fn verify(&self, data: &[u8], signature: &[u8], public_key: &EccPublicKey) -> bool;
}

/// SHA-256 digests
pub trait Hasher: Send + Sync {
    /// Digest of `data`
    fn hash(&self, data: &[u8]) -> Vec<u8>;
}

/// Blocking RPC against one remote peer
///
/// Each call is one request/response round trip. The timeout is passed
/// through untouched; enforcing it is the transport's job.
pub trait BusTransport: Send + Sync {
    /// Invoke `interface.member` with `args`
    fn method_call(
        &self,
        interface: &str,
        member: &str,
        args: Vec<MsgArg>,
        timeout: Duration,
    ) -> std::result::Result<Vec<MsgArg>, RpcError>;

    /// Read `interface.property`
    fn get_property(
        &self,
        interface: &str,
        property: &str,
        timeout: Duration,
    ) -> std::result::Result<MsgArg, RpcError>;
}

/// Source of the local peer's own key pair and GUID
pub trait KeyStore: Send + Sync {
    /// Signer over the local peer's private key
    fn local_signer(&self) -> Result<Arc<dyn Signer>>;

    /// Local peer GUID
    fn local_guid(&self) -> Result<Uuid>;
}
