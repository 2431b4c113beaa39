//! Palisade core
//!
//! Data model, error taxonomy and external capability traits for the Palisade
//! permission engine: the piece of a peer-to-peer bus that lets a security
//! manager claim a peer application and then govern what it may do.
//!
//! - [`types`]: rules, manifests, policies, peers, trust anchors, state
//! - [`errors`]: [`PermissionError`], shared by every crate in the workspace
//! - [`effects`]: signer, verifier, hasher, transport and key store traits
//! - [`wire`]: bus interface/member/property/error names and message arguments
//! - [`config`]: [`SecurityConfig`]

pub mod config;
pub mod effects;
pub mod errors;
pub mod serialization;
pub mod types;
pub mod wire;

pub use config::{PalisadeConfig, SecurityConfig};
pub use effects::{BusTransport, Hasher, KeyStore, Signer, Verifier};
pub use errors::{PermissionError, Result, SchemaViolation, ViolationKind};
pub use types::*;
pub use wire::{ArgReader, MsgArg, RpcError};
