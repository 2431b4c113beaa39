//! Palisade proxy
//!
//! [`ClaimProxy`] drives a remote peer's security state machine: claim,
//! identity and manifest updates, policy installation, memberships and the
//! management bracket, plus the property getters and manifest signing helpers
//! a security manager needs alongside them.

#![forbid(unsafe_code)]

pub mod claim_proxy;

pub use claim_proxy::ClaimProxy;
