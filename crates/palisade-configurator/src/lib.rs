//! Palisade configurator
//!
//! The peer side of the permission engine. [`PermissionConfigurator`] holds
//! the local security state; [`ManagedApplication`] serves it to remote
//! security managers through the claimable, managed and application
//! interfaces.

#![forbid(unsafe_code)]

pub mod bus_object;
pub mod configurator;

pub use bus_object::{CallerCredentials, ManagedApplication};
pub use configurator::{ClaimRequest, ConfigurationListener, PermissionConfigurator};
