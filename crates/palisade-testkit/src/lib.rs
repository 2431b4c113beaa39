//! Palisade Testing Infrastructure
//!
//! Real P-256 keys and rcgen-issued X.509 chains, sample documents, and a
//! loopback transport that connects a claim proxy to an in-process managed
//! application.
//!
//! ```rust,no_run
//! use palisade_testkit::SecurityScenario;
//!
//! let scenario = SecurityScenario::new();
//! scenario.claim_locally();
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod certificates;
pub mod fixtures;
pub mod keys;
pub mod samples;
pub mod transport;

pub use certificates::{next_serial, AuthorityFixture, IssuedUsage};
pub use fixtures::SecurityScenario;
pub use keys::{KeyTestFixture, MemoryKeyStore};
pub use samples::{observe_policy, MANIFEST_TEMPLATE, SECOND_TEMPLATE};
pub use transport::{LoopbackTransport, RecordedCall, UnreachableTransport};

/// Install a test subscriber honouring `RUST_LOG`; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
