//! In-process transports
//!
//! [`LoopbackTransport`] connects a proxy straight to a [`ManagedApplication`],
//! presenting a fixed set of caller credentials on every call.

use palisade_configurator::{CallerCredentials, ManagedApplication};
use palisade_core::wire::error_names;
use palisade_core::{BusTransport, MsgArg, RpcError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Interface name
    pub interface: String,
    /// Member or property name
    pub member: String,
    /// Timeout the caller passed
    pub timeout: Duration,
}

/// Transport delivering calls to an in-process managed application
pub struct LoopbackTransport {
    application: Arc<ManagedApplication>,
    caller: Mutex<CallerCredentials>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl LoopbackTransport {
    /// Deliver calls to `application` as `caller`
    pub fn new(application: Arc<ManagedApplication>, caller: CallerCredentials) -> Self {
        Self {
            application,
            caller: Mutex::new(caller),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Present different credentials from now on
    pub fn set_caller(&self, caller: CallerCredentials) {
        *self.caller.lock() = caller;
    }

    /// Calls delivered so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn record(&self, interface: &str, member: &str, timeout: Duration) -> CallerCredentials {
        self.calls.lock().push(RecordedCall {
            interface: interface.to_string(),
            member: member.to_string(),
            timeout,
        });
        self.caller.lock().clone()
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

impl BusTransport for LoopbackTransport {
    fn method_call(
        &self,
        interface: &str,
        member: &str,
        args: Vec<MsgArg>,
        timeout: Duration,
    ) -> Result<Vec<MsgArg>, RpcError> {
        let caller = self.record(interface, member, timeout);
        self.application
            .handle_method_call(&caller, interface, member, &args)
    }

    fn get_property(
        &self,
        interface: &str,
        property: &str,
        timeout: Duration,
    ) -> Result<MsgArg, RpcError> {
        let caller = self.record(interface, property, timeout);
        self.application.get_property(&caller, interface, property)
    }
}

/// Transport whose peer never answers
#[derive(Debug, Default)]
pub struct UnreachableTransport {
    attempts: Mutex<usize>,
}

impl UnreachableTransport {
    /// Number of calls attempted
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    fn timeout(&self, interface: &str, member: &str) -> RpcError {
        *self.attempts.lock() += 1;
        RpcError::new(error_names::TIMEOUT, format!("{interface}.{member} timed out"))
    }
}

impl BusTransport for UnreachableTransport {
    fn method_call(
        &self,
        interface: &str,
        member: &str,
        _args: Vec<MsgArg>,
        _timeout: Duration,
    ) -> Result<Vec<MsgArg>, RpcError> {
        Err(self.timeout(interface, member))
    }

    fn get_property(
        &self,
        interface: &str,
        property: &str,
        _timeout: Duration,
    ) -> Result<MsgArg, RpcError> {
        Err(self.timeout(interface, property))
    }
}
