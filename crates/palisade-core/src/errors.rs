//! Unified error taxonomy for Palisade
//!
//! Every validator, converter, configurator and proxy operation reports failures
//! through [`PermissionError`]. Remote peers report failures by error name; those
//! names are translated back into the same variants so callers never need to
//! distinguish a local rejection from a remote one.

use crate::wire::{error_names, RpcError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which structural rule a malformed XML document or decoded value broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// The document could not be tokenized
    MalformedXml,
    /// An element had an unexpected name
    ElementName,
    /// An element had the wrong number of children
    ChildCount,
    /// A name or value that must be unique appeared twice
    Duplicate,
    /// A name did not match its pattern
    InvalidName,
    /// An enumerated value was outside its allowed set
    InvalidValue,
    /// A numeric field did not parse or was out of range
    InvalidNumber,
    /// Base64 content was malformed or empty
    InvalidBase64,
    /// An element carried annotations where none are allowed
    UnexpectedAnnotation,
    /// Peers within an ACL contradict each other
    PeerConflict,
    /// An object identifier did not match the expected algorithm
    InvalidOid,
    /// A collection that must be non-empty was empty
    Empty,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::MalformedXml => "malformed xml",
            ViolationKind::ElementName => "element name",
            ViolationKind::ChildCount => "child count",
            ViolationKind::Duplicate => "duplicate",
            ViolationKind::InvalidName => "invalid name",
            ViolationKind::InvalidValue => "invalid value",
            ViolationKind::InvalidNumber => "invalid number",
            ViolationKind::InvalidBase64 => "invalid base64",
            ViolationKind::UnexpectedAnnotation => "unexpected annotation",
            ViolationKind::PeerConflict => "peer conflict",
            ViolationKind::InvalidOid => "invalid oid",
            ViolationKind::Empty => "empty",
        };
        f.write_str(label)
    }
}

/// A schema violation found while validating XML or decoded rules/policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct SchemaViolation {
    /// Rule that was broken
    pub kind: ViolationKind,
    /// Human readable context
    pub message: String,
}

impl SchemaViolation {
    /// Create a new schema violation
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Error type for all Palisade operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PermissionError {
    /// XML or decoded value did not conform to its schema
    #[error("Schema violation: {0}")]
    SchemaViolation(SchemaViolation),

    /// Well-formed but semantically wrong input
    #[error("Invalid data: {message}")]
    InvalidData {
        /// What was wrong with the input
        message: String,
    },

    /// Group id was not exactly sixteen bytes
    #[error("Invalid GUID: expected 16 bytes, got {length}")]
    InvalidGuid {
        /// Length that was supplied
        length: usize,
    },

    /// Policy serial number did not increase
    #[error("Policy not newer: {message}")]
    PolicyNotNewer {
        /// Installed versus offered serial numbers
        message: String,
    },

    /// A certificate with the same serial and issuer is already installed
    #[error("Duplicate certificate: {message}")]
    DuplicateCertificate {
        /// Certificate description
        message: String,
    },

    /// Referenced certificate is not installed
    #[error("Certificate not found: {message}")]
    CertificateNotFound {
        /// Certificate description
        message: String,
    },

    /// Certificate is malformed or does not belong to the expected subject
    #[error("Invalid certificate: {message}")]
    InvalidCertificate {
        /// What was wrong with the certificate
        message: String,
    },

    /// Certificate usage does not match the operation consuming it
    #[error("Invalid certificate usage: {message}")]
    InvalidCertificateUsage {
        /// Expected versus declared usage
        message: String,
    },

    /// Manifest thumbprint or signature does not match
    #[error("Digest mismatch: {message}")]
    DigestMismatch {
        /// What failed to match
        message: String,
    },

    /// Caller is not authorized for the operation
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Why access was refused
        message: String,
    },

    /// A management session is already open
    #[error("Management already started")]
    ManagementAlreadyStarted,

    /// No management session is open
    #[error("Management not started")]
    ManagementNotStarted,

    /// Security is not enabled on the local bus attachment
    #[error("Feature not available: {message}")]
    FeatureNotAvailable {
        /// Which feature was unavailable
        message: String,
    },

    /// Transport failure or unrecognized remote error
    #[error("RPC failure ({name}): {description}")]
    RpcFailure {
        /// Remote error name, or the transport error name
        name: String,
        /// Remote description
        description: String,
    },

    /// Cryptographic primitive failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Failure detail
        message: String,
    },

    /// Canonical encoding failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Failure detail
        message: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Config error: {message}")]
    Config {
        /// Failure detail
        message: String,
    },
}

impl PermissionError {
    /// Create a schema violation error
    pub fn schema(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self::SchemaViolation(SchemaViolation::new(kind, message))
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a policy not newer error from the installed and offered serials
    pub fn policy_not_newer(installed: u32, offered: u32) -> Self {
        Self::PolicyNotNewer {
            message: format!("installed serial {installed}, offered {offered}"),
        }
    }

    /// Create a duplicate certificate error
    pub fn duplicate_certificate(message: impl Into<String>) -> Self {
        Self::DuplicateCertificate {
            message: message.into(),
        }
    }

    /// Create a certificate not found error
    pub fn certificate_not_found(message: impl Into<String>) -> Self {
        Self::CertificateNotFound {
            message: message.into(),
        }
    }

    /// Create an invalid certificate error
    pub fn invalid_certificate(message: impl Into<String>) -> Self {
        Self::InvalidCertificate {
            message: message.into(),
        }
    }

    /// Create an invalid certificate usage error
    pub fn invalid_certificate_usage(message: impl Into<String>) -> Self {
        Self::InvalidCertificateUsage {
            message: message.into(),
        }
    }

    /// Create a digest mismatch error
    pub fn digest_mismatch(message: impl Into<String>) -> Self {
        Self::DigestMismatch {
            message: message.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a feature not available error
    pub fn feature_not_available(message: impl Into<String>) -> Self {
        Self::FeatureNotAvailable {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error is a schema violation of the given kind
    pub fn is_schema(&self, kind: ViolationKind) -> bool {
        matches!(self, Self::SchemaViolation(v) if v.kind == kind)
    }

    /// Translate a remote error reply into the typed taxonomy
    ///
    /// Known security error names map to their variant. Anything else falls
    /// back to [`PermissionError::RpcFailure`] carrying the remote description.
    pub fn from_remote(err: RpcError) -> Self {
        let RpcError { name, description } = err;
        match name.as_str() {
            error_names::PERMISSION_DENIED => Self::PermissionDenied {
                message: description,
            },
            error_names::INVALID_CERTIFICATE => Self::InvalidCertificate {
                message: description,
            },
            error_names::INVALID_CERTIFICATE_USAGE => Self::InvalidCertificateUsage {
                message: description,
            },
            error_names::DIGEST_MISMATCH => Self::DigestMismatch {
                message: description,
            },
            error_names::POLICY_NOT_NEWER => Self::PolicyNotNewer {
                message: description,
            },
            error_names::CERTIFICATE_NOT_FOUND => Self::CertificateNotFound {
                message: description,
            },
            error_names::DUPLICATE_CERTIFICATE => Self::DuplicateCertificate {
                message: description,
            },
            error_names::MANAGEMENT_ALREADY_STARTED => Self::ManagementAlreadyStarted,
            error_names::MANAGEMENT_NOT_STARTED => Self::ManagementNotStarted,
            _ => Self::RpcFailure { name, description },
        }
    }

    /// Encode this error as a remote error reply
    pub fn to_remote(&self) -> RpcError {
        let name = match self {
            Self::PermissionDenied { .. } => error_names::PERMISSION_DENIED,
            Self::InvalidCertificate { .. } => error_names::INVALID_CERTIFICATE,
            Self::InvalidCertificateUsage { .. } => error_names::INVALID_CERTIFICATE_USAGE,
            Self::DigestMismatch { .. } => error_names::DIGEST_MISMATCH,
            Self::PolicyNotNewer { .. } => error_names::POLICY_NOT_NEWER,
            Self::CertificateNotFound { .. } => error_names::CERTIFICATE_NOT_FOUND,
            Self::DuplicateCertificate { .. } => error_names::DUPLICATE_CERTIFICATE,
            Self::ManagementAlreadyStarted => error_names::MANAGEMENT_ALREADY_STARTED,
            Self::ManagementNotStarted => error_names::MANAGEMENT_NOT_STARTED,
            Self::RpcFailure { name, description } => {
                return RpcError::new(name.clone(), description.clone())
            }
            _ => error_names::GENERIC_FAILURE,
        };
        RpcError::new(name, self.to_string())
    }
}

impl From<SchemaViolation> for PermissionError {
    fn from(violation: SchemaViolation) -> Self {
        Self::SchemaViolation(violation)
    }
}

/// Standard Result type for Palisade operations
pub type Result<T> = std::result::Result<T, PermissionError>;
