//! Capability-level error type.

use thiserror::Error;

/// Errors raised while resolving or invoking a capability instance.
///
/// An unsuccessful [`InvokeResult`](crate::InvokeResult) is *not* an error:
/// it is a normal answer from the remote side. These variants cover the cases
/// where no answer could be obtained at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// No enabled instance of the requested type is registered.
    #[error("no enabled capability instance found for type: {capability_type}")]
    NoInstance { capability_type: String },

    /// An explicitly named instance does not exist.
    #[error("capability instance '{0}' not found")]
    UnknownInstance(String),

    /// The instance does not advertise the requested action.
    #[error("unsupported action '{action}' for instance '{instance}'")]
    UnsupportedAction { instance: String, action: String },

    /// Network or process failure talking to an external executor.
    #[error("transport error: {0}")]
    Transport(String),

    /// The executor answered with something that could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
