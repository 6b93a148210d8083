//! Failures raised by the legacy compatibility layers themselves.
//!
//! Every variant surfaces to script code as a `TypeError` object; see
//! [`Interpreter::throw_error`](super::Interpreter::throw_error). Exceptions
//! thrown by handler traps or generator bodies never pass through here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LegacyError {
    /// A legacy generator operation was invoked while the generator is running.
    #[error("{operation}: generator is already running")]
    AlreadyRunning { operation: &'static str },

    #[error("{operation} called on incompatible receiver")]
    NotAGenerator { operation: &'static str },

    #[error("yield from closing generator")]
    YieldFromClosingGenerator,

    #[error("{0} requires that the handler be an object")]
    HandlerNotObject(&'static str),

    #[error("Object prototype may only be an Object or null")]
    InvalidPrototype,

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error(
        "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute"
    )]
    DescriptorConflict,

    #[error("{0} must be a function")]
    AccessorNotCallable(&'static str),

    #[error("Property description must be an object")]
    DescriptorNotObject,
}

impl LegacyError {
    /// Name of the error constructor this failure is reported as.
    pub fn error_name(&self) -> &'static str {
        "TypeError"
    }
}
