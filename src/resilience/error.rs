//! Command outcome errors.

use thiserror::Error;

/// Why a protected call did not produce a value.
///
/// The first three variants are produced by the engine itself; `Operation`
/// carries the wrapped operation's own error unchanged.
#[derive(Debug, Error)]
pub enum CommandError<E> {
    /// The circuit is open; the operation was not attempted.
    #[error("OpenCircuitError")]
    OpenCircuit,

    /// The in-flight ceiling was reached; the operation was not attempted.
    #[error("CommandRejected")]
    Rejected,

    /// The deadline elapsed before the operation completed.
    #[error("CommandTimeOut")]
    TimedOut,

    /// The operation failed on its own.
    #[error("{0}")]
    Operation(E),
}

impl<E> CommandError<E> {
    pub fn is_open_circuit(&self) -> bool {
        matches!(self, CommandError::OpenCircuit)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, CommandError::Rejected)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::TimedOut)
    }

    /// The operation's own error, if that is what this is.
    pub fn into_operation(self) -> Option<E> {
        match self {
            CommandError::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn operation(&self) -> Option<&E> {
        match self {
            CommandError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid operation identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("operation group name must not be empty")]
    EmptyGroup,

    #[error("operation name must not be empty")]
    EmptyName,
}
