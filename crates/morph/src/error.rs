//! Error types for the `morph` type engine.
//!
//! Only data-dependent failures live here. Lookup misses are `None` and
//! comparison misses are [`Expand::Different`](crate::Expand::Different);
//! structural misuse of the API is reported through `morph_log::fatal!`.

use morph_mem::AllocError;
use std::fmt;

/// Errors that can occur while building or dispatching over the type graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A node, callable or arena block could not be allocated.
    OutOfMemory {
        /// The requested allocation size in bytes.
        requested: usize,
    },

    /// Invalid alignment specified.
    InvalidAlignment {
        /// The requested alignment.
        alignment: usize,
    },

    /// The member is already part of the species chain.
    DuplicateSpeciesMember,

    /// Appending the member would make an aggregate own itself.
    CyclicType,

    /// The forward-declared identifier already has a source.
    AlreadyDefined,

    /// A type without storage yet was stored by value; refer to it through a
    /// back pointer until it is defined.
    IncompleteType,

    /// The virtual machine has no call slot left.
    CallSlotsExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory { requested } => {
                write!(f, "Out of memory: failed to allocate {requested} bytes")
            }
            Error::InvalidAlignment { alignment } => {
                write!(f, "Invalid alignment: {alignment} is not a power of two")
            }
            Error::DuplicateSpeciesMember => {
                write!(f, "Type is already a member of this species")
            }
            Error::CyclicType => {
                write!(f, "Member would make the type contain itself")
            }
            Error::AlreadyDefined => write!(f, "Identifier is already defined"),
            Error::IncompleteType => {
                write!(f, "Type has no storage layout until its identifier is defined")
            }
            Error::CallSlotsExhausted => {
                write!(f, "Virtual machine has no call slots left")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<AllocError> for Error {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::ZeroSized => Error::OutOfMemory { requested: 0 },
            AllocError::InvalidAlignment { alignment } => Error::InvalidAlignment { alignment },
            AllocError::OutOfMemory { requested } => Error::OutOfMemory { requested },
        }
    }
}

/// Result type for `morph` operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", Error::OutOfMemory { requested: 64 }),
            "Out of memory: failed to allocate 64 bytes"
        );
        assert_eq!(
            format!("{}", Error::InvalidAlignment { alignment: 3 }),
            "Invalid alignment: 3 is not a power of two"
        );
        assert_eq!(
            Error::IncompleteType.to_string(),
            "Type has no storage layout until its identifier is defined"
        );
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(Error::CyclicType, Error::CyclicType);
        assert_ne!(
            Error::OutOfMemory { requested: 8 },
            Error::OutOfMemory { requested: 16 }
        );
    }

    #[test]
    fn test_from_alloc_error() {
        assert_eq!(
            Error::from(AllocError::OutOfMemory { requested: 32 }),
            Error::OutOfMemory { requested: 32 }
        );
        assert_eq!(
            Error::from(AllocError::InvalidAlignment { alignment: 6 }),
            Error::InvalidAlignment { alignment: 6 }
        );
    }
}
