// SPDX-License-Identifier: MPL-2.0
use crate::transport::TransportError;
use core::fmt;

/// Out of memory.
pub const ENOMEM: i32 = 12;
/// I/O error.
pub const EIO: i32 = 5;
/// Invalid argument.
pub const EINVAL: i32 = 22;
/// Interrupted call.
pub const EINTR: i32 = 4;

/// Errors returned through the device operation table.
///
/// The variants are split so that a caller can tell "the device did not respond" (`Io`,
/// `Transport`) apart from "the device responded but the data cannot be trusted"
/// (`BadTableFormat`, `UnsupportedVersion`, `BlockCountMismatch`, `TooManyPairs`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// A command, completion or data buffer could not be allocated.
    NoMemory,
    /// The transport failed the round-trip; reported as a plain I/O error.
    Io(TransportError),
    /// The transport failed the round-trip; its own status is handed back unchanged.
    Transport(TransportError),
    /// The bad block table does not start with the `BBLT` tag.
    BadTableFormat {
        /// Tag bytes the device returned
        tag: [u8; 4],
    },
    /// The bad block table version is not one we understand.
    UnsupportedVersion(u16),
    /// The bad block table describes a different number of blocks than the geometry implies.
    BlockCountMismatch {
        /// Count computed from device geometry
        expected: u32,
        /// Count reported by the device
        reported: u32,
    },
    /// An identity group reports more MLC pairs than the embedded table can hold.
    TooManyPairs {
        /// Pair count reported by the device
        count: u16,
        /// Fixed capacity of the pairing table
        capacity: usize,
    },
    /// The L2P update callback rejected a chunk.
    Interrupted,
    /// The caller handed in something the shim cannot act on.
    InvalidArgument,
}

/// Result alias used by every fallible operation in this crate.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Kernel-style negative status code for the generic layer.
    pub fn errno(&self) -> i32 {
        match self {
            Error::NoMemory => -ENOMEM,
            Error::Io(_) => -EIO,
            Error::Transport(e) => e.errno(),
            Error::BadTableFormat { .. }
            | Error::UnsupportedVersion(_)
            | Error::BlockCountMismatch { .. }
            | Error::TooManyPairs { .. }
            | Error::InvalidArgument => -EINVAL,
            Error::Interrupted => -EINTR,
        }
    }

    /// True when the device answered but its data failed validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::BadTableFormat { .. }
                | Error::UnsupportedVersion(_)
                | Error::BlockCountMismatch { .. }
                | Error::TooManyPairs { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoMemory => write!(f, "out of memory"),
            Error::Io(e) => write!(f, "I/O error ({})", e),
            Error::Transport(e) => write!(f, "transport error ({})", e),
            Error::BadTableFormat { tag } => write!(
                f,
                "bbt format mismatch (tag {:02X} {:02X} {:02X} {:02X})",
                tag[0], tag[1], tag[2], tag[3]
            ),
            Error::UnsupportedVersion(v) => write!(f, "bbt version {} not supported", v),
            Error::BlockCountMismatch { expected, reported } => write!(
                f,
                "bbt unexpected blocks returned ({}!={})",
                reported, expected
            ),
            Error::TooManyPairs { count, capacity } => write!(
                f,
                "number of MLC pairs not supported ({} > {})",
                count, capacity
            ),
            Error::Interrupted => write!(f, "interrupted by L2P update callback"),
            Error::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

impl From<zerocopy::AllocError> for Error {
    fn from(_: zerocopy::AllocError) -> Self {
        Error::NoMemory
    }
}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Error::NoMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_classes() {
        assert_eq!(Error::NoMemory.errno(), -ENOMEM);
        assert_eq!(Error::Io(TransportError::Status(0x4004)).errno(), -EIO);
        assert_eq!(Error::Interrupted.errno(), -EINTR);
        assert_eq!(Error::UnsupportedVersion(2).errno(), -EINVAL);
        assert_eq!(
            Error::Transport(TransportError::Status(0x0002)).errno(),
            0x0002
        );
    }

    #[test]
    fn validation_is_distinct_from_io() {
        assert!(Error::BadTableFormat { tag: *b"XXXX" }.is_validation());
        assert!(!Error::Io(TransportError::Timeout).is_validation());
        assert!(!Error::Interrupted.is_validation());
    }
}
