//! Error kinds surfaced by the core, and the wire-level decode error they
//! fold in at the boundary. See spec §7.

use std::io;
use thiserror::Error;

/// A failure while decoding a raw datagram into a [`crate::types::Message`].
///
/// Kept separate from [`Error`] so unit tests can assert on the precise
/// wire-level failure (underflow vs. bad pointer vs. oversize label)
/// without matching through the coarser public enum.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("buffer underflow: {0}")]
    Underflow(#[from] io::Error),

    #[error("compressed name pointer at offset {offset} does not resolve to an earlier label")]
    BadPointer { offset: usize },

    #[error("label longer than 63 octets")]
    LabelTooLong,

    #[error("name longer than 255 octets")]
    NameTooLong,

    #[error("name was not terminated before the end of the buffer")]
    UnterminatedName,

    #[error("message is larger than the maximum of 65536 octets")]
    MessageTooLarge,

    #[error("unexpected {0} trailing bytes after parsing the message")]
    TrailingBytes(usize),
}

/// Errors surfaced by the core to its callers (registration, resolution,
/// dispatch). See spec §7 for the policy governing each kind.
#[derive(Error, Debug)]
pub enum Error {
    /// A datagram failed to decode. Always message-scoped: the offending
    /// datagram is dropped and logged, this error never outlives the
    /// receive task that observed it.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] DecodeError),

    /// Registration could not proceed: the instance name collides (in the
    /// cache or the local service table) and renaming was disallowed, or
    /// probing observed a conflicting SRV.
    #[error("service name conflict: {0}")]
    Conflict(String),

    /// The resolver's timeout elapsed without fully populating the
    /// service. Returned as an absent result, not as an exceptional path.
    #[error("resolution timed out before the service was fully populated")]
    Unresolved,

    /// Probing or announcing was attempted for a service whose hostname or
    /// attributes have not been set by the caller.
    #[error("service is missing hostname or attributes required to probe/announce")]
    UnknownAddressing,

    /// The operation was aborted because the engine is shutting down.
    #[error("engine is shutting down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, Error>;
