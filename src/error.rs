//! Unified error types for the brewctl core.
//!
//! Follows embedded practice: small per-subsystem enums that every
//! fallible path can convert into, keeping the control loops' error
//! handling uniform. None of these are fatal to the process — the run
//! is the smallest cancellable unit, and every loop re-checks its run
//! flags each cycle.

use core::fmt;

// ---------------------------------------------------------------------------
// Probe bus errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the 1-Wire probe bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    /// The bus has no driver handle for this address (never detected,
    /// or removed). The reader skips these probes silently.
    NoDevice,
    /// Conversion was triggered but the read failed or timed out.
    /// The reader marks the probe disconnected and carries on.
    ReadFailed,
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDevice => write!(f, "no device on bus"),
            Self::ReadFailed => write!(f, "conversion read failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from the persistent key/value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the backend.
    IoError,
    /// Stored blob failed to deserialize.
    Corrupted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::Corrupted => write!(f, "stored blob corrupted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

/// Failures while handling a command from the request channel.
///
/// These never touch core state; the dispatcher turns them into a
/// `success=false` reply with a human-readable message and the loops
/// keep running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// A required field was missing from the payload.
    MissingField(&'static str),
    /// A field was present but had the wrong JSON type.
    WrongType(&'static str),
    /// A named entity (schedule, …) does not exist.
    NotFound(String),
    /// The command conflicts with the current run state.
    Busy(&'static str),
    /// The command name itself is not recognised.
    UnknownCommand(String),
    /// The platform layer refused the request (recovery boot, …).
    Platform(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "Missing field: {}", field),
            Self::WrongType(msg) => write!(f, "{}", msg),
            Self::NotFound(msg) => write!(f, "{}", msg),
            Self::Busy(msg) => write!(f, "{}", msg),
            Self::UnknownCommand(name) => write!(f, "Unknown command: {}", name),
            Self::Platform(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<StorageError> for CommandError {
    fn from(e: StorageError) -> Self {
        Self::Platform(e.to_string())
    }
}
