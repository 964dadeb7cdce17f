//! The closed error-kind enum (§7) plus positive-errno passthrough.
//!
//! A flat `enum` with one doc-commented variant per condition, the
//! `Display` impl derived via `thiserror` since this crate is hosted (not
//! `#![no_std]`) and `thiserror` is the ecosystem-standard way to get it.

use thiserror::Error;

/// Crate-wide result alias, used everywhere a fallible operation can fail
/// with an [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

/// The closed set of broker error kinds, plus passthrough for positive OS
/// errno values. Negative/named kinds and errno values never collide.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required pointer/reference argument was null/absent.
    #[error("null value")]
    NullVal,
    /// Allocation failed.
    #[error("out of memory")]
    Oom,
    /// A string argument was not valid (bad encoding, embedded NUL, etc).
    #[error("invalid string")]
    InvalidString,
    /// An argument failed validation that isn't covered by a more specific
    /// kind below.
    #[error("invalid value")]
    InvalidVal,
    /// An I/O operation on a driver fd failed with a non-recoverable error.
    #[error("I/O error")]
    IoError,
    /// A blocking call was interrupted.
    #[error("interrupted")]
    Intr,
    /// `init_driver` named a driver kind with no registered op table.
    #[error("driver not registered")]
    DriverNotRegistered,
    /// `init_driver` was called twice for the same device path without an
    /// intervening `destroy_driver`.
    #[error("driver already present")]
    DriverAlreadyPresent,
    /// `destroy_driver` was called while the instance's refcount is nonzero.
    #[error("driver in use")]
    DriverInUse,
    /// A driver op table call returned failure.
    #[error("driver failure")]
    DriverFail,
    /// The driver does not support the requested operation/mode.
    #[error("driver unsupported")]
    DriverUnsupported,
    /// No driver instance is registered for the given device path.
    #[error("device does not exist")]
    DevDoesNotExist,
    /// No driver instance claims the given data ID.
    #[error("data ID does not exist")]
    DataIdDoesNotExist,
    /// The data ID being enabled is already claimed by another driver
    /// instance.
    #[error("conflicting drivers")]
    ConflictingDrivers,
    /// `ops.datadesc` enabled none of the driver's descriptors.
    #[error("no descriptors enabled")]
    NoDescsEnabled,
    /// A request list was empty.
    #[error("no data requested")]
    NoDataRequested,
    /// A request list exceeded [`crate::MAX_REQUESTS`].
    #[error("too much data requested")]
    TooMuchDataRequested,
    /// The same `(id, period)` pair appeared twice in a request list, or
    /// (for a push-mode driver) the same ID appeared twice regardless of
    /// period.
    #[error("duplicate data requested")]
    DuplicateDataRequested,
    /// The requested period is not in the driver's nonempty set of
    /// supported periods.
    #[error("period unsupported")]
    PeriodUnsupported,
    /// `alloc_ctx` was called with no callback.
    #[error("missing callback")]
    MissingCallback,
    /// A non-blocking pop was attempted on an empty queue.
    #[error("empty queue")]
    EmptyQueue,
    /// A queue resize requested a capacity too small to hold the requested
    /// flush-free invariant.
    #[error("queue too small")]
    QueueTooSmall,
    /// `start` was called on an already-active context.
    #[error("context already active")]
    CtxActive,
    /// `stop`/`modify`/`read*` assumed an active context that was not.
    #[error("context not active")]
    CtxNotActive,
    /// A blocked reader was woken because the context was stopped.
    #[error("context stopped")]
    CtxStopped,
    /// A schema field named a unit the core does not recognize.
    #[error("unknown unit")]
    UnknownUnit,
    /// A positive OS errno value, passed through unchanged. `Display` falls
    /// back to the OS string table.
    #[error("{0}")]
    Errno(OsErrno),
}

impl Error {
    /// `strerror`-equivalent lookup (§6): never returns an empty string for
    /// a defined kind.
    pub fn strerror(&self) -> String {
        self.to_string()
    }

    /// Build an [`Error::Errno`] from a raw positive errno value.
    pub const fn from_errno(raw: i32) -> Self {
        Self::Errno(OsErrno(raw))
    }
}

/// Positive OS errno, displayed via the OS's own string table rather than
/// one of our named variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsErrno(pub i32);

impl std::fmt::Display for OsErrno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", std::io::Error::from_raw_os_error(self.0))
    }
}
