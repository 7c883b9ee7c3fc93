//! All the errors that this crate can emit are defined in the
//! [`error::AcqError`] enum.

use thiserror::Error;

/// Errors that originate from this crate.
///
/// The variant groups mirror the taxonomy of the acquisition engine: configuration
/// problems are caught before anything is opened or allocated, transport/driver errors
/// come from talking to the instrument, and the remainder describe how the
/// orchestrator's run loop reacted to a failure.
#[derive(Error, Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum AcqError {
    /// The run configuration was rejected before any allocation or connection was
    /// attempted (bad CLI value, too many channels, RAM cap exceeded, overflow in the
    /// size computation).
    #[error("configuration error: {0}")]
    Config(String),

    /// A problem occurred opening, reading from, or writing to the VISA/transport
    /// session.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The instrument replied with something the driver did not expect.
    #[error("driver error: {0}")]
    Driver(String),

    /// A negative driver return code that is not one of the known soft-miss sentinels.
    #[error("hard acquisition failure, rc={0}")]
    HardAcq(i32),

    /// An error occurred opening or writing the trace/log files.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Allocation or thread-spawn failure.
    #[error("resource error: {0}")]
    Resource(String),

    /// The run was cancelled, either by the stop signal or by an unrecoverable error
    /// elsewhere in the pipeline.
    #[error("acquisition cancelled: {0}")]
    Cancelled(String),

    /// The `visa` feature was not enabled, so no VISA transport is available.
    #[error("the requested operation requires the `visa` feature to be enabled")]
    NoVisa,

    #[cfg(feature = "visa")]
    /// An error surfaced by the underlying VISA driver.
    #[error("visa error: {source}")]
    Visa {
        #[from]
        source: visa_rs::Error,
    },
}

/// Errors specific to the transport layer (C1): opening a session, the line/query
/// protocol, and definite-length block framing.
#[derive(Error, Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum TransportError {
    /// Opening the VISA resource manager failed.
    #[error("unable to open resource manager: {0}")]
    OpenRm(String),

    /// Opening the instrument session failed.
    #[error("unable to open instrument '{resource}': {details}")]
    OpenInstr {
        /// The resource string that failed to open.
        resource: String,
        /// More detail about the failure.
        details: String,
    },

    /// No resource matched the requested IDN substring during auto-detection.
    #[error("no instrument found matching '{0}'")]
    NotFound(String),

    /// A write failed or returned zero bytes written.
    #[error("write failed: {0}")]
    Write(String),

    /// A read failed.
    #[error("read failed: {0}")]
    Read(String),

    /// An exact-length read did not receive the requested number of bytes before the
    /// session timeout elapsed.
    #[error("incomplete read: wanted {wanted} bytes, got {got}")]
    Incomplete {
        /// The number of bytes requested.
        wanted: usize,
        /// The number of bytes actually read.
        got: usize,
    },

    /// A query's response did not fit in the caller-supplied buffer.
    #[error("query response truncated (capacity {0})")]
    Truncated(usize),

    /// A definite-length block's declared payload length did not fit in the
    /// caller-supplied destination buffer. The stream has already been drained past
    /// the payload and its optional trailing LF, so the session remains usable.
    #[error("definite-length block of {declared} bytes does not fit in {capacity}-byte buffer")]
    BufferTooSmall {
        /// The length declared in the `#<n><len>` header.
        declared: usize,
        /// The capacity of the destination buffer.
        capacity: usize,
    },

    /// The definite-length block header was malformed.
    #[error("malformed definite-length block header: {0}")]
    MalformedBlock(String),

    /// An underlying I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AcqError>;
