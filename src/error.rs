//! Error types for memgate.
//!
//! A single `thiserror` enum covers the whole taxonomy: registry lookups,
//! backend initialization, per-entry I/O failures and misuse of boundary
//! tokens. Every variant maps to a stable integer `ResultCode` so the
//! error can cross the C boundary without allocation.

use crate::types::Address;
use thiserror::Error;

/// Main error type for memgate operations.
#[derive(Debug, Error)]
pub enum MemError {
    /// No connector with this name is registered
    #[error("connector not found: {name}")]
    NotFound { name: String },

    /// A connector with this name was already registered
    #[error("connector already registered: {name}")]
    ConflictingRegistration { name: String },

    /// The backend refused to initialize
    #[error("failed to initialize connector `{backend}`: {message}")]
    BackendInit { backend: String, message: String },

    /// The request starts outside of the backend's address space
    #[error("address {address} out of range (len={len:#x})")]
    OutOfRange { address: Address, len: usize },

    /// The request starts inside the address space but runs past its end
    #[error("partial read at {address}: requested {requested:#x} bytes, {available:#x} available")]
    PartialRead {
        address: Address,
        requested: usize,
        available: usize,
    },

    #[error(
        "partial write at {address}: requested {requested:#x} bytes, {available:#x} available"
    )]
    PartialWrite {
        address: Address,
        requested: usize,
        available: usize,
    },

    /// A boundary token was used after it had been released
    #[error("token {token:#x} used after release")]
    UseAfterRelease { token: u64 },

    /// A boundary token that was never issued, or is of the wrong kind
    #[error("invalid token {token:#x}")]
    InvalidToken { token: u64 },

    #[error("allocation of {bytes} bytes failed")]
    AllocationFailure { bytes: usize },

    /// Virtual address has no mapping
    #[error("no translation for virtual address {address}")]
    Translation { address: Address },

    #[error("connector `{backend}` is read-only")]
    ReadOnly { backend: String },

    /// The backend lacks an optional capability
    #[error("connector `{backend}` does not support {feature}")]
    Unsupported {
        backend: String,
        feature: &'static str,
    },

    #[error("invalid connector arguments: {0}")]
    InvalidArgs(String),

    /// Only produced by the caller-side watchdog
    #[error("operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for memgate operations
pub type Result<T> = std::result::Result<T, MemError>;

/// Integer result codes handed across the C boundary.
///
/// `Ok` is zero, every error is negative. Values are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Ok = 0,
    NotFound = -1,
    ConflictingRegistration = -2,
    BackendInit = -3,
    OutOfRange = -4,
    PartialRead = -5,
    PartialWrite = -6,
    UseAfterRelease = -7,
    AllocationFailure = -8,
    InvalidToken = -9,
    Translation = -10,
    ReadOnly = -11,
    InvalidArgs = -12,
    Timeout = -13,
    Io = -14,
    Config = -15,
    NullPointer = -16,
    Panic = -17,
    /// At least one entry of a batch failed; see the per-entry status array
    BatchIncomplete = -18,
    Unsupported = -19,
}

impl ResultCode {
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, ResultCode::Ok)
    }

    /// Short human readable name, also used by the C `memgate_result_str`.
    pub const fn as_str(self) -> &'static str {
        match self {
            ResultCode::Ok => "ok",
            ResultCode::NotFound => "not found",
            ResultCode::ConflictingRegistration => "conflicting registration",
            ResultCode::BackendInit => "backend initialization failed",
            ResultCode::OutOfRange => "out of range",
            ResultCode::PartialRead => "partial read",
            ResultCode::PartialWrite => "partial write",
            ResultCode::UseAfterRelease => "use after release",
            ResultCode::AllocationFailure => "allocation failure",
            ResultCode::InvalidToken => "invalid token",
            ResultCode::Translation => "translation failed",
            ResultCode::ReadOnly => "read-only",
            ResultCode::InvalidArgs => "invalid arguments",
            ResultCode::Timeout => "timeout",
            ResultCode::Io => "i/o error",
            ResultCode::Config => "configuration error",
            ResultCode::NullPointer => "null pointer",
            ResultCode::Panic => "panic",
            ResultCode::BatchIncomplete => "batch incomplete",
            ResultCode::Unsupported => "unsupported",
        }
    }
}

impl MemError {
    /// Boundary code for this error.
    pub fn code(&self) -> ResultCode {
        match self {
            MemError::NotFound { .. } => ResultCode::NotFound,
            MemError::ConflictingRegistration { .. } => ResultCode::ConflictingRegistration,
            MemError::BackendInit { .. } => ResultCode::BackendInit,
            MemError::OutOfRange { .. } => ResultCode::OutOfRange,
            MemError::PartialRead { .. } => ResultCode::PartialRead,
            MemError::PartialWrite { .. } => ResultCode::PartialWrite,
            MemError::UseAfterRelease { .. } => ResultCode::UseAfterRelease,
            MemError::InvalidToken { .. } => ResultCode::InvalidToken,
            MemError::AllocationFailure { .. } => ResultCode::AllocationFailure,
            MemError::Translation { .. } => ResultCode::Translation,
            MemError::ReadOnly { .. } => ResultCode::ReadOnly,
            MemError::Unsupported { .. } => ResultCode::Unsupported,
            MemError::InvalidArgs(_) => ResultCode::InvalidArgs,
            MemError::Timeout { .. } => ResultCode::Timeout,
            MemError::Io(_) => ResultCode::Io,
            MemError::Config(_) => ResultCode::Config,
        }
    }

    /// Wrap any error raised while a backend initializes.
    ///
    /// Errors that already are `BackendInit` pass through unchanged.
    pub fn backend_init(backend: &str, err: MemError) -> MemError {
        match err {
            MemError::BackendInit { .. } => err,
            other => MemError::BackendInit {
                backend: backend.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<MemError> for ResultCode {
    fn from(err: MemError) -> Self {
        err.code()
    }
}

/// Convert memgate errors to PyO3 exceptions
#[cfg(feature = "python-ext")]
impl From<MemError> for pyo3::PyErr {
    fn from(err: MemError) -> pyo3::PyErr {
        use pyo3::exceptions::{
            PyException, PyIOError, PyKeyError, PyMemoryError, PyNotImplementedError,
            PyTimeoutError, PyValueError,
        };

        match err {
            MemError::Io(e) => PyIOError::new_err(e.to_string()),
            MemError::Timeout { millis } => {
                PyTimeoutError::new_err(format!("operation timed out after {}ms", millis))
            }
            MemError::NotFound { name } => PyKeyError::new_err(name),
            e @ MemError::Unsupported { .. } => PyNotImplementedError::new_err(e.to_string()),
            MemError::AllocationFailure { bytes } => {
                PyMemoryError::new_err(format!("allocation of {} bytes failed", bytes))
            }
            e @ (MemError::InvalidArgs(_)
            | MemError::Config(_)
            | MemError::ConflictingRegistration { .. }) => PyValueError::new_err(e.to_string()),
            _ => PyException::new_err(err.to_string()),
        }
    }
}
