use derive_more::{Display, Error};

/// Convenience alias used by every bus operation.
pub type Result<T, E = BusError> = core::result::Result<T, E>;

/// Errors that can occur during bus operations.
///
/// Every variant has a stable negative code (see [`BusError::code`]) so the
/// outcome can also be carried in-band next to byte counts.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusError {
    /// The bus (or its backend context) was never created or already released.
    #[display("invalid object")]
    InvalidObject,
    /// The device handle is malformed or was never opened on this bus.
    #[display("invalid handle")]
    InvalidHandle,
    /// The connection string is malformed for the backend that claimed it.
    #[display("invalid connection string")]
    InvalidUri,
    /// An argument is outside its domain, e.g. a reserved device address.
    #[display("invalid argument")]
    InvalidArgument,
    /// The underlying channel could not be used at all.
    #[display("backend failure")]
    BackendFailure,
    /// The channel works but the addressed device did not respond as expected.
    #[display("communication error")]
    CommunicationError,
}

impl BusError {
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidObject => -1,
            Self::InvalidHandle => -2,
            Self::InvalidUri => -3,
            Self::InvalidArgument => -4,
            Self::BackendFailure => -5,
            Self::CommunicationError => -6,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::InvalidObject),
            -2 => Some(Self::InvalidHandle),
            -3 => Some(Self::InvalidUri),
            -4 => Some(Self::InvalidArgument),
            -5 => Some(Self::BackendFailure),
            -6 => Some(Self::CommunicationError),
            _ => None,
        }
    }
}

impl From<BusError> for i32 {
    fn from(err: BusError) -> Self {
        err.code()
    }
}

/// Message text for an in-band result code.
///
/// `0` and non-negative byte counts are successes and describe as `"ok"`.
pub fn describe(code: i32) -> &'static str {
    if code >= 0 {
        return "ok";
    }
    match BusError::from_code(code) {
        Some(BusError::InvalidObject) => "invalid object",
        Some(BusError::InvalidHandle) => "invalid handle",
        Some(BusError::InvalidUri) => "invalid connection string",
        Some(BusError::InvalidArgument) => "invalid argument",
        Some(BusError::BackendFailure) => "backend failure",
        Some(BusError::CommunicationError) => "communication error",
        None => "unknown error",
    }
}

/// A backend with the same name is already registered.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
#[display("backend {name} is already registered")]
pub struct DuplicateBackend {
    #[error(not(source))]
    pub name: String,
}
