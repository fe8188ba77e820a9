//! Error type for the register compiler.
//!
//! Every failure is synchronous and typed; nothing is retried internally.

use failure::{Backtrace, Context, Fail};

use std::fmt;

pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    /// A value does not fit the register field (or other bounded slot) it
    /// is headed for
    #[fail(display = "Value out of range: {}", _0)]
    ValueOutOfRange(String),

    /// An operation referenced a profile index absent from the list
    #[fail(display = "Profile not found: {}", _0)]
    ProfileNotFound(String),

    /// A profile list was seeded with two profiles sharing an index
    #[fail(display = "Duplicate profile: {}", _0)]
    DuplicateProfile(String),

    /// Profile index outside the chip's slot range
    #[fail(display = "Invalid profile index: {}", _0)]
    InvalidProfileIndex(String),

    /// A profile vector does not match the channel count at its level
    #[fail(display = "Length mismatch: {}", _0)]
    LengthMismatch(String),

    /// The waveform cannot be encoded even at the maximum clock divider,
    /// or a repeat count exceeds the elastic-repeat field
    #[fail(display = "Pattern overflow: {}", _0)]
    PatternOverflow(String),

    /// A register image was requested before profiles were set and activated
    #[fail(display = "Not ready: {}", _0)]
    NotReady(String),

    /// An array was built with repeated I2C addresses
    #[fail(display = "Duplicate I2C address: {}", _0)]
    DuplicateAddress(String),

    /// Unrecognized time unit name
    #[fail(display = "Unknown unit: {}", _0)]
    UnknownUnit(String),
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.inner.get_context().clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Self {
        Self { inner }
    }
}

/// Convenience type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
