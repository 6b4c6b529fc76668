/*!
 * `ChainBench_bolts` contains the building blocks shared by all `ChainBench` crates,
 * including the [`Error`] enum, the loggers, input files and the random number generators.
 */
#![doc = include_str!("../../../README.md")]
/*! */
#![cfg_attr(feature = "document-features", doc = document_features::document_features!())]
#![cfg_attr(not(test), warn(
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
))]
#![cfg_attr(test, deny(
    missing_debug_implementations,
    missing_docs,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_must_use,
))]

pub mod fs;
pub mod rands;

use core::{
    fmt::{self, Display},
    num::{ParseIntError, TryFromIntError},
    time,
};
use std::{
    io,
    time::{SystemTime, UNIX_EPOCH},
};

use log::{LevelFilter, Metadata, Record};

/// Exit code used when a routine under test fails to allocate its buffer.
///
/// This is `exit(-1)` in C, as seen by the parent process.
pub const EXIT_ALLOC_FAILURE: i32 = 255;

#[cfg(feature = "errors_backtrace")]
/// Error Backtrace type when `errors_backtrace` feature is enabled (== [`Backtrace`](std::backtrace::Backtrace))
pub type ErrorBacktrace = std::backtrace::Backtrace;

#[cfg(not(feature = "errors_backtrace"))]
#[derive(Debug, Default)]
/// ZST to use when `errors_backtrace` is disabled
pub struct ErrorBacktrace;

#[cfg(not(feature = "errors_backtrace"))]
impl ErrorBacktrace {
    /// Nop
    #[must_use]
    pub fn capture() -> Self {
        Self
    }
}

#[cfg(feature = "errors_backtrace")]
fn display_error_backtrace(f: &mut fmt::Formatter, err: &ErrorBacktrace) -> fmt::Result {
    write!(f, "\nBacktrace: {err:?}")
}
#[cfg(not(feature = "errors_backtrace"))]
#[allow(clippy::unnecessary_wraps)]
fn display_error_backtrace(_f: &mut fmt::Formatter, _err: &ErrorBacktrace) -> fmt::Result {
    fmt::Result::Ok(())
}

/// Main error struct for `ChainBench`
#[derive(Debug)]
pub enum Error {
    /// Serialization error
    Serialize(String, ErrorBacktrace),
    /// Key not in Map
    KeyNotFound(String, ErrorBacktrace),
    /// Key already exists and should not overwrite
    KeyExists(String, ErrorBacktrace),
    /// You're holding it wrong
    IllegalState(String, ErrorBacktrace),
    /// The argument passed to this method or function is not valid
    IllegalArgument(String, ErrorBacktrace),
    /// The performed action is not supported on the current platform
    Unsupported(String, ErrorBacktrace),
    /// OS error, wrapping a [`io::Error`]
    OsError(io::Error, String, ErrorBacktrace),
    /// An effect referenced a region that was never created in this run
    InvalidRegion(u32, ErrorBacktrace),
    /// The exposure channel requires a payload, but none was found
    MissingPayload(String, ErrorBacktrace),
    /// A safety property did not hold right before the unsafe operation
    SafetyViolation(String, ErrorBacktrace),
    /// A symbolic value fell outside of its assumed bounds, the path is infeasible
    Infeasible(String, ErrorBacktrace),
    /// Something else happened
    Unknown(String, ErrorBacktrace),
}

impl Error {
    /// Serialization error
    #[must_use]
    pub fn serialize<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::Serialize(arg.into(), ErrorBacktrace::capture())
    }

    /// Key not in Map
    #[must_use]
    pub fn key_not_found<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::KeyNotFound(arg.into(), ErrorBacktrace::capture())
    }

    /// Key already exists in Map
    #[must_use]
    pub fn key_exists<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::KeyExists(arg.into(), ErrorBacktrace::capture())
    }

    /// You're holding it wrong
    #[must_use]
    pub fn illegal_state<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::IllegalState(arg.into(), ErrorBacktrace::capture())
    }

    /// The argument passed to this method or function is not valid
    #[must_use]
    pub fn illegal_argument<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::IllegalArgument(arg.into(), ErrorBacktrace::capture())
    }

    /// This operation is not supported on the current architecture or platform
    #[must_use]
    pub fn unsupported<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::Unsupported(arg.into(), ErrorBacktrace::capture())
    }

    /// OS error with additional message
    #[must_use]
    pub fn os_error<S>(err: io::Error, msg: S) -> Self
    where
        S: Into<String>,
    {
        Error::OsError(err, msg.into(), ErrorBacktrace::capture())
    }

    /// An effect referenced the unknown region `id`
    #[must_use]
    pub fn invalid_region(id: u32) -> Self {
        Error::InvalidRegion(id, ErrorBacktrace::capture())
    }

    /// The payload required by an exposure channel is missing
    #[must_use]
    pub fn missing_payload<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::MissingPayload(arg.into(), ErrorBacktrace::capture())
    }

    /// A safety property was violated
    #[must_use]
    pub fn safety_violation<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::SafetyViolation(arg.into(), ErrorBacktrace::capture())
    }

    /// The current path is infeasible under the assumed bounds
    #[must_use]
    pub fn infeasible<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::Infeasible(arg.into(), ErrorBacktrace::capture())
    }

    /// Something else happened
    #[must_use]
    pub fn unknown<S>(arg: S) -> Self
    where
        S: Into<String>,
    {
        Error::Unknown(arg.into(), ErrorBacktrace::capture())
    }

    /// Returns `true` if this error reports a violated safety property
    #[must_use]
    pub fn is_safety_violation(&self) -> bool {
        matches!(self, Self::SafetyViolation(..))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Serialize(s, b) => {
                write!(f, "Error in Serialization: `{0}`", &s)?;
                display_error_backtrace(f, b)
            }
            Self::KeyNotFound(s, b) => {
                write!(f, "Key: `{0}` - not found", &s)?;
                display_error_backtrace(f, b)
            }
            Self::KeyExists(s, b) => {
                write!(f, "Key: `{0}` - already exists", &s)?;
                display_error_backtrace(f, b)
            }
            Self::IllegalState(s, b) => {
                write!(f, "Illegal state: {0}", &s)?;
                display_error_backtrace(f, b)
            }
            Self::IllegalArgument(s, b) => {
                write!(f, "Illegal argument: {0}", &s)?;
                display_error_backtrace(f, b)
            }
            Self::Unsupported(s, b) => {
                write!(
                    f,
                    "The operation is not supported on the current platform: {0}",
                    &s
                )?;
                display_error_backtrace(f, b)
            }
            Self::OsError(err, s, b) => {
                write!(f, "OS error: {0}: {1}", &s, err)?;
                display_error_backtrace(f, b)
            }
            Self::InvalidRegion(id, b) => {
                write!(f, "Effect references region {id}, which was never created")?;
                display_error_backtrace(f, b)
            }
            Self::MissingPayload(s, b) => {
                write!(f, "Missing payload: {0}", &s)?;
                display_error_backtrace(f, b)
            }
            Self::SafetyViolation(s, b) => {
                write!(f, "Safety property violated: {0}", &s)?;
                display_error_backtrace(f, b)
            }
            Self::Infeasible(s, b) => {
                write!(f, "Infeasible path: {0}", &s)?;
                display_error_backtrace(f, b)
            }
            Self::Unknown(s, b) => {
                write!(f, "Unknown error: {0}", &s)?;
                display_error_backtrace(f, b)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Stringify the json serializer error
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialize(format!("{err:?}"))
    }
}

/// Stringify the toml deserializer error
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::serialize(format!("{err}"))
    }
}

/// Create a `ChainBench` Error from io Error
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::os_error(err, "io::Error ocurred")
    }
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Self {
        Self::illegal_argument(format!("Failed to parse Int: {err:?}"))
    }
}

impl From<TryFromIntError> for Error {
    fn from(err: TryFromIntError) -> Self {
        Self::illegal_state(format!("Expected conversion failed: {err:?}"))
    }
}

/// Current time
#[must_use]
#[inline]
pub fn current_time() -> time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Gets current nanoseconds since [`UNIX_EPOCH`]
#[must_use]
#[inline]
pub fn current_nanos() -> u64 {
    current_time().as_nanos() as u64
}

/// Stderr logger
pub static CHAINBENCH_STDERR_LOGGER: SimpleStderrLogger = SimpleStderrLogger::new();

/// A simple logger struct that logs to stderr when used with [`log::set_logger`].
///
/// Stdout belongs to the routine under test and to the ledger report, so all
/// harness diagnostics go to stderr.
#[derive(Debug)]
pub struct SimpleStderrLogger {}

impl Default for SimpleStderrLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleStderrLogger {
    /// Create a new [`log::Log`] logger that will write log to stderr
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// register stderr logger, filtering everything above `level`
    pub fn set_logger(level: LevelFilter) -> Result<(), Error> {
        log::set_logger(&CHAINBENCH_STDERR_LOGGER)
            .map_err(|_| Error::unknown("Failed to register logger"))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl log::Log for SimpleStderrLogger {
    #[inline]
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        eprintln!(
            "[{:?}] {} [{}]: {}",
            current_time(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}
