use serde::{Deserialize, Serialize};

/// sqlmock errors.
///
/// Every failure in the parser, executor, registry and client layers is one of
/// these variants. Nothing is retried internally: errors are returned to the
/// caller of the statement or API call that caused them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The SQL text is not a recognized token sequence. The position is the
    /// byte offset of the offending token in the input.
    Syntax { position: usize, message: String },
    /// The construct is valid SQL, but not for this dialect version.
    UnsupportedFeature { dialect: String, version: u32, feature: String },
    /// The statement is well-formed and the feature is supported, but the
    /// operation is not valid in this context (e.g. OFFSET/FETCH without
    /// ORDER BY on SQL Server).
    InvalidOperation(String),
    /// A table or column doesn't exist, already exists, or is ambiguous.
    Schema(String),
    /// Values of incompatible types were combined or stored.
    TypeMismatch(String),
    /// A primary key, unique or NOT NULL constraint was violated.
    Constraint(String),
    /// A placeholder has no matching parameter.
    ParameterBinding(String),
    /// No executor is registered for the dialect name.
    UnknownDialect(String),
    /// Invalid dialect, version or settings.
    Configuration(String),
    /// The connection is not in a state that allows the operation.
    InvalidConnectionState(String),
    /// An IO error.
    IO(String),
    /// An internal invariant was violated, e.g. a poisoned lock.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Syntax { position, message } => {
                write!(f, "syntax error at position {position}: {message}")
            }
            Error::UnsupportedFeature { dialect, version, feature } => {
                write!(f, "{feature} is not supported by {dialect} version {version}")
            }
            Error::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            Error::Schema(msg) => write!(f, "schema error: {msg}"),
            Error::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            Error::Constraint(msg) => write!(f, "constraint violation: {msg}"),
            Error::ParameterBinding(msg) => write!(f, "parameter binding error: {msg}"),
            Error::UnknownDialect(name) => write!(f, "no executor registered for dialect {name}"),
            Error::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Error::InvalidConnectionState(msg) => write!(f, "invalid connection state: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

/// Constructs an Error::Syntax for the given position and format string.
#[macro_export]
macro_rules! errsyntax {
    ($position:expr, $($args:tt)*) => {
        $crate::error::Error::Syntax { position: $position, message: format!($($args)*) }.into()
    };
}

/// Constructs an Error::UnsupportedFeature for a dialect version and a feature
/// format string.
#[macro_export]
macro_rules! errunsupported {
    ($dialect:expr, $($args:tt)*) => {
        $crate::error::Error::UnsupportedFeature {
            dialect: $dialect.dialect.name.to_string(),
            version: $dialect.version,
            feature: format!($($args)*),
        }
        .into()
    };
}

/// Constructs an Error::InvalidOperation via format!() and into().
#[macro_export]
macro_rules! errinvalid {
    ($($args:tt)*) => { $crate::error::Error::InvalidOperation(format!($($args)*)).into() };
}

/// Constructs an Error::Schema via format!() and into().
#[macro_export]
macro_rules! errschema {
    ($($args:tt)*) => { $crate::error::Error::Schema(format!($($args)*)).into() };
}

/// Constructs an Error::TypeMismatch via format!() and into().
#[macro_export]
macro_rules! errtype {
    ($($args:tt)*) => { $crate::error::Error::TypeMismatch(format!($($args)*)).into() };
}

/// Constructs an Error::Constraint via format!() and into().
#[macro_export]
macro_rules! errconstraint {
    ($($args:tt)*) => { $crate::error::Error::Constraint(format!($($args)*)).into() };
}

/// Constructs an Error::ParameterBinding via format!() and into().
#[macro_export]
macro_rules! errparam {
    ($($args:tt)*) => { $crate::error::Error::ParameterBinding(format!($($args)*)).into() };
}

/// Constructs an Error::Configuration via format!() and into().
#[macro_export]
macro_rules! errconfig {
    ($($args:tt)*) => { $crate::error::Error::Configuration(format!($($args)*)).into() };
}

/// Constructs an Error::InvalidConnectionState via format!() and into().
#[macro_export]
macro_rules! errstate {
    ($($args:tt)*) => { $crate::error::Error::InvalidConnectionState(format!($($args)*)).into() };
}

/// A sqlmock Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<log::ParseLevelError> for Error {
    fn from(err: log::ParseLevelError) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<log::SetLoggerError> for Error {
    fn from(err: log::SetLoggerError) -> Self {
        Error::Configuration(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::InvalidOperation(err.to_string())
    }
}

impl From<rustyline::error::ReadlineError> for Error {
    fn from(err: rustyline::error::ReadlineError) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}
