use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for schemaboot operations.
///
/// Each kind names one category of failure so callers can decide whether a
/// problem is a misconfiguration, a connectivity issue or a failed migration.
///
/// # Examples
///
/// ```rust
/// use schemaboot::errors::{ErrorKind, SchemabootError, SchemabootResult};
///
/// fn example() -> SchemabootResult<()> {
///     Err(SchemabootError::new("changeLogPath must be defined.", ErrorKind::InvalidArgument))
/// }
///
/// assert_eq!(example().unwrap_err().kind(), &ErrorKind::InvalidArgument);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Configuration Errors - raised eagerly by builders and constructors
    /// A supplied value is present but not acceptable
    InvalidArgument,
    /// A required collaborator or value is missing
    MissingDependency,

    // Connectivity Errors - raised by connection sources and connections
    /// Failure reported by the SQL/connection layer
    SqlError,
    /// A connection could not be established or used
    ConnectionError,

    // Migration Errors - raised by the migration library
    /// Umbrella error for a failed migration run
    MigrationError,

    // Resource Errors - raised while resolving changelogs
    /// The requested changelog resource does not exist
    ResourceNotFound,
    /// Generic IO error
    IOError,

    // Lifecycle Errors
    /// Failure while releasing a session, database or connection
    CleanupError,
    /// Application startup must be aborted
    StartupError,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl ErrorKind {
    /// Returns `true` for kinds describing a configuration mistake, which
    /// are detected eagerly and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ErrorKind::InvalidArgument | ErrorKind::MissingDependency)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "Invalid argument"),
            ErrorKind::MissingDependency => write!(f, "Missing dependency"),
            ErrorKind::SqlError => write!(f, "SQL error"),
            ErrorKind::ConnectionError => write!(f, "Connection error"),
            ErrorKind::MigrationError => write!(f, "Migration error"),
            ErrorKind::ResourceNotFound => write!(f, "Resource not found"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::CleanupError => write!(f, "Cleanup error"),
            ErrorKind::StartupError => write!(f, "Startup error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom schemaboot error type.
///
/// `SchemabootError` carries a message, a kind and an optional cause, so a
/// startup failure can be reported together with the SQL or migration error
/// that triggered it.
///
/// # Examples
///
/// ```rust
/// use schemaboot::errors::{ErrorKind, SchemabootError};
///
/// let cause = SchemabootError::new("connection refused", ErrorKind::SqlError);
/// let err = SchemabootError::new_with_cause("migration failed", ErrorKind::MigrationError, cause);
/// assert_eq!(err.root_cause().kind(), &ErrorKind::SqlError);
/// ```
#[derive(Clone)]
pub struct SchemabootError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<SchemabootError>>,
    backtrace: Arc<Backtrace>,
}

impl SchemabootError {
    /// Creates a new `SchemabootError` with the specified message and kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        SchemabootError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    /// Creates a new `SchemabootError` wrapping `cause`.
    ///
    /// The cause is preserved and reachable through [`Error::source`].
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: SchemabootError) -> Self {
        SchemabootError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&SchemabootError> {
        self.cause.as_deref()
    }

    /// Returns the innermost error of the cause chain, or `self`.
    pub fn root_cause(&self) -> &SchemabootError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }
}

impl Display for SchemabootError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for SchemabootError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace),
        }
    }
}

impl Error for SchemabootError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for schemaboot operations.
pub type SchemabootResult<T> = Result<T, SchemabootError>;

impl From<std::io::Error> for SchemabootError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::ResourceNotFound,
            _ => ErrorKind::IOError,
        };
        SchemabootError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<String> for SchemabootError {
    fn from(msg: String) -> Self {
        SchemabootError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for SchemabootError {
    fn from(msg: &str) -> Self {
        SchemabootError::new(msg, ErrorKind::InternalError)
    }
}
