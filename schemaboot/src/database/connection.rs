use crate::errors::SchemabootResult;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Low-level interface of one open database connection.
///
/// # Purpose
/// Implemented by connection pool adapters. The engine only needs enough of a
/// connection to hand it to the migration library and to release it again
/// when that library never took ownership of it.
///
/// # Thread Safety
/// Implementers must be `Send + Sync`; a connection may be released on a
/// different thread than the one that opened it.
pub trait DatabaseConnectionProvider: Send + Sync {
    /// Checks if the connection is closed.
    fn is_closed(&self) -> SchemabootResult<bool>;

    /// Checks if the connection commits every statement on its own.
    fn auto_commit(&self) -> SchemabootResult<bool>;

    /// Rolls back the work of the current transaction.
    fn rollback(&self) -> SchemabootResult<()>;

    /// Closes the connection. Closing twice must be harmless.
    fn close(&self) -> SchemabootResult<()>;
}

/// Shared handle to a [`DatabaseConnectionProvider`].
///
/// Cloning is cheap and every clone refers to the same underlying connection.
#[derive(Clone)]
pub struct DatabaseConnection {
    inner: Arc<dyn DatabaseConnectionProvider>,
}

impl DatabaseConnection {
    pub fn new<T: DatabaseConnectionProvider + 'static>(inner: T) -> Self {
        DatabaseConnection { inner: Arc::new(inner) }
    }

    /// Returns `true` when both handles refer to the same connection.
    pub fn same_as(&self, other: &DatabaseConnection) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl Deref for DatabaseConnection {
    type Target = Arc<dyn DatabaseConnectionProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Debug for DatabaseConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnection").finish_non_exhaustive()
    }
}

/// Produces database connections on demand.
///
/// # Purpose
/// The data source of one migration target. The engine asks for exactly one
/// connection per target and per run and never retries.
///
/// # Returns
/// `Ok(None)` models a data source that answered without a connection; the
/// engine rejects it as a missing dependency. Failures of the connection
/// layer should use [`ErrorKind::SqlError`](crate::errors::ErrorKind::SqlError).
pub trait ConnectionSourceProvider: Send + Sync {
    fn connection(&self) -> SchemabootResult<Option<DatabaseConnection>>;
}

/// Shared handle to a [`ConnectionSourceProvider`].
///
/// Equality and hashing follow the identity of the shared provider: two
/// handles are equal when they were cloned from the same source.
#[derive(Clone)]
pub struct ConnectionSource {
    inner: Arc<dyn ConnectionSourceProvider>,
}

impl ConnectionSource {
    pub fn new<T: ConnectionSourceProvider + 'static>(inner: T) -> Self {
        ConnectionSource { inner: Arc::new(inner) }
    }

    /// Wraps an already shared provider, keeping its identity.
    pub fn from_arc(inner: Arc<dyn ConnectionSourceProvider>) -> Self {
        ConnectionSource { inner }
    }

    fn address(&self) -> *const () {
        Arc::as_ptr(&self.inner) as *const ()
    }
}

impl Deref for ConnectionSource {
    type Target = Arc<dyn ConnectionSourceProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl PartialEq for ConnectionSource {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for ConnectionSource {}

impl Hash for ConnectionSource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl Debug for ConnectionSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSource").finish_non_exhaustive()
    }
}
