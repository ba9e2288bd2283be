//! Boundary to the migration library.
//!
//! The library itself (changeset parsing, history tracking, SQL generation)
//! lives outside this crate. The engine drives it through three traits:
//!
//! - [`MigrationBackendProvider`] detects the database behind a connection,
//!   opens migration sessions and exposes the library's global settings.
//! - [`DatabaseProvider`] is the library's view of one database.
//! - [`MigrationSession`] applies one changelog to one database.

use crate::database::{DatabaseConnection, ResourceLoader};
use crate::errors::SchemabootResult;
use crate::settings::GlobalSettings;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// Entry point of a migration library.
///
/// # Thread Safety
/// Implementers must be `Send + Sync`: the engine is shared between the
/// threads that wire up the application.
pub trait MigrationBackendProvider: Send + Sync {
    /// Name of the migration library, used in logs.
    fn name(&self) -> String;

    /// Build version of the migration library.
    fn version(&self) -> String;

    /// Current global settings of the library.
    ///
    /// Read once per engine run, right before the first target. Backends
    /// honouring [`SHOULD_RUN_ENV`](crate::SHOULD_RUN_ENV) build them with
    /// [`GlobalSettings::from_env`].
    fn settings(&self) -> GlobalSettings;

    /// Wraps `connection` into the library's matching database implementation.
    ///
    /// # Errors
    /// Failures talking to the database should be reported as
    /// [`ErrorKind::SqlError`](crate::errors::ErrorKind::SqlError).
    fn find_database(&self, connection: &DatabaseConnection) -> SchemabootResult<Database>;

    /// Opens a session applying the changelog at `change_log_path`, resolved
    /// through `resource_loader`, to `database`.
    fn open_session(
        &self,
        change_log_path: &str,
        resource_loader: &ResourceLoader,
        database: &Database,
    ) -> SchemabootResult<Box<dyn MigrationSession>>;
}

/// Shared handle to a [`MigrationBackendProvider`].
#[derive(Clone)]
pub struct MigrationBackend {
    inner: Arc<dyn MigrationBackendProvider>,
}

impl MigrationBackend {
    pub fn new<T: MigrationBackendProvider + 'static>(inner: T) -> Self {
        MigrationBackend { inner: Arc::new(inner) }
    }

    /// Wraps an already shared provider, e.g. one a test keeps inspecting.
    pub fn from_arc(inner: Arc<dyn MigrationBackendProvider>) -> Self {
        MigrationBackend { inner }
    }
}

impl Deref for MigrationBackend {
    type Target = Arc<dyn MigrationBackendProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Debug for MigrationBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MigrationBackend({} {})", self.inner.name(), self.inner.version())
    }
}

/// The migration library's view of one database.
pub trait DatabaseProvider: Send + Sync {
    /// The connection this database was detected on.
    fn connection(&self) -> DatabaseConnection;

    /// Releases the database and its connection.
    fn close(&self) -> SchemabootResult<()>;
}

/// Shared handle to a [`DatabaseProvider`].
#[derive(Clone)]
pub struct Database {
    inner: Arc<dyn DatabaseProvider>,
}

impl Database {
    pub fn new<T: DatabaseProvider + 'static>(inner: T) -> Self {
        Database { inner: Arc::new(inner) }
    }
}

impl Deref for Database {
    type Target = Arc<dyn DatabaseProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Debug for Database {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// One changelog being applied to one database.
///
/// Sessions are owned by the engine for the duration of a single target and
/// always closed afterwards, whether the update succeeded or not.
pub trait MigrationSession: Send {
    /// Sets a value substituted into changeset placeholders.
    fn set_parameter(&mut self, key: &str, value: &str);

    /// Drops every object of the database schema.
    fn drop_all(&mut self) -> SchemabootResult<()>;

    /// Applies every pending changeset matching `contexts` and `labels`.
    ///
    /// Empty filters match every changeset.
    fn update(&mut self, contexts: &BTreeSet<String>, labels: &BTreeSet<String>) -> SchemabootResult<()>;

    /// Releases resources held by the session.
    fn close(&mut self) -> SchemabootResult<()>;
}

/// Applies every parameter of `parameters` to `session`.
pub(crate) fn apply_parameters(session: &mut dyn MigrationSession, parameters: &BTreeMap<String, String>) {
    for (key, value) in parameters {
        session.set_parameter(key, value);
    }
}
