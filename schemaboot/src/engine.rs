//! The run-once migration engine.

use crate::backend::{apply_parameters, Database, MigrationBackend, MigrationSession};
use crate::common::{RunGuard, RunState};
use crate::database::DatabaseConnection;
use crate::errors::{ErrorKind, SchemabootError, SchemabootResult};
use crate::target::MigrationTarget;
use crate::target_set::MigrationTargetSet;
use std::fmt::{Debug, Formatter};

/// Applies the migrations of every target exactly once.
///
/// The engine is meant to be a process wide singleton, created while the
/// application wires itself up (see [`MigrationModule`](crate::module::MigrationModule)).
/// It does not enforce that: two engines over the same targets would both
/// migrate them.
///
/// # Concurrency
/// [`process`](Self::process) never waits for another caller. Whoever finds
/// the engine busy returns immediately without touching any target, and
/// once a run completed every later call is a no-op.
pub struct MigrationEngine {
    target_set: MigrationTargetSet,
    backend: MigrationBackend,
    guard: RunGuard,
}

impl MigrationEngine {
    /// Creates an engine for `target_set`.
    ///
    /// # Errors
    /// [`ErrorKind::InvalidArgument`] if the set holds no target.
    pub fn new(target_set: MigrationTargetSet, backend: MigrationBackend) -> SchemabootResult<Self> {
        log::info!(
            "Creating MigrationEngine for {} {}",
            backend.name(),
            backend.version()
        );
        if target_set.is_empty() {
            log::error!("Cannot create MigrationEngine without migration targets");
            return Err(SchemabootError::new(
                "Injected configuration set is empty.",
                ErrorKind::InvalidArgument,
            ));
        }

        Ok(MigrationEngine {
            target_set,
            backend,
            guard: RunGuard::new(),
        })
    }

    pub fn target_set(&self) -> &MigrationTargetSet {
        &self.target_set
    }

    pub fn state(&self) -> RunState {
        self.guard.state()
    }

    /// Runs the migrations of all targets, once per engine lifetime.
    ///
    /// The first failing target aborts the run and its error is returned.
    /// The run still counts as completed, so a failed run is not repeated.
    pub fn process(&self) -> SchemabootResult<()> {
        let mut ticket = match self.guard.try_enter() {
            Some(ticket) => ticket,
            None => {
                log::warn!("Migrations are already being applied by another caller.");
                return Ok(());
            }
        };

        if ticket.has_run() {
            log::warn!("Migrations were already applied.");
            return Ok(());
        }
        ticket.start();

        let settings = self.backend.settings();
        if !settings.should_run() {
            log::warn!(
                "Cannot run migrations because should-run, set by {}, is false.",
                settings.describe_should_run()
            );
            return Ok(());
        }

        for target in &self.target_set {
            self.migrate(target)?;
        }
        Ok(())
    }

    fn migrate(&self, target: &MigrationTarget) -> SchemabootResult<()> {
        if !target.should_run() {
            log::warn!("Skipping {}, should-run is disabled for it.", target);
            return Ok(());
        }

        log::info!("Applying changes for {}", target);
        let mut resources = TargetResources::default();
        let result = self.apply(target, &mut resources);
        resources.release();

        result.map_err(|err| match err.kind() {
            ErrorKind::SqlError | ErrorKind::ConnectionError => {
                log::error!("Problem while talking to the database for {}: {}", target, err);
                SchemabootError::new_with_cause(
                    &format!("Migration of {} failed: {}", target.change_log_path(), err),
                    ErrorKind::MigrationError,
                    err,
                )
            }
            _ => {
                log::error!("Problem while applying changes for {}: {}", target, err);
                err
            }
        })
    }

    fn apply(&self, target: &MigrationTarget, resources: &mut TargetResources) -> SchemabootResult<()> {
        let connection = target.connection_source().connection()?.ok_or_else(|| {
            SchemabootError::new(
                &format!("Connection source returned no connection for {}", target),
                ErrorKind::MissingDependency,
            )
        })?;
        resources.connection = Some(connection.clone());

        let database = self.backend.find_database(&connection)?;
        resources.database = Some(database.clone());

        let session = self.backend.open_session(
            target.change_log_path(),
            target.resource_loader(),
            &database,
        )?;
        let session = resources.session.insert(session);

        apply_parameters(session.as_mut(), target.parameters());
        if target.drop_first() {
            log::warn!("Dropping all database objects before applying {}", target.change_log_path());
            session.drop_all()?;
        }
        session.update(target.contexts(), target.labels())
    }
}

impl Debug for MigrationEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("target_set", &self.target_set)
            .field("backend", &self.backend)
            .field("state", &self.guard.state())
            .finish()
    }
}

/// Everything opened while migrating one target.
#[derive(Default)]
struct TargetResources {
    connection: Option<DatabaseConnection>,
    database: Option<Database>,
    session: Option<Box<dyn MigrationSession>>,
}

impl TargetResources {
    /// Releases what was opened, newest first. Failures are logged and
    /// never returned, so they can not hide the outcome of the migration.
    fn release(self) {
        if let Some(mut session) = self.session {
            if let Err(err) = session.close() {
                log::error!("Failed to close migration session: {:?}", err);
            }
        }

        match (self.database, self.connection) {
            (Some(database), _) => {
                let closed = database.connection().is_closed().unwrap_or_else(|err| {
                    log::error!("Failed to check database connection state: {:?}", err);
                    false
                });
                if !closed {
                    if let Err(err) = database.close() {
                        log::error!("Failed to close database: {:?}", err);
                    }
                }
            }
            (None, Some(connection)) => release_connection(&connection),
            (None, None) => {}
        }
    }
}

fn release_connection(connection: &DatabaseConnection) {
    match connection.is_closed() {
        Ok(true) => return,
        Ok(false) => {}
        Err(err) => log::error!("Failed to check connection state: {:?}", err),
    }

    match connection.auto_commit() {
        Ok(true) => {}
        Ok(false) => {
            if let Err(err) = connection.rollback() {
                log::error!("Failed to roll back connection: {:?}", err);
            }
        }
        Err(err) => log::error!("Failed to read auto-commit mode: {:?}", err),
    }

    if let Err(err) = connection.close() {
        log::error!("Failed to close connection: {:?}", err);
    }
}
