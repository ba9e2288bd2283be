//! Startup hook binding the migration engine into application wiring.
//!
//! Applications usually assemble their components in a container. This
//! module only needs one thing from it: the [`MigrationTargetSet`] bound
//! under [`TARGET_SET_KEY`]. [`BindingSource`] is that narrow view, and a
//! plain `HashMap` already implements it.

use crate::backend::MigrationBackend;
use crate::engine::MigrationEngine;
use crate::errors::{ErrorKind, SchemabootError, SchemabootResult};
use crate::target_set::MigrationTargetSet;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Name of a binding in the application's wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingKey {
    name: &'static str,
}

impl BindingKey {
    pub const fn new(name: &'static str) -> Self {
        BindingKey { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Display for BindingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The dedicated key of the migration target set.
pub const TARGET_SET_KEY: BindingKey = BindingKey::new("schemaboot.migration-target-set");

/// Read access to the application's bindings.
pub trait BindingSource {
    /// The target set bound under `key`, if any.
    fn target_set(&self, key: &BindingKey) -> Option<MigrationTargetSet>;
}

impl BindingSource for HashMap<BindingKey, MigrationTargetSet> {
    fn target_set(&self, key: &BindingKey) -> Option<MigrationTargetSet> {
        self.get(key).cloned()
    }
}

/// Creates the migration engine and runs it once during startup.
///
/// Any failure, from a missing binding to a broken changeset, comes back as
/// [`ErrorKind::StartupError`] with the original error as its cause.
/// Startup must not go on after it.
#[derive(Debug, Clone)]
pub struct MigrationModule {
    backend: MigrationBackend,
}

impl MigrationModule {
    pub fn new(backend: MigrationBackend) -> Self {
        MigrationModule { backend }
    }

    /// Builds the engine from the target set bound in `bindings` and applies
    /// every migration.
    ///
    /// Returns the engine so the application can share it. Calling
    /// `configure` again builds a fresh engine, which would migrate again;
    /// keep the returned one instead.
    pub fn configure<B: BindingSource + ?Sized>(&self, bindings: &B) -> SchemabootResult<Arc<MigrationEngine>> {
        let target_set = bindings.target_set(&TARGET_SET_KEY).ok_or_else(|| {
            log::error!("No migration target set is bound under {}", TARGET_SET_KEY);
            SchemabootError::new(
                &format!("Required binding {} is missing.", TARGET_SET_KEY),
                ErrorKind::StartupError,
            )
        })?;

        let engine = MigrationEngine::new(target_set, self.backend.clone()).map_err(startup_error)?;
        let engine = Arc::new(engine);
        engine.process().map_err(startup_error)?;
        Ok(engine)
    }
}

fn startup_error(cause: SchemabootError) -> SchemabootError {
    log::error!("Schema migration failed during startup: {}", cause);
    SchemabootError::new_with_cause(
        &format!("Schema migration failed during startup: {}", cause),
        ErrorKind::StartupError,
        cause,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RunState;
    use crate::engine::tests::{recording_source, Call, CallLog, RecordingBackend, SourceBehavior};
    use crate::target::MigrationTarget;

    fn bindings(set: MigrationTargetSet) -> HashMap<BindingKey, MigrationTargetSet> {
        let mut bindings = HashMap::new();
        bindings.insert(TARGET_SET_KEY, set);
        bindings
    }

    #[test]
    fn test_binding_key() {
        let key = BindingKey::new("a");
        assert_eq!(key.name(), "a");
        assert_eq!(key.to_string(), "a");
        assert_ne!(key, TARGET_SET_KEY);
    }

    #[test]
    fn test_configure_runs_migrations_once() {
        let log = CallLog::default();
        let (source, handle) = recording_source("main", &log, SourceBehavior::Connect { auto_commit: true });
        let set = MigrationTargetSet::builder()
            .with_target(MigrationTarget::builder(handle).build().unwrap())
            .unwrap()
            .build();
        let module = MigrationModule::new(MigrationBackend::new(RecordingBackend {
            log: log.clone(),
            ..Default::default()
        }));

        let engine = module.configure(&bindings(set)).unwrap();

        assert_eq!(engine.state(), RunState::Completed);
        assert_eq!(source.calls(), 1);
        engine.process().unwrap();
        assert_eq!(source.calls(), 1);
        assert_eq!(log.lock().iter().filter(|c| matches!(c, Call::Update { .. })).count(), 1);
    }

    #[test]
    fn test_missing_binding_fails_startup() {
        let module = MigrationModule::new(MigrationBackend::new(RecordingBackend::default()));
        let err = module.configure(&HashMap::<BindingKey, MigrationTargetSet>::new()).unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::StartupError);
        assert!(err.message().contains(TARGET_SET_KEY.name()));
    }

    #[test]
    fn test_empty_set_fails_startup() {
        let module = MigrationModule::new(MigrationBackend::new(RecordingBackend::default()));
        let err = module
            .configure(&bindings(MigrationTargetSet::builder().build()))
            .unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::StartupError);
        assert_eq!(err.cause().map(|c| c.kind()), Some(&ErrorKind::InvalidArgument));
        assert!(err.message().contains("Injected configuration set is empty."));
    }

    #[test]
    fn test_migration_failure_fails_startup() {
        let log = CallLog::default();
        let (source, handle) = recording_source("broken", &log, SourceBehavior::Fail);
        let set = MigrationTargetSet::builder()
            .with_target(MigrationTarget::builder(handle).build().unwrap())
            .unwrap()
            .build();
        let module = MigrationModule::new(MigrationBackend::new(RecordingBackend {
            log,
            ..Default::default()
        }));

        let err = module.configure(&bindings(set)).unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::StartupError);
        assert_eq!(err.cause().map(|c| c.kind()), Some(&ErrorKind::MigrationError));
        assert_eq!(err.root_cause().kind(), &ErrorKind::SqlError);
        assert_eq!(source.calls(), 1);
    }
}
