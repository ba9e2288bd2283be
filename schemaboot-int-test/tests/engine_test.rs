use schemaboot::backend::MigrationBackend;
use schemaboot::common::RunState;
use schemaboot::engine::MigrationEngine;
use schemaboot::errors::ErrorKind;
use schemaboot::settings::GlobalSettings;
use schemaboot::target::MigrationTarget;
use schemaboot::target_set::MigrationTargetSet;
use schemaboot_int_test::test_util::{run_test, ScriptedBackend, TestContext, UpdateGate};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[ctor::ctor]
fn init() {
    colog::init();
}

fn person_set(ctx: &TestContext) -> MigrationTargetSet {
    let target = MigrationTarget::builder(ctx.server().connection_source())
        .with_change_log_path("db/person.txt")
        .with_resource_loader(ctx.loader().clone())
        .add_context("prod")
        .build()
        .unwrap();
    MigrationTargetSet::builder().with_target(target).unwrap().build()
}

#[test]
fn test_process_is_idempotent() {
    run_test(|ctx| {
        let (backend, stats) = ctx.backend();
        let engine = MigrationEngine::new(person_set(&ctx), backend)?;

        for _ in 0..3 {
            engine.process()?;
        }

        assert_eq!(stats.updates(), 1);
        assert_eq!(ctx.server().connections_opened(), 1);
        assert_eq!(engine.state(), RunState::Completed);
        Ok(())
    });
}

#[test]
fn test_concurrent_callers_migrate_once() {
    run_test(|ctx| {
        let (backend, stats) = ctx.backend();
        let engine = Arc::new(MigrationEngine::new(person_set(&ctx), backend)?);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    engine.process()
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap()?;
        }

        assert_eq!(stats.updates(), 1);
        assert_eq!(ctx.server().connections_opened(), 1);
        assert_eq!(ctx.server().history(), vec!["1", "3"]);
        Ok(())
    });
}

#[test]
fn test_busy_caller_returns_without_waiting() {
    run_test(|ctx| {
        let gate = UpdateGate::new();
        let backend = ScriptedBackend::new().with_server(ctx.server()).with_gate(&gate);
        let stats = backend.stats();
        let engine = Arc::new(MigrationEngine::new(person_set(&ctx), MigrationBackend::new(backend))?);

        let worker = {
            let engine = engine.clone();
            thread::spawn(move || engine.process())
        };
        awaitility::at_most(Duration::from_secs(5)).until(|| gate.waiting() == 1);
        assert_eq!(engine.state(), RunState::Running);

        // returns right away although the first caller is still migrating
        engine.process()?;
        assert_eq!(ctx.server().connections_opened(), 1);
        assert!(ctx.server().history().is_empty());

        gate.open();
        worker.join().unwrap()?;

        assert_eq!(engine.state(), RunState::Completed);
        assert_eq!(stats.updates(), 1);
        assert_eq!(ctx.server().history(), vec!["1", "3"]);
        Ok(())
    });
}

#[test]
fn test_should_run_disabled_leaves_database_alone() {
    run_test(|ctx| {
        let backend = ScriptedBackend::new()
            .with_server(ctx.server())
            .with_settings(GlobalSettings::from_lookup(|_| Some("false".to_string())));
        let engine = MigrationEngine::new(person_set(&ctx), MigrationBackend::new(backend))?;

        engine.process()?;

        assert_eq!(ctx.server().connections_opened(), 0);
        assert!(ctx.server().tables().is_empty());
        assert_eq!(engine.state(), RunState::Completed);
        Ok(())
    });
}

#[test]
fn test_unreachable_database_is_a_migration_error() {
    run_test(|ctx| {
        ctx.server().set_available(false);
        let (backend, stats) = ctx.backend();
        let engine = MigrationEngine::new(person_set(&ctx), backend)?;

        let err = engine.process().unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::MigrationError);
        assert_eq!(err.cause().map(|c| c.kind()), Some(&ErrorKind::SqlError));
        assert_eq!(stats.sessions_opened(), 0);

        // not retried, even once the database is back
        ctx.server().set_available(true);
        engine.process()?;
        assert_eq!(ctx.server().connections_opened(), 0);
        Ok(())
    });
}

#[test]
fn test_unknown_database_rolls_back_raw_connection() {
    run_test(|ctx| {
        ctx.server().set_auto_commit(false);
        // the backend knows no server, so no database is ever detected
        let engine = MigrationEngine::new(person_set(&ctx), MigrationBackend::new(ScriptedBackend::new()))?;

        let err = engine.process().unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::MigrationError);
        assert_eq!(ctx.server().rollbacks(), 1);
        assert_eq!(ctx.server().connections_closed(), 1);
        Ok(())
    });
}

#[test]
fn test_failing_changeset_releases_everything() {
    run_test(|ctx| {
        // the table of changeset 1 already exists
        let target = MigrationTarget::builder(ctx.server().connection_source())
            .with_change_log_path("db/person.txt")
            .with_resource_loader(ctx.loader().clone())
            .add_label("audit")
            .add_parameter("audit_table", "person")
            .build()?;
        let (backend, stats) = ctx.backend();
        let engine = MigrationEngine::new(MigrationTargetSet::builder().with_target(target)?.build(), backend)?;

        let err = engine.process().unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::MigrationError);
        assert!(err.message().contains("Changeset 3"));
        assert_eq!(ctx.server().history(), vec!["1", "2"]);
        assert_eq!(stats.sessions_closed(), 1);
        assert_eq!(ctx.server().connections_closed(), 1);
        assert_eq!(ctx.server().rollbacks(), 0);
        Ok(())
    });
}
