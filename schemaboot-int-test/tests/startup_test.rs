use schemaboot::common::RunState;
use schemaboot::database::{FileSystemResourceLoader, ResourceLoader};
use schemaboot::errors::ErrorKind;
use schemaboot::module::{BindingKey, MigrationModule, TARGET_SET_KEY};
use schemaboot::target::MigrationTarget;
use schemaboot::target_set::MigrationTargetSet;
use schemaboot_int_test::test_util::{run_test, MemoryDatabaseServer, ScriptedBackend};
use schemaboot::backend::MigrationBackend;
use std::collections::HashMap;

#[ctor::ctor]
fn init() {
    colog::init();
}

fn bindings(set: MigrationTargetSet) -> HashMap<BindingKey, MigrationTargetSet> {
    let mut bindings = HashMap::new();
    bindings.insert(TARGET_SET_KEY, set);
    bindings
}

#[test]
fn test_startup_applies_all_matching_changesets() {
    run_test(|ctx| {
        let target = MigrationTarget::builder(ctx.server().connection_source())
            .with_change_log_path("db/person.txt")
            .with_resource_loader(ctx.loader().clone())
            .build()?;
        let (backend, stats) = ctx.backend();

        let engine = MigrationModule::new(backend)
            .configure(&bindings(MigrationTargetSet::builder().with_target(target)?.build()))?;

        assert_eq!(engine.state(), RunState::Completed);
        // no filters: every changeset runs, the placeholder stays unresolved
        assert_eq!(ctx.server().history(), vec!["1", "2", "3"]);
        assert_eq!(ctx.server().row_count("person"), Some(1));
        assert!(ctx.server().has_table("${audit_table}"));
        assert_eq!(stats.sessions_opened(), 1);
        assert_eq!(stats.sessions_closed(), 1);
        assert_eq!(ctx.server().connections_opened(), 1);
        assert_eq!(ctx.server().connections_closed(), 1);
        Ok(())
    });
}

#[test]
fn test_contexts_labels_and_parameters_reach_the_library() {
    run_test(|ctx| {
        let target = MigrationTarget::builder(ctx.server().connection_source())
            .with_change_log_path("db/person.txt")
            .with_resource_loader(ctx.loader().clone())
            .add_context("prod")
            .add_label("audit")
            .add_parameter("audit_table", "person_audit")
            .build()?;
        let (backend, _) = ctx.backend();

        MigrationModule::new(backend)
            .configure(&bindings(MigrationTargetSet::builder().with_target(target)?.build()))?;

        // changeset 2 only runs in the dev context
        assert_eq!(ctx.server().history(), vec!["1", "3"]);
        assert_eq!(ctx.server().tables(), vec!["person", "person_audit"]);
        assert_eq!(ctx.server().row_count("person"), Some(0));
        Ok(())
    });
}

#[test]
fn test_drop_first_rebuilds_schema() {
    run_test(|ctx| {
        let source = ctx.server().connection_source();
        let first = MigrationTarget::builder(source.clone())
            .with_change_log_path("db/person.txt")
            .with_resource_loader(ctx.loader().clone())
            .add_context("dev")
            .add_label("none")
            .build()?;
        let (backend, _) = ctx.backend();
        MigrationModule::new(backend)
            .configure(&bindings(MigrationTargetSet::builder().with_target(first)?.build()))?;
        assert_eq!(ctx.server().row_count("person"), Some(1));

        // a second application start with drop-first
        let second = MigrationTarget::builder(source)
            .with_change_log_path("db/person.txt")
            .with_resource_loader(ctx.loader().clone())
            .with_drop_first(true)
            .add_context("prod")
            .add_label("none")
            .build()?;
        let (backend, stats) = ctx.backend();
        MigrationModule::new(backend)
            .configure(&bindings(MigrationTargetSet::builder().with_target(second)?.build()))?;

        assert_eq!(stats.drops(), 1);
        assert_eq!(ctx.server().history(), vec!["1"]);
        assert_eq!(ctx.server().row_count("person"), Some(0));
        Ok(())
    });
}

#[test]
fn test_second_start_applies_only_new_changesets() {
    run_test(|ctx| {
        let target = MigrationTarget::builder(ctx.server().connection_source())
            .with_change_log_path("db/person.txt")
            .with_resource_loader(ctx.loader().clone())
            .add_context("prod")
            .build()?;
        let set = MigrationTargetSet::builder().with_target(target)?.build();

        let (backend, _) = ctx.backend();
        MigrationModule::new(backend).configure(&bindings(set.clone()))?;
        let (backend, _) = ctx.backend();
        MigrationModule::new(backend).configure(&bindings(set))?;

        // a second engine migrates again, but history keeps changesets unique
        assert_eq!(ctx.server().history(), vec!["1", "3"]);
        assert_eq!(ctx.server().connections_opened(), 2);
        Ok(())
    });
}

#[test]
fn test_two_databases_from_the_file_system() {
    let orders = MemoryDatabaseServer::new("orders");
    let billing = MemoryDatabaseServer::new("billing");
    let loader = ResourceLoader::new(FileSystemResourceLoader::new(env!("CARGO_MANIFEST_DIR")));
    let set = MigrationTargetSet::builder()
        .with_targets(vec![
            MigrationTarget::builder(orders.connection_source())
                .with_change_log_path("changelogs/changeLog.txt")
                .with_resource_loader(loader.clone())
                .add_context("demo")
                .add_parameter("orders_table", "purchase_order")
                .build()
                .unwrap(),
            MigrationTarget::builder(billing.connection_source())
                .with_change_log_path("changelogs/changeLog.txt")
                .with_resource_loader(loader)
                .add_context("test")
                .add_parameter("orders_table", "invoice")
                .build()
                .unwrap(),
        ])
        .unwrap()
        .build();
    let backend = ScriptedBackend::new().with_server(&orders).with_server(&billing);
    let stats = backend.stats();

    MigrationModule::new(MigrationBackend::new(backend))
        .configure(&bindings(set))
        .unwrap();

    assert_eq!(stats.updates(), 2);
    assert_eq!(orders.history(), vec!["1", "2", "3"]);
    assert_eq!(orders.row_count("customer"), Some(2));
    assert_eq!(billing.history(), vec!["1", "2", "4"]);
    assert_eq!(billing.row_count("invoice"), Some(1));
}

#[test]
fn test_missing_changelog_fails_startup() {
    run_test(|ctx| {
        let target = MigrationTarget::builder(ctx.server().connection_source())
            .with_change_log_path("db/missing.txt")
            .with_resource_loader(ctx.loader().clone())
            .build()?;
        let (backend, stats) = ctx.backend();

        let err = MigrationModule::new(backend)
            .configure(&bindings(MigrationTargetSet::builder().with_target(target)?.build()))
            .unwrap_err();

        assert_eq!(err.kind(), &ErrorKind::StartupError);
        assert_eq!(err.root_cause().kind(), &ErrorKind::ResourceNotFound);
        assert_eq!(stats.sessions_opened(), 0);
        // the database was detected before the changelog, it owns the connection
        assert_eq!(ctx.server().connections_closed(), 1);
        Ok(())
    });
}
