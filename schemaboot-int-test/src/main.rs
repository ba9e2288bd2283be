use schemaboot::backend::MigrationBackend;
use schemaboot::database::{FileSystemResourceLoader, ResourceLoader};
use schemaboot::errors::SchemabootResult;
use schemaboot::module::{BindingKey, MigrationModule, TARGET_SET_KEY};
use schemaboot::target::MigrationTarget;
use schemaboot::target_set::MigrationTargetSet;
use schemaboot_int_test::test_util::{MemoryDatabaseServer, ScriptedBackend};
use std::collections::HashMap;

fn main() -> SchemabootResult<()> {
    colog::init();
    println!("Starting schemaboot demo...");

    let server = MemoryDatabaseServer::new("demo");
    let loader = ResourceLoader::new(FileSystemResourceLoader::new(env!("CARGO_MANIFEST_DIR")));

    let target = MigrationTarget::builder(server.connection_source())
        .with_change_log_path("changelogs/changeLog.txt")
        .with_resource_loader(loader)
        .add_context("demo")
        .add_parameter("orders_table", "purchase_order")
        .build()?;

    let mut bindings: HashMap<BindingKey, MigrationTargetSet> = HashMap::new();
    bindings.insert(TARGET_SET_KEY, MigrationTargetSet::builder().with_target(target)?.build());

    let backend = MigrationBackend::new(ScriptedBackend::new().with_server(&server));
    let engine = MigrationModule::new(backend).configure(&bindings)?;

    // the application would start its other components here
    engine.process()?;

    println!("Engine state: {}", engine.state());
    println!("Applied changesets: {:?}", server.history());
    for table in server.tables() {
        println!("{}: {} rows", table, server.row_count(&table).unwrap_or_default());
    }
    Ok(())
}
