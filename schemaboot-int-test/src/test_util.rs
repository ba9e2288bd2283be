//! A scripted, in-memory migration library for driving the engine end to end.
//!
//! Changelogs use a small line based format:
//!
//! ```text
//! # comment
//! --changeset 1 context:dev,test labels:v1
//! CREATE TABLE ${table}
//! INSERT INTO ${table}
//! ```
//!
//! Understood statements are `CREATE TABLE`, `DROP TABLE` and `INSERT INTO`.
//! `${name}` placeholders are replaced with session parameters.

use parking_lot::{Condvar, Mutex};
use schemaboot::backend::{Database, DatabaseProvider, MigrationBackend, MigrationBackendProvider, MigrationSession};
use schemaboot::common::split_tags;
use schemaboot::database::{
    ConnectionSource, ConnectionSourceProvider, DatabaseConnection, DatabaseConnectionProvider, ResourceLoader,
    StaticResourceLoader,
};
use schemaboot::errors::{ErrorKind, SchemabootError, SchemabootResult};
use schemaboot::settings::GlobalSettings;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// One parsed changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub id: String,
    pub contexts: BTreeSet<String>,
    pub labels: BTreeSet<String>,
    pub statements: Vec<String>,
}

impl ChangeSet {
    /// Empty filters match everything, and so does a changeset without tags.
    fn matches(&self, contexts: &BTreeSet<String>, labels: &BTreeSet<String>) -> bool {
        fn accepts(filter: &BTreeSet<String>, tags: &BTreeSet<String>) -> bool {
            filter.is_empty() || tags.is_empty() || !filter.is_disjoint(tags)
        }
        accepts(contexts, &self.contexts) && accepts(labels, &self.labels)
    }
}

/// Parses a changelog in the scripted format.
pub fn parse_change_log(path: &str, text: &str) -> SchemabootResult<Vec<ChangeSet>> {
    let mut change_sets: Vec<ChangeSet> = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix("--changeset") {
            let mut parts = header.split_whitespace();
            let id = parts.next().ok_or_else(|| invalid(path, number, "changeset without id"))?;
            if change_sets.iter().any(|c| c.id == id) {
                return Err(invalid(path, number, &format!("duplicate changeset {}", id)));
            }

            let mut change_set = ChangeSet {
                id: id.to_string(),
                contexts: BTreeSet::new(),
                labels: BTreeSet::new(),
                statements: Vec::new(),
            };
            for attribute in parts {
                if let Some(value) = attribute.strip_prefix("context:") {
                    change_set.contexts.extend(split_tags(value));
                } else if let Some(value) = attribute.strip_prefix("labels:") {
                    change_set.labels.extend(split_tags(value));
                } else {
                    return Err(invalid(path, number, &format!("unknown attribute {}", attribute)));
                }
            }
            change_sets.push(change_set);
            continue;
        }

        match change_sets.last_mut() {
            Some(change_set) => change_set.statements.push(line.to_string()),
            None => return Err(invalid(path, number, "statement outside of a changeset")),
        }
    }
    Ok(change_sets)
}

fn invalid(path: &str, number: usize, reason: &str) -> SchemabootError {
    SchemabootError::new(
        &format!("Invalid changelog {} at line {}: {}", path, number + 1, reason),
        ErrorKind::MigrationError,
    )
}

fn substitute(statement: &str, parameters: &BTreeMap<String, String>) -> String {
    let mut result = statement.to_string();
    for (key, value) in parameters {
        result = result.replace(&format!("${{{}}}", key), value);
    }
    result
}

#[derive(Default)]
struct ServerState {
    tables: BTreeMap<String, usize>,
    history: Vec<String>,
    unavailable: bool,
    manual_commit: bool,
    opened: usize,
    closed: usize,
    rollbacks: usize,
    connections: Vec<DatabaseConnection>,
}

impl ServerState {
    fn execute(&mut self, statement: &str) -> Result<(), String> {
        let words: Vec<&str> = statement.split_whitespace().collect();
        match words.as_slice() {
            [create, table, name] if is(create, "CREATE") && is(table, "TABLE") => {
                if self.tables.contains_key(*name) {
                    return Err(format!("table {} already exists", name));
                }
                self.tables.insert(name.to_string(), 0);
                Ok(())
            }
            [drop, table, name] if is(drop, "DROP") && is(table, "TABLE") => self
                .tables
                .remove(*name)
                .map(|_| ())
                .ok_or_else(|| format!("table {} does not exist", name)),
            [insert, into, name] if is(insert, "INSERT") && is(into, "INTO") => self
                .tables
                .get_mut(*name)
                .map(|rows| *rows += 1)
                .ok_or_else(|| format!("table {} does not exist", name)),
            _ => Err(format!("unsupported statement '{}'", statement)),
        }
    }
}

fn is(word: &str, keyword: &str) -> bool {
    word.eq_ignore_ascii_case(keyword)
}

struct ServerInner {
    name: String,
    state: Mutex<ServerState>,
}

/// An in-memory database reachable through a connection source.
#[derive(Clone)]
pub struct MemoryDatabaseServer {
    inner: Arc<ServerInner>,
}

impl MemoryDatabaseServer {
    pub fn new(name: &str) -> Self {
        MemoryDatabaseServer {
            inner: Arc::new(ServerInner {
                name: name.to_string(),
                state: Mutex::new(ServerState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// A connection source handing out connections to this server.
    pub fn connection_source(&self) -> ConnectionSource {
        ConnectionSource::new(self.clone())
    }

    /// While unavailable, asking for a connection fails with a SQL error.
    pub fn set_available(&self, available: bool) {
        self.inner.state.lock().unavailable = !available;
    }

    /// Whether new connections are in auto-commit mode.
    pub fn set_auto_commit(&self, auto_commit: bool) {
        self.inner.state.lock().manual_commit = !auto_commit;
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.inner.state.lock().tables.contains_key(name)
    }

    pub fn tables(&self) -> Vec<String> {
        self.inner.state.lock().tables.keys().cloned().collect()
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.inner.state.lock().tables.get(table).copied()
    }

    /// Ids of the applied changesets, in the order they were applied.
    pub fn history(&self) -> Vec<String> {
        self.inner.state.lock().history.clone()
    }

    pub fn connections_opened(&self) -> usize {
        self.inner.state.lock().opened
    }

    pub fn connections_closed(&self) -> usize {
        self.inner.state.lock().closed
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.state.lock().rollbacks
    }

    fn owns(&self, connection: &DatabaseConnection) -> bool {
        self.inner
            .state
            .lock()
            .connections
            .iter()
            .any(|c| c.same_as(connection))
    }
}

impl ConnectionSourceProvider for MemoryDatabaseServer {
    fn connection(&self) -> SchemabootResult<Option<DatabaseConnection>> {
        let mut state = self.inner.state.lock();
        if state.unavailable {
            return Err(SchemabootError::new(
                &format!("Database {} is not reachable", self.inner.name),
                ErrorKind::SqlError,
            ));
        }

        let connection = DatabaseConnection::new(MemoryConnection {
            server: Arc::downgrade(&self.inner),
            closed: AtomicBool::new(false),
            auto_commit: !state.manual_commit,
        });
        state.opened += 1;
        state.connections.push(connection.clone());
        Ok(Some(connection))
    }
}

struct MemoryConnection {
    server: Weak<ServerInner>,
    closed: AtomicBool,
    auto_commit: bool,
}

impl DatabaseConnectionProvider for MemoryConnection {
    fn is_closed(&self) -> SchemabootResult<bool> {
        Ok(self.closed.load(Ordering::SeqCst))
    }

    fn auto_commit(&self) -> SchemabootResult<bool> {
        Ok(self.auto_commit)
    }

    fn rollback(&self) -> SchemabootResult<()> {
        if let Some(server) = self.server.upgrade() {
            server.state.lock().rollbacks += 1;
        }
        Ok(())
    }

    fn close(&self) -> SchemabootResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Some(server) = self.server.upgrade() {
                server.state.lock().closed += 1;
            }
        }
        Ok(())
    }
}

struct MemoryDatabase {
    server: MemoryDatabaseServer,
    connection: DatabaseConnection,
}

impl DatabaseProvider for MemoryDatabase {
    fn connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    fn close(&self) -> SchemabootResult<()> {
        log::debug!("Closing database {}", self.server.name());
        self.connection.close()
    }
}

/// Holds updates until opened, so tests can observe a running engine.
#[derive(Clone, Default)]
pub struct UpdateGate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

#[derive(Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

impl UpdateGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (state, condvar) = &*self.inner;
        state.lock().open = true;
        condvar.notify_all();
    }

    /// Number of updates currently held at the gate.
    pub fn waiting(&self) -> usize {
        self.inner.0.lock().waiting
    }

    fn pass(&self) {
        let (state, condvar) = &*self.inner;
        let mut state = state.lock();
        state.waiting += 1;
        while !state.open {
            condvar.wait(&mut state);
        }
        state.waiting -= 1;
    }
}

/// Counts what the scripted library did.
#[derive(Default)]
pub struct BackendStats {
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    updates: AtomicUsize,
    drops: AtomicUsize,
}

impl BackendStats {
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

/// Migration library working on [`MemoryDatabaseServer`]s.
pub struct ScriptedBackend {
    servers: Vec<MemoryDatabaseServer>,
    settings: GlobalSettings,
    gate: Option<UpdateGate>,
    stats: Arc<BackendStats>,
}

impl ScriptedBackend {
    /// Creates a backend whose settings come from the environment.
    pub fn new() -> Self {
        ScriptedBackend {
            servers: Vec::new(),
            settings: GlobalSettings::from_env(),
            gate: None,
            stats: Arc::new(BackendStats::default()),
        }
    }

    pub fn with_server(mut self, server: &MemoryDatabaseServer) -> Self {
        self.servers.push(server.clone());
        self
    }

    pub fn with_settings(mut self, settings: GlobalSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_gate(mut self, gate: &UpdateGate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    pub fn stats(&self) -> Arc<BackendStats> {
        self.stats.clone()
    }

    fn server_of(&self, connection: &DatabaseConnection) -> SchemabootResult<MemoryDatabaseServer> {
        self.servers
            .iter()
            .find(|server| server.owns(connection))
            .cloned()
            .ok_or_else(|| {
                SchemabootError::new(
                    "No database implementation matches the connection",
                    ErrorKind::SqlError,
                )
            })
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationBackendProvider for ScriptedBackend {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn version(&self) -> String {
        "0.1.0".to_string()
    }

    fn settings(&self) -> GlobalSettings {
        self.settings.clone()
    }

    fn find_database(&self, connection: &DatabaseConnection) -> SchemabootResult<Database> {
        if connection.is_closed()? {
            return Err(SchemabootError::new("Connection is closed", ErrorKind::SqlError));
        }
        let server = self.server_of(connection)?;
        Ok(Database::new(MemoryDatabase {
            server,
            connection: connection.clone(),
        }))
    }

    fn open_session(
        &self,
        change_log_path: &str,
        resource_loader: &ResourceLoader,
        database: &Database,
    ) -> SchemabootResult<Box<dyn MigrationSession>> {
        let connection = database.connection();
        let server = self.server_of(&connection)?;
        let text = resource_loader.load(change_log_path)?;
        let change_sets = parse_change_log(change_log_path, &text)?;

        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            change_log_path: change_log_path.to_string(),
            change_sets,
            server,
            connection,
            parameters: BTreeMap::new(),
            gate: self.gate.clone(),
            stats: self.stats.clone(),
        }))
    }
}

struct ScriptedSession {
    change_log_path: String,
    change_sets: Vec<ChangeSet>,
    server: MemoryDatabaseServer,
    connection: DatabaseConnection,
    parameters: BTreeMap<String, String>,
    gate: Option<UpdateGate>,
    stats: Arc<BackendStats>,
}

impl ScriptedSession {
    fn ensure_open(&self) -> SchemabootResult<()> {
        if self.connection.is_closed()? {
            return Err(SchemabootError::new("Connection is closed", ErrorKind::SqlError));
        }
        Ok(())
    }
}

impl MigrationSession for ScriptedSession {
    fn set_parameter(&mut self, key: &str, value: &str) {
        self.parameters.insert(key.to_string(), value.to_string());
    }

    fn drop_all(&mut self) -> SchemabootResult<()> {
        self.ensure_open()?;
        self.stats.drops.fetch_add(1, Ordering::SeqCst);
        let mut state = self.server.inner.state.lock();
        state.tables.clear();
        state.history.clear();
        Ok(())
    }

    fn update(&mut self, contexts: &BTreeSet<String>, labels: &BTreeSet<String>) -> SchemabootResult<()> {
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        self.ensure_open()?;
        self.stats.updates.fetch_add(1, Ordering::SeqCst);

        let mut state = self.server.inner.state.lock();
        for change_set in &self.change_sets {
            if state.history.contains(&change_set.id) || !change_set.matches(contexts, labels) {
                continue;
            }
            for statement in &change_set.statements {
                let statement = substitute(statement, &self.parameters);
                state.execute(&statement).map_err(|reason| {
                    SchemabootError::new(
                        &format!(
                            "Changeset {} of {} failed: {}",
                            change_set.id, self.change_log_path, reason
                        ),
                        ErrorKind::MigrationError,
                    )
                })?;
            }
            log::debug!("Applied changeset {} to {}", change_set.id, self.server.name());
            state.history.push(change_set.id.clone());
        }
        Ok(())
    }

    fn close(&mut self) -> SchemabootResult<()> {
        self.stats.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Everything a test needs to migrate one in-memory database.
pub struct TestContext {
    server: MemoryDatabaseServer,
    loader: ResourceLoader,
}

impl TestContext {
    pub fn server(&self) -> &MemoryDatabaseServer {
        &self.server
    }

    pub fn loader(&self) -> &ResourceLoader {
        &self.loader
    }

    /// A backend knowing the context's server, plus its statistics.
    pub fn backend(&self) -> (MigrationBackend, Arc<BackendStats>) {
        let backend = ScriptedBackend::new().with_server(&self.server);
        let stats = backend.stats();
        (MigrationBackend::new(backend), stats)
    }
}

/// Changelog creating a `person` table, used by most tests.
pub const PERSON_CHANGE_LOG: &str = "\
# people
--changeset 1
CREATE TABLE person
--changeset 2 context:dev
INSERT INTO person
--changeset 3 labels:audit
CREATE TABLE ${audit_table}
";

pub fn create_test_context() -> SchemabootResult<TestContext> {
    let loader = StaticResourceLoader::builder()
        .with_resource("db/person.txt", PERSON_CHANGE_LOG)
        .build();
    Ok(TestContext {
        server: MemoryDatabaseServer::new("memdb"),
        loader: ResourceLoader::new(loader),
    })
}

/// Runs `test` against a fresh context and fails the test on error.
pub fn run_test<T>(test: T)
where
    T: FnOnce(TestContext) -> SchemabootResult<()>,
{
    let result = create_test_context().and_then(test);
    if let Err(err) = result {
        panic!("Test failed: {:?}", err);
    }
}
