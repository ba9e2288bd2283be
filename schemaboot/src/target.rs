//! Description of one database to migrate.

use crate::common::{collect_tags, split_tags};
use crate::database::{default_resource_loader, ConnectionSource, ResourceLoader};
use crate::errors::{ErrorKind, SchemabootError, SchemabootResult};
use crate::DEFAULT_CHANGE_LOG_PATH;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter};

/// One migration unit: a connection source, a changelog and its options.
///
/// Targets are immutable once built. Equality and hashing are structural
/// over every field; the connection source and resource loader compare by
/// identity.
///
/// # Examples
///
/// ```rust,ignore
/// use schemaboot::target::MigrationTarget;
///
/// let target = MigrationTarget::builder(connection_source)
///     .with_change_log_path("db/changeLog.xml")
///     .add_context("prod")
///     .add_parameter("schema", "app")
///     .build()?;
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MigrationTarget {
    connection_source: ConnectionSource,
    change_log_path: String,
    resource_loader: ResourceLoader,
    drop_first: bool,
    should_run: bool,
    contexts: BTreeSet<String>,
    labels: BTreeSet<String>,
    parameters: BTreeMap<String, String>,
}

impl MigrationTarget {
    /// Creates a builder seeded with defaults, see [`MigrationTargetBuilder::of`].
    pub fn builder(connection_source: ConnectionSource) -> MigrationTargetBuilder {
        MigrationTargetBuilder::of(connection_source)
    }

    pub fn connection_source(&self) -> &ConnectionSource {
        &self.connection_source
    }

    pub fn change_log_path(&self) -> &str {
        &self.change_log_path
    }

    pub fn resource_loader(&self) -> &ResourceLoader {
        &self.resource_loader
    }

    pub fn drop_first(&self) -> bool {
        self.drop_first
    }

    pub fn should_run(&self) -> bool {
        self.should_run
    }

    pub fn contexts(&self) -> &BTreeSet<String> {
        &self.contexts
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }
}

// connection source and resource loader are not printed
impl Display for MigrationTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MigrationTarget{{changeLogPath={}, dropFirst={}, shouldRun={}, contexts={:?}, labels={:?}, parameters={:?}}}",
            self.change_log_path, self.drop_first, self.should_run, self.contexts, self.labels, self.parameters
        )
    }
}

impl Debug for MigrationTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationTarget")
            .field("change_log_path", &self.change_log_path)
            .field("drop_first", &self.drop_first)
            .field("should_run", &self.should_run)
            .field("contexts", &self.contexts)
            .field("labels", &self.labels)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Builder for [`MigrationTarget`].
///
/// Setters never fail; validation happens in [`MigrationTargetBuilder::build`].
#[derive(Clone, PartialEq)]
pub struct MigrationTargetBuilder {
    connection_source: ConnectionSource,
    change_log_path: String,
    resource_loader: Option<ResourceLoader>,
    drop_first: bool,
    should_run: bool,
    contexts: BTreeSet<String>,
    labels: BTreeSet<String>,
    parameters: BTreeMap<String, String>,
}

impl MigrationTargetBuilder {
    /// Creates a builder for `connection_source` with default settings:
    ///
    /// - changelog at [`DEFAULT_CHANGE_LOG_PATH`]
    /// - the shared [`default_resource_loader`]
    /// - `drop_first = false`, `should_run = true`
    /// - no contexts, labels or parameters
    pub fn of(connection_source: ConnectionSource) -> Self {
        MigrationTargetBuilder {
            connection_source,
            change_log_path: DEFAULT_CHANGE_LOG_PATH.to_string(),
            resource_loader: Some(default_resource_loader()),
            drop_first: false,
            should_run: true,
            contexts: BTreeSet::new(),
            labels: BTreeSet::new(),
            parameters: BTreeMap::new(),
        }
    }

    /// Creates an independent copy of `builder`.
    ///
    /// Collections are copied element by element into fresh containers, so
    /// changing the copy never changes `builder`.
    pub fn copy_of(builder: &MigrationTargetBuilder) -> Self {
        let mut copy = MigrationTargetBuilder::of(builder.connection_source.clone())
            .with_change_log_path(&builder.change_log_path)
            .with_resource_loader(builder.resource_loader.clone())
            .with_drop_first(builder.drop_first)
            .with_should_run(builder.should_run);
        for context in &builder.contexts {
            copy = copy.add_context(context);
        }
        for label in &builder.labels {
            copy = copy.add_label(label);
        }
        for (key, value) in &builder.parameters {
            copy = copy.add_parameter(key, value);
        }
        copy
    }

    pub fn with_change_log_path(mut self, change_log_path: &str) -> Self {
        self.change_log_path = change_log_path.to_string();
        self
    }

    /// Sets the loader resolving the changelog. `None` clears it, which
    /// makes [`build`](Self::build) fail.
    pub fn with_resource_loader(mut self, resource_loader: impl Into<Option<ResourceLoader>>) -> Self {
        self.resource_loader = resource_loader.into();
        self
    }

    pub fn with_drop_first(mut self, drop_first: bool) -> Self {
        self.drop_first = drop_first;
        self
    }

    pub fn with_should_run(mut self, should_run: bool) -> Self {
        self.should_run = should_run;
        self
    }

    /// Replaces the contexts. Every value may be a comma separated list.
    pub fn with_contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.contexts = collect_tags(contexts);
        self
    }

    /// Adds contexts from a comma separated list; blanks are skipped.
    pub fn add_context(mut self, context: &str) -> Self {
        self.contexts.extend(split_tags(context));
        self
    }

    /// Replaces the labels. Every value may be a comma separated list.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.labels = collect_tags(labels);
        self
    }

    /// Adds labels from a comma separated list; blanks are skipped.
    pub fn add_label(mut self, label: &str) -> Self {
        self.labels.extend(split_tags(label));
        self
    }

    /// Replaces the parameters. Entries with an empty key are dropped.
    pub fn with_parameters<I, K, V>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.parameters.clear();
        for (key, value) in parameters {
            self = self.add_parameter(key.as_ref(), value.as_ref());
        }
        self
    }

    /// Adds one changeset parameter.
    ///
    /// An empty key is silently ignored rather than rejected, so parameters
    /// read from loosely filled configuration files do not break startup.
    pub fn add_parameter(mut self, key: &str, value: &str) -> Self {
        if !key.is_empty() {
            self.parameters.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Validates the settings and builds the target.
    ///
    /// # Errors
    /// - [`ErrorKind::InvalidArgument`] if the changelog path is empty
    /// - [`ErrorKind::MissingDependency`] if the resource loader was cleared
    pub fn build(&self) -> SchemabootResult<MigrationTarget> {
        if self.change_log_path.is_empty() {
            log::error!("Migration target without changelog path");
            return Err(SchemabootError::new(
                "changeLogPath must be defined.",
                ErrorKind::InvalidArgument,
            ));
        }
        let resource_loader = self.resource_loader.clone().ok_or_else(|| {
            log::error!("Migration target without resource loader");
            SchemabootError::new("resourceLoader must be defined.", ErrorKind::MissingDependency)
        })?;

        Ok(MigrationTarget {
            connection_source: self.connection_source.clone(),
            change_log_path: self.change_log_path.clone(),
            resource_loader,
            drop_first: self.drop_first,
            should_run: self.should_run,
            contexts: self.contexts.clone(),
            labels: self.labels.clone(),
            parameters: self.parameters.clone(),
        })
    }
}
