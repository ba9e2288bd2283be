use crate::errors::{ErrorKind, SchemabootError, SchemabootResult};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};

/// Resolves a changelog path into its content.
///
/// # Purpose
/// The migration library never opens files itself; it asks the resource
/// loader of the migration target. Implementations decide where changelogs
/// live: a directory on disk, content embedded in the binary, a remote store.
pub trait ResourceLoaderProvider: Send + Sync {
    /// Loads the resource at `path`.
    ///
    /// # Errors
    /// [`ErrorKind::ResourceNotFound`] when nothing exists at `path`.
    fn load(&self, path: &str) -> SchemabootResult<String>;

    /// Short human readable description, used in logs.
    fn describe(&self) -> String;
}

/// Shared handle to a [`ResourceLoaderProvider`].
///
/// Like [`ConnectionSource`](crate::database::ConnectionSource), equality
/// follows the identity of the shared provider.
#[derive(Clone)]
pub struct ResourceLoader {
    inner: Arc<dyn ResourceLoaderProvider>,
}

impl ResourceLoader {
    pub fn new<T: ResourceLoaderProvider + 'static>(inner: T) -> Self {
        ResourceLoader { inner: Arc::new(inner) }
    }

    fn address(&self) -> *const () {
        Arc::as_ptr(&self.inner) as *const ()
    }
}

impl Deref for ResourceLoader {
    type Target = Arc<dyn ResourceLoaderProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl PartialEq for ResourceLoader {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for ResourceLoader {}

impl Hash for ResourceLoader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl Debug for ResourceLoader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceLoader({})", self.inner.describe())
    }
}

static DEFAULT_RESOURCE_LOADER: LazyLock<ResourceLoader> =
    LazyLock::new(|| ResourceLoader::new(FileSystemResourceLoader::new(".")));

/// The process wide default loader: changelogs relative to the working
/// directory.
///
/// Every call returns a handle to the same loader, so targets built with
/// default settings compare equal.
pub fn default_resource_loader() -> ResourceLoader {
    DEFAULT_RESOURCE_LOADER.clone()
}

/// Loads changelogs from files below a root directory.
///
/// Paths are interpreted relative to the root; absolute paths and `..`
/// segments are rejected so a changelog can not escape the root.
pub struct FileSystemResourceLoader {
    root: PathBuf,
}

impl FileSystemResourceLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FileSystemResourceLoader {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> SchemabootResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            log::error!("Rejected changelog path outside of {}: {}", self.root.display(), path);
            return Err(SchemabootError::new(
                &format!("Resource path must stay below the loader root: {}", path),
                ErrorKind::InvalidArgument,
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl ResourceLoaderProvider for FileSystemResourceLoader {
    fn load(&self, path: &str) -> SchemabootResult<String> {
        let file = self.resolve(path)?;
        std::fs::read_to_string(&file).map_err(|err| {
            let cause = SchemabootError::from(err);
            SchemabootError::new_with_cause(
                &format!("Cannot read resource {}", file.display()),
                cause.kind().clone(),
                cause,
            )
        })
    }

    fn describe(&self) -> String {
        format!("file system at {}", self.root.display())
    }
}

/// Serves changelogs from memory.
///
/// Useful for changelogs embedded with `include_str!` and for tests.
///
/// # Examples
///
/// ```rust
/// use schemaboot::database::{ResourceLoaderProvider, StaticResourceLoader};
///
/// let loader = StaticResourceLoader::builder()
///     .with_resource("db/changeLog.xml", "<databaseChangeLog/>")
///     .build();
/// assert_eq!(loader.load("db/changeLog.xml").unwrap(), "<databaseChangeLog/>");
/// ```
pub struct StaticResourceLoader {
    resources: HashMap<String, String>,
}

impl StaticResourceLoader {
    pub fn builder() -> StaticResourceLoaderBuilder {
        StaticResourceLoaderBuilder {
            resources: HashMap::new(),
        }
    }
}

impl ResourceLoaderProvider for StaticResourceLoader {
    fn load(&self, path: &str) -> SchemabootResult<String> {
        self.resources.get(path).cloned().ok_or_else(|| {
            SchemabootError::new(
                &format!("No resource registered for {}", path),
                ErrorKind::ResourceNotFound,
            )
        })
    }

    fn describe(&self) -> String {
        format!("{} static resources", self.resources.len())
    }
}

pub struct StaticResourceLoaderBuilder {
    resources: HashMap<String, String>,
}

impl StaticResourceLoaderBuilder {
    pub fn with_resource(mut self, path: &str, content: &str) -> Self {
        self.resources.insert(path.to_string(), content.to_string());
        self
    }

    pub fn build(self) -> StaticResourceLoader {
        StaticResourceLoader {
            resources: self.resources,
        }
    }
}
