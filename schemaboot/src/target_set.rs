//! The collection of targets an engine migrates.

use crate::errors::{ErrorKind, SchemabootError, SchemabootResult};
use crate::target::MigrationTarget;
use indexmap::IndexSet;
use std::fmt::{Debug, Formatter};

/// Immutable, deduplicated set of [`MigrationTarget`]s.
///
/// Targets equal by value collapse into one. Iteration follows insertion
/// order, which is also the order in which the engine migrates them;
/// equality of two sets ignores order.
///
/// A set may be empty; the engine refuses an empty set when it is created.
#[derive(Clone, PartialEq, Eq)]
pub struct MigrationTargetSet {
    targets: IndexSet<MigrationTarget>,
}

impl MigrationTargetSet {
    /// Creates an empty builder, see [`MigrationTargetSetBuilder::of`].
    pub fn builder() -> MigrationTargetSetBuilder {
        MigrationTargetSetBuilder::of()
    }

    pub fn targets(&self) -> &IndexSet<MigrationTarget> {
        &self.targets
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationTarget> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl<'a> IntoIterator for &'a MigrationTargetSet {
    type Item = &'a MigrationTarget;
    type IntoIter = indexmap::set::Iter<'a, MigrationTarget>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}

impl Debug for MigrationTargetSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationTargetSet")
            .field("targets", &self.targets)
            .finish()
    }
}

/// Builder for [`MigrationTargetSet`].
///
/// Absent targets (`None`) are rejected with [`ErrorKind::MissingDependency`]
/// as soon as they are offered.
#[derive(Clone, Default)]
pub struct MigrationTargetSetBuilder {
    targets: IndexSet<MigrationTarget>,
}

impl MigrationTargetSetBuilder {
    /// Creates an empty builder.
    pub fn of() -> Self {
        MigrationTargetSetBuilder {
            targets: IndexSet::new(),
        }
    }

    /// Creates a builder seeded with `target`.
    pub fn of_target(target: impl Into<Option<MigrationTarget>>) -> SchemabootResult<Self> {
        MigrationTargetSetBuilder::of().with_target(target)
    }

    /// Adds one target.
    pub fn with_target(mut self, target: impl Into<Option<MigrationTarget>>) -> SchemabootResult<Self> {
        let target = target.into().ok_or_else(missing_target)?;
        self.targets.insert(target);
        Ok(self)
    }

    /// Adds every target of `targets`.
    ///
    /// The call is all-or-nothing: elements are staged and validated first,
    /// so a `None` anywhere rejects the call before any element is added.
    pub fn with_targets<C, T>(mut self, targets: C) -> SchemabootResult<Self>
    where
        C: Into<Option<Vec<T>>>,
        T: Into<Option<MigrationTarget>>,
    {
        let targets = targets.into().ok_or_else(|| {
            log::error!("Migration target collection is missing");
            SchemabootError::new(
                "Migration target collection must be defined.",
                ErrorKind::MissingDependency,
            )
        })?;

        let mut staged = Vec::with_capacity(targets.len());
        for target in targets {
            staged.push(target.into().ok_or_else(missing_target)?);
        }
        self.targets.extend(staged);
        Ok(self)
    }

    /// Builds an immutable snapshot of the targets added so far.
    pub fn build(&self) -> MigrationTargetSet {
        MigrationTargetSet {
            targets: self.targets.clone(),
        }
    }
}

fn missing_target() -> SchemabootError {
    log::error!("Migration target is missing");
    SchemabootError::new("Migration target must be defined.", ErrorKind::MissingDependency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ConnectionSource, ConnectionSourceProvider, DatabaseConnection};

    struct NoConnection;

    impl ConnectionSourceProvider for NoConnection {
        fn connection(&self) -> SchemabootResult<Option<DatabaseConnection>> {
            Ok(None)
        }
    }

    fn target(path: &str) -> MigrationTarget {
        MigrationTarget::builder(ConnectionSource::new(NoConnection))
            .with_change_log_path(path)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_builder() {
        let set = MigrationTargetSet::builder().build();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_of_target_round_trip() {
        let target = target("a.xml");
        let set = MigrationTargetSetBuilder::of_target(target.clone()).unwrap().build();

        assert_eq!(set.len(), 1);
        assert!(set.targets().contains(&target));
    }

    #[test]
    fn test_of_target_rejects_none() {
        let err = MigrationTargetSetBuilder::of_target(None).err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::MissingDependency);
    }

    #[test]
    fn test_with_target_rejects_none() {
        let err = MigrationTargetSetBuilder::of().with_target(None).err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::MissingDependency);
    }

    #[test]
    fn test_duplicates_collapse() {
        let target = target("a.xml");
        let set = MigrationTargetSetBuilder::of_target(target.clone())
            .and_then(|b| b.with_target(target.clone()))
            .and_then(|b| b.with_targets(vec![target.clone(), target]))
            .unwrap()
            .build();

        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_with_targets_keeps_insertion_order() {
        let set = MigrationTargetSet::builder()
            .with_targets(vec![target("c.xml"), target("a.xml"), target("b.xml")])
            .unwrap()
            .build();

        let paths: Vec<&str> = set.iter().map(|t| t.change_log_path()).collect();
        assert_eq!(paths, vec!["c.xml", "a.xml", "b.xml"]);
    }

    #[test]
    fn test_with_targets_rejects_missing_collection() {
        let err = MigrationTargetSet::builder()
            .with_targets(None::<Vec<MigrationTarget>>)
            .err()
            .unwrap();
        assert_eq!(err.kind(), &ErrorKind::MissingDependency);
    }

    #[test]
    fn test_with_targets_rejects_missing_element() {
        let err = MigrationTargetSet::builder()
            .with_target(target("seed.xml"))
            .unwrap()
            .with_targets(vec![Some(target("a.xml")), None, Some(target("b.xml"))])
            .err()
            .unwrap();

        assert_eq!(err.kind(), &ErrorKind::MissingDependency);
        assert!(err.message().contains("Migration target must be defined."));
    }

    #[test]
    fn test_with_targets_accepts_options() {
        let set = MigrationTargetSet::builder()
            .with_targets(vec![Some(target("a.xml")), Some(target("b.xml"))])
            .unwrap()
            .build();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_build_is_a_snapshot() {
        let builder = MigrationTargetSet::builder().with_target(target("a.xml")).unwrap();
        let first = builder.build();
        let builder = builder.with_target(target("b.xml")).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(builder.build().len(), 2);
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = target("a.xml");
        let b = target("b.xml");
        let first = MigrationTargetSet::builder()
            .with_targets(vec![a.clone(), b.clone()])
            .unwrap()
            .build();
        let second = MigrationTargetSet::builder().with_targets(vec![b, a]).unwrap().build();

        assert_eq!(first, second);
    }
}
