//! # Schemaboot - Schema Migrations at Startup
//!
//! Schemaboot runs the schema migrations of an application exactly once,
//! while the application wires itself up and before any other component
//! touches the database.
//!
//! The migration library itself (changesets, history tracking, drop-all)
//! is not part of this crate. It is plugged in through
//! [`backend::MigrationBackendProvider`], connection pools through
//! [`database::ConnectionSourceProvider`] and changelog lookup through
//! [`database::ResourceLoaderProvider`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use schemaboot::module::{MigrationModule, TARGET_SET_KEY};
//! use schemaboot::target::MigrationTarget;
//! use schemaboot::target_set::MigrationTargetSet;
//! use std::collections::HashMap;
//!
//! # fn main() -> schemaboot::errors::SchemabootResult<()> {
//! let target = MigrationTarget::builder(connection_source)
//!     .with_change_log_path("db/changeLog.xml")
//!     .add_context("production")
//!     .build()?;
//!
//! let mut bindings = HashMap::new();
//! bindings.insert(TARGET_SET_KEY, MigrationTargetSet::builder().with_target(target)?.build());
//!
//! // applies every pending changeset, or fails the startup
//! let engine = MigrationModule::new(backend).configure(&bindings)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - Migrations of an engine run at most once, however often and from
//!   however many threads [`engine::MigrationEngine::process`] is called.
//! - A concurrent caller never blocks. It returns while the first caller
//!   is still migrating.
//! - Every connection, database and session opened for a target is
//!   released, whether the migration succeeded or not.
//!
//! ## Module Organization
//!
//! - [`backend`] - Boundary to the migration library
//! - [`common`] - Run-once guard and tag parsing
//! - [`database`] - Connections, connection sources and resource loaders
//! - [`engine`] - The run-once migration engine
//! - [`errors`] - Error types and result definitions
//! - [`module`] - Startup hook binding the engine into application wiring
//! - [`settings`] - Global settings of the migration library
//! - [`target`] - One migration target and its builder
//! - [`target_set`] - The set of targets an engine migrates

pub mod backend;
pub mod common;
pub mod database;
pub mod engine;
pub mod errors;
pub mod module;
pub mod settings;
pub mod target;
pub mod target_set;

/// Changelog path used when a target does not name one.
pub const DEFAULT_CHANGE_LOG_PATH: &str = "liquibase/changeLog.xml";

/// Environment variable read by [`settings::GlobalSettings::from_env`] to
/// switch every migration on or off.
pub const SHOULD_RUN_ENV: &str = "SCHEMABOOT_SHOULD_RUN";
