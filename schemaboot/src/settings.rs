//! Global settings of the migration library.

use crate::SHOULD_RUN_ENV;
use std::fmt::{Display, Formatter};

/// Where the value of a global setting came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingSource {
    /// Built-in default
    Default,
    /// Read from the named environment variable
    Environment(String),
    /// Set in code
    Explicit,
}

impl Display for SettingSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingSource::Default => write!(f, "the default value"),
            SettingSource::Environment(var) => write!(f, "the {} environment variable", var),
            SettingSource::Explicit => write!(f, "an explicit setting"),
        }
    }
}

/// Process wide switches of the migration library.
///
/// The engine consults [`GlobalSettings::should_run`] before touching any
/// migration target. It is an escape hatch to disable the whole migration
/// step without changing application code, typically by exporting
/// `SCHEMABOOT_SHOULD_RUN=false`.
///
/// # Examples
///
/// ```rust
/// use schemaboot::settings::GlobalSettings;
///
/// let settings = GlobalSettings::from_lookup(|_| Some("off".to_string()));
/// assert!(!settings.should_run());
/// assert_eq!(
///     settings.describe_should_run(),
///     "the SCHEMABOOT_SHOULD_RUN environment variable"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSettings {
    should_run: bool,
    should_run_source: SettingSource,
}

impl GlobalSettings {
    /// Creates settings with default values: migrations run.
    pub fn new() -> Self {
        GlobalSettings {
            should_run: true,
            should_run_source: SettingSource::Default,
        }
    }

    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = GlobalSettings::new();
        if let Some(raw) = lookup(SHOULD_RUN_ENV) {
            match parse_flag(&raw) {
                Some(value) => {
                    settings.should_run = value;
                    settings.should_run_source = SettingSource::Environment(SHOULD_RUN_ENV.to_string());
                }
                None => {
                    log::warn!(
                        "Ignoring {}={:?}, expected one of true/false/yes/no/on/off/1/0",
                        SHOULD_RUN_ENV,
                        raw
                    );
                }
            }
        }
        settings
    }

    /// Overrides the should-run switch in code.
    pub fn with_should_run(mut self, should_run: bool) -> Self {
        self.should_run = should_run;
        self.should_run_source = SettingSource::Explicit;
        self
    }

    pub fn should_run(&self) -> bool {
        self.should_run
    }

    pub fn should_run_source(&self) -> &SettingSource {
        &self.should_run_source
    }

    /// Describes where the current should-run value was looked up.
    pub fn describe_should_run(&self) -> String {
        self.should_run_source.to_string()
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
