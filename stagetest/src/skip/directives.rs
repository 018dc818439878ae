//! Sources of skip directives and other named environment values.

use std::collections::HashMap;

/// Read-only view of named values, such as skip directives or the project
/// environment variables read at bootstrap.
pub trait DirectiveSource: Send + Sync {
    /// Returns the raw value of the directive, if set.
    fn get(&self, name: &str) -> Option<String>;

    /// Returns every directive whose name starts with `prefix`.
    fn entries_with_prefix(&self, prefix: &str) -> Vec<(String, String)>;
}

/// Directives read from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvDirectives;

impl DirectiveSource for EnvDirectives {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn entries_with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        // Entries that are not valid UTF-8 cannot be directives.
        std::env::vars_os()
            .filter_map(|(name, value)| {
                Some((name.into_string().ok()?, value.into_string().ok()?))
            })
            .filter(|(name, _)| name.starts_with(prefix))
            .collect()
    }
}

/// Directives held in an explicit map.
#[derive(Debug, Clone, Default)]
pub struct MapDirectives {
    values: HashMap<String, String>,
}

impl MapDirectives {
    /// Creates an empty directive map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directive map from name/value pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Sets a directive.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl DirectiveSource for MapDirectives {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn entries_with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        self.values
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
