//! Stage skip policy.
//!
//! Operators bypass a stage by setting a directive named after it, e.g.
//! `SKIP_DEPLOY=true`. The policy only answers "skip or run?"; it never
//! mutates anything.

mod directives;

pub use directives::{DirectiveSource, EnvDirectives, MapDirectives};

use crate::config::SkipConfig;
use std::sync::Arc;

/// Resolves, per stage name, whether to execute or bypass the stage.
#[derive(Clone)]
pub struct SkipPolicy {
    config: SkipConfig,
    source: Arc<dyn DirectiveSource>,
}

impl std::fmt::Debug for SkipPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipPolicy")
            .field("prefix", &self.config.prefix)
            .field("value", &self.config.value)
            .finish_non_exhaustive()
    }
}

impl SkipPolicy {
    /// Creates a policy over an explicit directive source.
    #[must_use]
    pub fn new(config: SkipConfig, source: Arc<dyn DirectiveSource>) -> Self {
        Self { config, source }
    }

    /// Creates a policy that reads the process environment.
    #[must_use]
    pub fn from_env(config: SkipConfig) -> Self {
        Self::new(config, Arc::new(EnvDirectives))
    }

    /// Creates a policy that never skips.
    #[must_use]
    pub fn never() -> Self {
        Self::new(SkipConfig::default(), Arc::new(MapDirectives::new()))
    }

    /// The directive names consulted for `stage`, canonical form first.
    ///
    /// The canonical form upper-cases the stage name (`SKIP_DEPLOY`); the
    /// verbatim form (`SKIP_deploy`) is also honoured when it differs.
    #[must_use]
    pub fn directive_names(&self, stage: &str) -> Vec<String> {
        let canonical = format!("{}{}", self.config.prefix, stage.to_uppercase());
        let verbatim = format!("{}{}", self.config.prefix, stage);
        if canonical == verbatim {
            vec![canonical]
        } else {
            vec![canonical, verbatim]
        }
    }

    /// Returns the directive that asks to skip `stage`, if any.
    #[must_use]
    pub fn skip_directive(&self, stage: &str) -> Option<String> {
        self.directive_names(stage)
            .into_iter()
            .find(|name| self.is_skip_value(self.source.get(name).as_deref()))
    }

    /// Returns true iff a directive for `stage` is set to the skip value.
    #[must_use]
    pub fn should_skip(&self, stage: &str) -> bool {
        self.skip_directive(stage).is_some()
    }

    /// Returns true if any directive with the configured prefix asks to skip.
    #[must_use]
    pub fn any_directive_set(&self) -> bool {
        self.source
            .entries_with_prefix(&self.config.prefix)
            .iter()
            .any(|(_, value)| self.is_skip_value(Some(value)))
    }

    fn is_skip_value(&self, value: Option<&str>) -> bool {
        value == Some(self.config.value.as_str())
    }
}
