//! Fixtures for building staged tests without touching the process
//! environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::StagetestConfig;
use crate::events::CollectingEventSink;
use crate::runner::StagedTest;
use crate::skip::{MapDirectives, SkipPolicy};
use crate::state::StateStore;

/// Builds a [`SkipPolicy`] over fixed directive values.
#[must_use]
pub fn skip_policy(pairs: &[(&str, &str)]) -> SkipPolicy {
    SkipPolicy::new(
        crate::config::SkipConfig::default(),
        Arc::new(MapDirectives::from_pairs(pairs.iter().copied())),
    )
}

/// A test directory plus the directives and sink one invocation sees.
#[derive(Debug)]
pub struct TestFixture {
    test_dir: PathBuf,
    config: StagetestConfig,
    directives: MapDirectives,
    sink: Arc<CollectingEventSink>,
}

impl TestFixture {
    /// Creates a fixture rooted at `test_dir` with default configuration.
    #[must_use]
    pub fn new(test_dir: impl Into<PathBuf>) -> Self {
        Self {
            test_dir: test_dir.into(),
            config: StagetestConfig::default(),
            directives: MapDirectives::new(),
            sink: Arc::new(CollectingEventSink::new()),
        }
    }

    /// Sets a directive, e.g. `("SKIP_TEARDOWN", "true")`.
    #[must_use]
    pub fn with_directive(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives = self.directives.with(name, value);
        self
    }

    /// Skips `stage` through its canonical directive.
    #[must_use]
    pub fn skipping(self, stage: &str) -> Self {
        let name = format!("{}{}", self.config.skip.prefix, stage.to_uppercase());
        let value = self.config.skip.value.clone();
        self.with_directive(name, value)
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: StagetestConfig) -> Self {
        self.config = config;
        self
    }

    /// The test directory.
    #[must_use]
    pub fn test_dir(&self) -> &Path {
        &self.test_dir
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &StagetestConfig {
        &self.config
    }

    /// The sink every staged test from this fixture reports to.
    #[must_use]
    pub fn sink(&self) -> Arc<CollectingEventSink> {
        self.sink.clone()
    }

    /// A skip policy over this fixture's directives.
    #[must_use]
    pub fn policy(&self) -> SkipPolicy {
        SkipPolicy::new(self.config.skip.clone(), Arc::new(self.directives.clone()))
    }

    /// A state store for this fixture's directory.
    #[must_use]
    pub fn store(&self) -> StateStore {
        StateStore::with_config(&self.test_dir, &self.config.state)
    }

    /// A staged test wired to this fixture.
    #[must_use]
    pub fn staged_test(&self, name: &str) -> StagedTest {
        StagedTest::with_parts(name, self.store(), self.policy(), self.sink.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipping_uses_canonical_directive() {
        let fixture = TestFixture::new("/tmp/unused").skipping("sql_tests");
        let policy = fixture.policy();

        assert!(policy.should_skip("sql_tests"));
        assert!(!policy.should_skip("deploy"));
        assert_eq!(
            policy.skip_directive("sql_tests").as_deref(),
            Some("SKIP_SQL_TESTS")
        );
    }

    #[test]
    fn test_skip_policy_helper() {
        let policy = skip_policy(&[("SKIP_deploy", "true")]);
        assert!(policy.should_skip("deploy"));
    }
}
