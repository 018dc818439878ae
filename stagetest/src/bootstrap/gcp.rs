//! Project and region discovery for Google Cloud.

use crate::errors::StagetestError;
use crate::skip::DirectiveSource;
use rand::seq::SliceRandom;

/// Environment variables consulted for the project id, in order.
pub const PROJECT_ENV_VARS: [&str; 4] = [
    "GOOGLE_CLOUD_PROJECT",
    "GOOGLE_PROJECT",
    "GCLOUD_PROJECT",
    "CLOUDSDK_CORE_PROJECT",
];

/// Returns the first non-empty project id found in `env`.
pub fn project_id_from_env(env: &dyn DirectiveSource) -> Result<String, StagetestError> {
    PROJECT_ENV_VARS
        .iter()
        .filter_map(|name| env.get(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .ok_or_else(|| StagetestError::MissingEnvironment {
            candidates: PROJECT_ENV_VARS.iter().map(|s| (*s).to_string()).collect(),
        })
}

/// Picks one of `candidates` at random, or `None` if the list is empty.
#[must_use]
pub fn random_region(candidates: &[String]) -> Option<String> {
    candidates.choose(&mut rand::thread_rng()).cloned()
}
