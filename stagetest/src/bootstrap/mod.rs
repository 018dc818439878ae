//! Value generators for the bootstrap stage.
//!
//! Random names, a random region and the target project. None of these
//! touch the state store; the orchestrator persists what they produce.

mod gcp;
mod naming;

pub use gcp::{project_id_from_env, random_region, PROJECT_ENV_VARS};
pub use naming::{unique_id, UNIQUE_ID_LEN};
