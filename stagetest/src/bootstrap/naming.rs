//! Unique identifiers for resource names.

use rand::Rng;

/// Length of ids produced by [`unique_id`].
pub const UNIQUE_ID_LEN: usize = 6;

const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Returns a short random base-62 id.
///
/// Callers that embed it in cloud resource names should lower-case it.
#[must_use]
pub fn unique_id() -> String {
    let mut rng = rand::thread_rng();
    (0..UNIQUE_ID_LEN)
        .map(|_| char::from(BASE62[rng.gen_range(0..BASE62.len())]))
        .collect()
}
