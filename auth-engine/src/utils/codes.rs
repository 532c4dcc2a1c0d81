//! Random identifier helpers.

use rand::Rng;
use uuid::Uuid;

/// Generate a random numeric one-time code of the given length.
pub fn random_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| rng.gen_range(0..10).to_string())
        .collect()
}

/// Generate a username for principals registered without one.
pub fn random_username() -> String {
    Uuid::new_v4().simple().to_string()
}
