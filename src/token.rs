//! Random token generation for slugs, device ids and sessions

use rand::{distr::Alphanumeric, Rng};

const SLUG_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Source of URL-safe random strings
///
/// Implementations must be cheap to call repeatedly: slug generation asks for
/// a fresh candidate on every collision.
pub trait TokenGenerator: Send + Sync {
    /// Lowercase alphanumeric token, used for link slugs
    fn slug(&self, len: usize) -> String;

    /// Mixed-case alphanumeric token, used for device ids
    fn token(&self, len: usize) -> String;
}

/// Default generator backed by the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokens;

impl TokenGenerator for RandomTokens {
    fn slug(&self, len: usize) -> String {
        let mut rng = rand::rng();
        (0..len)
            .map(|_| char::from(SLUG_CHARSET[rng.random_range(0..SLUG_CHARSET.len())]))
            .collect()
    }

    fn token(&self, len: usize) -> String {
        random_token(len)
    }
}

pub(crate) fn random_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
