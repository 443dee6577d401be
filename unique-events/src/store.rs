//! Storage of per-bucket unique actor sets.
//!
//! A [`CardinalityStore`] maps bucket keys to probabilistic sets. It supports adding actors
//! with a TTL and estimating the cardinality of the union of several keys. Missing and
//! expired keys count as empty sets.
//!
//! [`MemoryStore`] is the in-process implementation.

use std::sync::Arc;

use chrono::TimeDelta;

use crate::error::StoreError;

mod memory;

pub use memory::MemoryStore;

/// Add-with-TTL and union-cardinality over bucket keys.
///
/// Implementations must be safe to call from many threads at once. `add` must be atomic per
/// key, and `count` must not modify any stored set.
pub trait CardinalityStore: Send + Sync {
    /// Add `actor_ids` to the set at `key`, then set its time to live to `ttl`.
    ///
    /// A `ttl` that is not positive, or that cannot be represented once added to the
    /// current time, is rejected with [`StoreError::InvalidTtl`].
    fn add(&self, key: &str, actor_ids: &[&str], ttl: TimeDelta) -> Result<(), StoreError>;

    /// Estimate the number of distinct actors across the union of the sets at `keys`.
    fn count(&self, keys: &[String]) -> Result<u64, StoreError>;
}

impl<S: CardinalityStore + ?Sized> CardinalityStore for Arc<S> {
    fn add(&self, key: &str, actor_ids: &[&str], ttl: TimeDelta) -> Result<(), StoreError> {
        (**self).add(key, actor_ids, ttl)
    }

    fn count(&self, keys: &[String]) -> Result<u64, StoreError> {
        (**self).count(keys)
    }
}

impl<S: CardinalityStore + ?Sized> CardinalityStore for &S {
    fn add(&self, key: &str, actor_ids: &[&str], ttl: TimeDelta) -> Result<(), StoreError> {
        (**self).add(key, actor_ids, ttl)
    }

    fn count(&self, keys: &[String]) -> Result<u64, StoreError> {
        (**self).count(keys)
    }
}

/// Check that `key` carries a non-empty `{...}` hash tag.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let tagged = key
        .split_once('{')
        .and_then(|(_, rest)| rest.split_once('}'))
        .is_some_and(|(tag, _)| !tag.is_empty());
    if tagged {
        Ok(())
    } else {
        Err(StoreError::KeyFormat(key.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("{analytics}:g_analytics_contribution-2020-W23", true)]
    #[case("free_{i_search_total}-2020-153", true)]
    #[case("i_search_total-2020-153", false)]
    #[case("{}-2020-153", false)]
    #[case("{unterminated-2020-153", false)]
    fn key_validation(#[case] key: &str, #[case] valid: bool) {
        check!(validate_key(key).is_ok() == valid);
    }
}
