use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Owner token handed out with a fresh acquire. Marks carry it back so a
/// request whose lease was taken over cannot touch the new owner's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken(pub String);

impl LeaseToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of [`IdempotencyRegistry::try_acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// The caller owns the key and must later mark it applied or failed.
    Fresh(LeaseToken),
    /// The key is applied, or pending under a live lease.
    AlreadySeen,
}

impl Acquire {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Acquire::Fresh(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyState {
    Pending,
    Applied,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Idempotency backend error: {0}")]
    Backend(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Dedup store for inbound transaction keys.
///
/// `try_acquire` is one atomic check-and-insert:
///
/// | stored state               | result        | stored after |
/// |----------------------------|---------------|--------------|
/// | absent / expired           | `Fresh`       | pending      |
/// | failed                     | `Fresh`       | pending      |
/// | pending, lease live        | `AlreadySeen` | unchanged    |
/// | pending, lease elapsed     | `Fresh`       | pending      |
/// | applied                    | `AlreadySeen` | unchanged    |
///
/// `applied` is terminal until retention expires. `mark_applied` always
/// lands, since the operation has committed. `mark_failed` only moves a
/// pending record still held by `token`; anything else is left as is.
#[async_trait]
pub trait IdempotencyRegistry: Send + Sync {
    async fn try_acquire(&self, key: &str) -> RegistryResult<Acquire>;

    async fn mark_applied(&self, key: &str, token: &LeaseToken) -> RegistryResult<()>;

    async fn mark_failed(&self, key: &str, token: &LeaseToken) -> RegistryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_distinct() {
        let a = LeaseToken::generate();
        let b = LeaseToken::generate();
        assert_ne!(a, b);
        assert!(Acquire::Fresh(a).is_fresh());
        assert!(!Acquire::AlreadySeen.is_fresh());
    }
}
