//! Runtime identity tokens for live graph objects.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Opaque per-object identity, stamped once at construction.
///
/// Two objects with identical contents built separately get different
/// identities; clones of the same `Arc` share one. Identities are used only
/// as deduplication keys while a writer session runs and are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentity(u64);

impl NodeIdentity {
    /// Stamp a fresh identity.
    pub fn next() -> Self {
        Self(NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_are_unique_and_increasing() {
        let a = NodeIdentity::next();
        let b = NodeIdentity::next();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
