//! Remote addresses refused at accept time.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Thread-safe set of banned addresses, matched by exact text.
#[derive(Debug, Default)]
pub struct BanList {
    addresses: RwLock<HashSet<String>>,
}

impl BanList {
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: RwLock::new(addresses.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether connections from `address` must be refused.
    pub fn is_banned(&self, address: &str) -> bool {
        self.addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address)
    }

    /// Ban `address`. Returns `false` if it was already banned.
    pub fn insert(&self, address: impl Into<String>) -> bool {
        self.addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.into())
    }

    /// Lift a ban. Returns `false` if `address` was not banned.
    pub fn remove(&self, address: &str) -> bool {
        self.addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address)
    }

    pub fn len(&self) -> usize {
        self.addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
