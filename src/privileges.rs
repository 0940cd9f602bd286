//! # Privilege resolution seam.
//!
//! The gate does not compute privileges; it asks a [`PrivilegeResolver`]
//! which queues a submitting identity may insert into. The **order** of the
//! returned list is authoritative: routing walks it front to back and the
//! first queue whose significance filter accepts the command wins.

use std::collections::HashMap;

/// Maps a submitting identity to the ordered list of queue names it may
/// insert into.
pub trait PrivilegeResolver: Send + Sync {
    /// Ordered queue names `user` may insert into.
    ///
    /// Ordering is authoritative for routing and must be stable for a given
    /// user; names that do not match an existing queue are skipped.
    fn insert_queues(&self, user: &str) -> Vec<String>;
}

/// Static privilege table: a per-user ordering with a shared fallback.
///
/// Suits single-operator deployments and tests; larger installations plug in
/// their own resolver backed by whatever directory they use.
#[derive(Debug, Default, Clone)]
pub struct StaticPrivileges {
    everyone: Vec<String>,
    per_user: HashMap<String, Vec<String>>,
}

impl StaticPrivileges {
    /// Grants every user the given queue ordering.
    pub fn everyone(queues: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            everyone: queues.into_iter().map(Into::into).collect(),
            per_user: HashMap::new(),
        }
    }

    /// Grants `user` a specific queue ordering, overriding the shared one.
    #[must_use]
    pub fn grant(
        mut self,
        user: impl Into<String>,
        queues: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.per_user
            .insert(user.into(), queues.into_iter().map(Into::into).collect());
        self
    }
}

impl PrivilegeResolver for StaticPrivileges {
    fn insert_queues(&self, user: &str) -> Vec<String> {
        self.per_user
            .get(user)
            .cloned()
            .unwrap_or_else(|| self.everyone.clone())
    }
}
