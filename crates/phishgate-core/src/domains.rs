// # Domain Set
//
// In-memory membership set of known phishing domains.
//
// ## Concurrency
//
// - One writer: the streaming task (or `start()` before that task exists)
// - Any number of readers calling `contains()` from their own threads
// - Every operation holds the lock for one O(1)/O(n) set operation, never
//   across an `.await`
//
// ## Crash Behavior
//
// - All state is lost on restart; the next `start()` re-fetches the snapshot

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::protocol::{DeltaCommand, DeltaMessage, DeltaOutcome};

/// Shared handle to the set of known phishing domains
///
/// Cloning the handle shares the same underlying set. Membership is
/// case-sensitive: `Example.com` and `example.com` are different entries.
///
/// # Example
///
/// ```rust
/// use phishgate_core::DomainSet;
/// use phishgate_core::protocol::DeltaMessage;
///
/// let set = DomainSet::new();
/// set.replace(["evil.example".to_string()].into_iter().collect());
/// set.apply(&DeltaMessage::add(["worse.example"]));
///
/// assert!(set.contains("evil.example"));
/// assert!(set.contains("worse.example"));
/// assert_eq!(set.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DomainSet {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl DomainSet {
    /// Create a new empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding `domains`
    pub fn from_domains(domains: HashSet<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(domains)),
        }
    }

    /// Check whether `domain` is a known phishing domain
    pub fn contains(&self, domain: &str) -> bool {
        self.read().contains(domain)
    }

    /// Install a complete snapshot, replacing the previous contents
    ///
    /// Readers observe either the old set or the new one, never a mix.
    pub fn replace(&self, domains: HashSet<String>) {
        *self.write() = domains;
    }

    /// Insert every domain, returning how many were new
    pub fn insert_all<I>(&self, domains: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut set = self.write();
        domains
            .into_iter()
            .filter(|domain| set.insert(domain.clone()))
            .count()
    }

    /// Remove every domain, returning how many were present
    pub fn remove_all<'a, I>(&self, domains: I) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut set = self.write();
        domains.into_iter().filter(|domain| set.remove(*domain)).count()
    }

    /// Apply one delta message
    ///
    /// Unknown commands leave the set untouched.
    pub fn apply(&self, message: &DeltaMessage) -> DeltaOutcome {
        match &message.command {
            DeltaCommand::Add => DeltaOutcome::Added(self.insert_all(message.domains.iter().cloned())),
            DeltaCommand::Delete => DeltaOutcome::Removed(self.remove_all(&message.domains)),
            DeltaCommand::Unknown(_) => DeltaOutcome::Ignored,
        }
    }

    /// Number of domains in the set
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> HashSet<String> {
        self.read().clone()
    }

    // A panicking writer cannot leave a HashSet half-updated in a way that
    // breaks membership checks, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashSet<String>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashSet<String>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
