//! Registry of the live confinement domains of one session.
//!
//! # Responsibility
//! - Keep the root domain plus weak references to every derived domain, so
//!   change-set fan-out reaches all live domains without keeping dead ones
//!   alive.
//!
//! # Invariants
//! - The root domain lives as long as the session.
//! - Dead derived entries are pruned on registration and enumeration.

use crate::domain::executor::{DomainHandle, WeakDomainHandle};
use std::sync::Mutex;

pub(crate) struct DomainRegistry {
    root: DomainHandle,
    derived: Mutex<Vec<WeakDomainHandle>>,
}

impl DomainRegistry {
    pub(crate) fn new(root: DomainHandle) -> Self {
        Self {
            root,
            derived: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn root(&self) -> &DomainHandle {
        &self.root
    }

    pub(crate) fn register(&self, handle: &DomainHandle) {
        let mut derived = self.lock_derived();
        derived.retain(|weak| weak.upgrade().is_some());
        derived.push(handle.downgrade());
    }

    /// Every live domain, root first.
    pub(crate) fn live_domains(&self) -> Vec<DomainHandle> {
        let mut domains = vec![self.root.clone()];
        let mut derived = self.lock_derived();
        derived.retain(|weak| weak.upgrade().is_some());
        domains.extend(derived.iter().filter_map(WeakDomainHandle::upgrade));
        domains
    }

    fn lock_derived(&self) -> std::sync::MutexGuard<'_, Vec<WeakDomainHandle>> {
        match self.derived.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
