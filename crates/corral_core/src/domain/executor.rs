//! Serial executor behind every confinement domain.
//!
//! # Responsibility
//! - Run submitted jobs one at a time, in submission order, on the domain's
//!   dedicated thread.
//! - Expose the working state to jobs through a thread-local, so a job never
//!   needs a lock to reach its own domain's state.
//!
//! # Invariants
//! - `with_state` may only be called from a domain thread, and never nested.
//! - The executor thread exits when the last handle to the domain drops.

use crate::domain::state::DomainState;
use crate::domain::DomainId;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

type Job = Box<dyn FnOnce() + Send>;

struct ActiveDomain {
    id: DomainId,
    state: Rc<RefCell<DomainState>>,
}

thread_local! {
    static ACTIVE: RefCell<Option<ActiveDomain>> = const { RefCell::new(None) };
}

struct DomainCore {
    id: DomainId,
    tx: mpsc::Sender<Job>,
}

/// Cloneable handle to one confinement domain.
///
/// Dropping every handle shuts the domain down after its queued jobs finish.
#[derive(Clone)]
pub struct DomainHandle {
    core: Arc<DomainCore>,
}

impl DomainHandle {
    /// Spawns the executor thread for a new domain.
    pub(crate) fn spawn(label: &str) -> std::io::Result<Self> {
        let id = DomainId::next();
        let (tx, rx) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name(format!("corral-{label}-{id}"))
            .spawn(move || {
                ACTIVE.with(|slot| {
                    *slot.borrow_mut() = Some(ActiveDomain {
                        id,
                        state: Rc::new(RefCell::new(DomainState::new(id))),
                    });
                });
                while let Ok(job) = rx.recv() {
                    job();
                }
                debug!("event=domain_shutdown module=domain id={id}");
            })?;
        Ok(Self {
            core: Arc::new(DomainCore { id, tx }),
        })
    }

    pub fn id(&self) -> DomainId {
        self.core.id
    }

    /// Queues a job for execution on this domain.
    pub(crate) fn run_async(&self, job: impl FnOnce() + Send + 'static) {
        if self.core.tx.send(Box::new(job)).is_err() {
            debug!(
                "event=domain_dispatch module=domain id={} status=dropped",
                self.core.id
            );
        }
    }

    /// Runs a job on this domain and blocks for its result.
    ///
    /// Re-entrant: when called from this domain's own thread the job runs
    /// inline, so a domain may block on itself without deadlocking.
    pub(crate) fn run_sync<R: Send + 'static>(&self, job: impl FnOnce() -> R + Send + 'static) -> R {
        if current_domain_id() == Some(self.core.id) {
            return job();
        }
        let (tx, rx) = mpsc::channel();
        self.run_async(move || {
            let _ = tx.send(job());
        });
        match rx.recv() {
            Ok(result) => result,
            Err(_) => panic!(
                "confinement domain {} terminated while a blocking call waited on it",
                self.core.id
            ),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakDomainHandle {
        WeakDomainHandle {
            core: Arc::downgrade(&self.core),
        }
    }
}

pub(crate) struct WeakDomainHandle {
    core: std::sync::Weak<DomainCore>,
}

impl WeakDomainHandle {
    pub(crate) fn upgrade(&self) -> Option<DomainHandle> {
        self.core.upgrade().map(|core| DomainHandle { core })
    }
}

/// Identifier of the domain owning the current thread, if any.
pub(crate) fn current_domain_id() -> Option<DomainId> {
    ACTIVE.with(|slot| slot.borrow().as_ref().map(|active| active.id))
}

/// Gives a job access to its own domain's working state.
///
/// # Panics
/// - When called from a thread that is not a domain executor. Operations
///   reach domain state only through [`DomainHandle::run_sync`]/`run_async`,
///   so hitting this is a confinement violation in the caller.
pub(crate) fn with_state<R>(f: impl FnOnce(&mut DomainState) -> R) -> R {
    let state = ACTIVE.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|active| Rc::clone(&active.state))
    });
    match state {
        Some(state) => f(&mut state.borrow_mut()),
        None => panic!("domain state accessed from outside a confinement domain"),
    }
}

#[cfg(test)]
mod tests {
    use super::{current_domain_id, DomainHandle};

    #[test]
    fn jobs_run_in_submission_order() {
        let domain = DomainHandle::spawn("test").unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        for n in 0..10 {
            let tx = tx.clone();
            domain.run_async(move || {
                let _ = tx.send(n);
            });
        }
        let seen: Vec<i32> = rx.iter().take(10).collect();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn run_sync_is_reentrant_on_own_domain() {
        let domain = DomainHandle::spawn("test").unwrap();
        let inner = domain.clone();
        let id = domain.id();
        let result = domain.run_sync(move || {
            assert_eq!(current_domain_id(), Some(id));
            inner.run_sync(move || 21) * 2
        });
        assert_eq!(result, 42);
    }

    #[test]
    fn caller_thread_belongs_to_no_domain() {
        assert_eq!(current_domain_id(), None);
    }
}
