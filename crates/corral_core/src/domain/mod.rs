//! Confinement domains: serial executors with per-domain working state.
//!
//! # Responsibility
//! - Give every domain a dedicated thread that runs submitted jobs in
//!   submission order.
//! - Track which domain the current thread belongs to, so blocking calls
//!   from inside a domain run inline instead of deadlocking.
//! - Keep the set of live domains enumerable for change-set fan-out.
//!
//! # Invariants
//! - A domain's working state is touched only from that domain's thread.
//! - `run_sync` on the executing domain runs the job inline (re-entrant).

mod executor;
mod registry;
mod state;

pub use executor::DomainHandle;
pub use state::MergePolicy;
pub(crate) use executor::with_state;
pub(crate) use registry::DomainRegistry;
pub(crate) use state::DomainState;

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier of one confinement domain.
///
/// The root domain of a session always gets the first identifier assigned
/// during `open`; derived domains get fresh ones. Identifiers are process
/// wide, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DomainId(u64);

static NEXT_DOMAIN_ID: AtomicU64 = AtomicU64::new(1);

impl DomainId {
    pub(crate) fn next() -> Self {
        Self(NEXT_DOMAIN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for DomainId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "domain-{}", self.0)
    }
}
