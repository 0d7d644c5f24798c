//! Completion routing decision table.
//!
//! # Responsibility
//! - Decide, per operation, whether the caller's completion fires on the
//!   domain that did the work or is re-dispatched to the root domain after
//!   re-resolving the affected records there.
//!
//! # Invariants
//! - The mutation table is total over its three boolean axes; every arm is
//!   spelled out because adjacent-looking cases are distinct policy
//!   decisions.
//! - A completion only ever observes records owned by the domain it is
//!   delivered on.

/// Where the result is delivered, and whether a save precedes delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Deliver from the domain that executed the operation.
    DeliverLocal,
    /// Save the executing domain, then deliver from it.
    SaveThenDeliverLocal,
    /// Save the executing domain, re-resolve on root, deliver from root.
    SaveThenDeliverOnRoot,
    /// No save; re-resolve on root and deliver from there.
    DeliverOnRoot,
}

impl Route {
    pub(crate) fn saves(&self) -> bool {
        matches!(self, Route::SaveThenDeliverLocal | Route::SaveThenDeliverOnRoot)
    }

    pub(crate) fn delivers_on_root(&self) -> bool {
        matches!(self, Route::SaveThenDeliverOnRoot | Route::DeliverOnRoot)
    }
}

/// Routes a mutating operation.
///
/// Axes: was an explicit domain supplied, was a save requested, was
/// root-confined delivery requested. Without an explicit domain the
/// operation already executes on root, so root delivery needs no
/// re-dispatch.
pub(crate) fn route_mutation(
    explicit_domain: bool,
    should_save: bool,
    complete_on_root: bool,
) -> Route {
    let route = match (explicit_domain, should_save, complete_on_root) {
        (false, false, false) => Route::DeliverLocal,
        (false, false, true) => Route::DeliverLocal,
        (false, true, false) => Route::SaveThenDeliverLocal,
        (false, true, true) => Route::SaveThenDeliverLocal,
        (true, false, false) => Route::DeliverLocal,
        (true, false, true) => Route::DeliverOnRoot,
        (true, true, false) => Route::SaveThenDeliverLocal,
        (true, true, true) => Route::SaveThenDeliverOnRoot,
    };
    log::debug!(
        "event=route_decision module=runner explicit={explicit_domain} save={should_save} on_root={complete_on_root} route={route:?}"
    );
    route
}

/// Routes a read-only operation: nothing to save, so only the explicit
/// domain plus root-delivery combination re-dispatches.
pub(crate) fn route_read(explicit_domain: bool, complete_on_root: bool) -> Route {
    if explicit_domain && complete_on_root {
        Route::DeliverOnRoot
    } else {
        Route::DeliverLocal
    }
}

#[cfg(test)]
mod tests {
    use super::{route_mutation, route_read, Route};

    #[test]
    fn mutation_table_covers_all_eight_combinations() {
        assert_eq!(route_mutation(false, false, false), Route::DeliverLocal);
        assert_eq!(route_mutation(false, false, true), Route::DeliverLocal);
        assert_eq!(route_mutation(false, true, false), Route::SaveThenDeliverLocal);
        assert_eq!(route_mutation(false, true, true), Route::SaveThenDeliverLocal);
        assert_eq!(route_mutation(true, false, false), Route::DeliverLocal);
        assert_eq!(route_mutation(true, false, true), Route::DeliverOnRoot);
        assert_eq!(route_mutation(true, true, false), Route::SaveThenDeliverLocal);
        assert_eq!(route_mutation(true, true, true), Route::SaveThenDeliverOnRoot);
    }

    #[test]
    fn read_table_only_redispatches_explicit_root_delivery()  {
        assert_eq!(route_read(false, false), Route::DeliverLocal);
        assert_eq!(route_read(false, true), Route::DeliverLocal);
        assert_eq!(route_read(true, false), Route::DeliverLocal);
        assert_eq!(route_read(true, true), Route::DeliverOnRoot);
    }

    #[test]
    fn route_flags_match_their_variants() {
        assert!(Route::SaveThenDeliverLocal.saves());
        assert!(Route::SaveThenDeliverOnRoot.saves());
        assert!(!Route::DeliverOnRoot.saves());
        assert!(Route::DeliverOnRoot.delivers_on_root());
        assert!(Route::SaveThenDeliverOnRoot.delivers_on_root());
        assert!(!Route::DeliverLocal.delivers_on_root());
    }
}
