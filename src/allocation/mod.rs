//! # Allocation
//!
//! The constrained matching core: order selection with weekly counters,
//! the three-pass matching engine, and the cross-entity fallback resolver.

pub mod engine;
pub mod fallback;
pub mod matching;
pub mod selector;

pub use engine::{AllocationEngine, RouteOutcome};
pub use fallback::{CrossEntityFallback, FallbackOutcome};
pub use matching::{Eligibility, MatchPass};
pub use selector::{week_start, OrderSelector};

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::models::Lead;

/// Run-scoped allocation state, passed explicitly through the engine.
///
/// Owns the candidate pools and the "already consumed" claim set shared
/// across every order of one run. The claim set is mutated as orders match
/// and is discarded at run end; it is never persisted.
#[derive(Debug, Default)]
pub struct RunContext {
    /// Fresh candidates, ascending creation time.
    pub fresh_pool: Vec<Lead>,
    /// Backlog candidates, ascending creation time.
    pub backlog_pool: Vec<Lead>,
    /// Lead ids claimed by any order during this run.
    pub claimed: HashSet<Uuid>,
    /// Lead ids the duplicate oracle blocked at least once this run. An
    /// unclaimed lead in this set settles as `duplicate` rather than
    /// `non_delivered`.
    pub duplicate_blocked: HashSet<Uuid>,
    /// Units consumed from sibling-entity orders by fallback matches this
    /// run: order id -> (total units, backlog units). Sibling week counters
    /// were loaded once, so in-run consumption is tracked here.
    pub fallback_consumed: HashMap<Uuid, (i64, i64)>,
}

impl RunContext {
    pub fn new(fresh_pool: Vec<Lead>, backlog_pool: Vec<Lead>) -> Self {
        Self {
            fresh_pool,
            backlog_pool,
            claimed: HashSet::new(),
            duplicate_blocked: HashSet::new(),
            fallback_consumed: HashMap::new(),
        }
    }

    pub fn is_claimed(&self, lead_id: Uuid) -> bool {
        self.claimed.contains(&lead_id)
    }

    pub fn claim(&mut self, lead_id: Uuid) -> bool {
        self.claimed.insert(lead_id)
    }

    /// Leads from both pools not claimed by any order this run.
    pub fn unclaimed(&self) -> impl Iterator<Item = &Lead> {
        self.fresh_pool
            .iter()
            .chain(self.backlog_pool.iter())
            .filter(|lead| !self.claimed.contains(&lead.lead_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_set_is_shared_across_pools() {
        let ctx = RunContext::default();
        assert_eq!(ctx.unclaimed().count(), 0);

        let mut ctx = RunContext::default();
        let id = Uuid::new_v4();
        assert!(ctx.claim(id));
        // Second claim of the same lead reports already-claimed
        assert!(!ctx.claim(id));
        assert!(ctx.is_claimed(id));
    }
}
