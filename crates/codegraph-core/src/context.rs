//! Parser context (§4.C): the identity table, feature gate, and marked set
//! for one parse. Lives for the duration of a single parse/emit pair and is
//! discarded afterwards — callers must not reuse a context across
//! overlapping parses (§5).

use std::collections::HashMap;
use std::collections::HashSet;

use tracing::{debug, trace};

use crate::feature::FeatureGate;
use crate::registry::PointerId;

/// Per-parse identity table, feature gate, and marked-reference set.
#[derive(Debug)]
pub struct ParserContext {
    gate: FeatureGate,
    ids: HashMap<PointerId, u32>,
    /// Encounter order, so the emitter can re-walk ids in allocation order
    /// if it ever needs to (e.g. building the envelope's `m` list).
    order: Vec<PointerId>,
    next_id: u32,
    marked: HashSet<u32>,
}

impl ParserContext {
    pub fn new(gate: FeatureGate) -> Self {
        ParserContext {
            gate,
            ids: HashMap::new(),
            order: Vec::new(),
            next_id: 0,
            marked: HashSet::new(),
        }
    }

    pub fn gate(&self) -> FeatureGate {
        self.gate
    }

    /// Return the existing id for `ptr`, or allocate a fresh one in
    /// encounter order. The `bool` is `true` iff this is the first time
    /// `ptr` has been seen in this parse (the caller should recurse into
    /// children only on a fresh id; a stale one means "emit a
    /// back-reference").
    pub fn intern(&mut self, ptr: PointerId) -> (u32, bool) {
        if let Some(&id) = self.ids.get(&ptr) {
            trace!("Pointer {:?} already interned as id {}", ptr, id);
            return (id, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(ptr, id);
        self.order.push(ptr);
        trace!("Interned pointer {:?} as fresh id {}", ptr, id);
        (id, true)
    }

    /// Flag `id` as one the emitter must hoist into a variable, because it
    /// is referenced more than once or participates in a cycle.
    pub fn mark(&mut self, id: u32) {
        debug!("Marking id {} for variable hoisting", id);
        self.marked.insert(id);
    }

    pub fn is_marked(&self, id: u32) -> bool {
        self.marked.contains(&id)
    }

    /// The full marked set, in no particular order — callers that need a
    /// stable order (the envelope's `m` field) should sort it.
    pub fn marked_ids(&self) -> Vec<u32> {
        self.marked.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_assigns_in_encounter_order() {
        let mut ctx = ParserContext::new(FeatureGate::latest());
        let (id_a, fresh_a) = ctx.intern(0x1000);
        let (id_b, fresh_b) = ctx.intern(0x2000);
        assert_eq!((id_a, fresh_a), (0, true));
        assert_eq!((id_b, fresh_b), (1, true));
    }

    #[test]
    fn repeated_intern_returns_same_id_and_not_fresh() {
        let mut ctx = ParserContext::new(FeatureGate::latest());
        let (first, _) = ctx.intern(0x1000);
        let (second, fresh) = ctx.intern(0x1000);
        assert_eq!(first, second);
        assert!(!fresh);
    }

    #[test]
    fn mark_is_observable_via_is_marked() {
        let mut ctx = ParserContext::new(FeatureGate::latest());
        let (id, _) = ctx.intern(0x1000);
        assert!(!ctx.is_marked(id));
        ctx.mark(id);
        assert!(ctx.is_marked(id));
    }
}
