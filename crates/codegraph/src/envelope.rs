//! JSON envelope (§4.I): a transport-safe wrapper around the IR tree, used
//! by `toJSON`/`fromJSON` when the caller wants a serializable value
//! instead of source text (e.g. to ship across a network boundary and
//! compile on the other side).

use serde::{Deserialize, Serialize};

use codegraph_core::{FeatureGate, Node, Tag};

/// The JSON-transportable shape: the IR tree plus everything the emitter
/// needs to reproduce identical output without re-running the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The IR tree (`t` in the wire vocabulary the rest of the system uses;
    /// named `tree` here since `t` is already `Node`'s own tag field).
    pub tree: Node,
    /// Root id, `None` if the root value carried no identity (a primitive).
    pub root: Option<u32>,
    /// Whether the root renders as a bare object-literal expression
    /// (`Tag::Object`/`Tag::Iterable`), matching §4.I's `i`/`isRootObject`
    /// wire field — needed by a receiving emitter to decide whether the
    /// finalized expression must be parenthesized.
    pub is_root_object: bool,
    /// The feature mask the parser ran under.
    pub features: u32,
    /// Marked ids, sorted ascending for a stable wire representation.
    pub marked: Vec<u32>,
}

impl Envelope {
    pub fn new(tree: Node, gate: FeatureGate, mut marked: Vec<u32>) -> Self {
        marked.sort_unstable();
        let root = tree.id;
        let is_root_object = matches!(tree.tag, Tag::Object | Tag::Iterable);
        Envelope {
            tree,
            root,
            is_root_object,
            features: gate.bits(),
            marked,
        }
    }

    pub fn gate(&self) -> FeatureGate {
        FeatureGate::from_bits(self.features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::Tag;

    #[test]
    fn envelope_round_trips_through_json() {
        let tree = Node::singleton(Tag::Object).with_id(0);
        let env = Envelope::new(tree, FeatureGate::latest(), vec![0]);
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.root, Some(0));
        assert_eq!(back.marked, vec![0]);
        assert_eq!(back.gate(), FeatureGate::latest());
        assert!(back.is_root_object);
    }

    #[test]
    fn marked_ids_are_sorted() {
        let tree = Node::singleton(Tag::Null);
        let env = Envelope::new(tree, FeatureGate::latest(), vec![3, 1, 2]);
        assert_eq!(env.marked, vec![1, 2, 3]);
    }

    #[test]
    fn is_root_object_distinguishes_object_and_iterable_from_other_roots() {
        let object_root = Node::singleton(Tag::Object).with_id(0);
        assert!(Envelope::new(object_root, FeatureGate::latest(), vec![]).is_root_object);

        let iterable_root = Node::singleton(Tag::Iterable).with_id(0);
        assert!(Envelope::new(iterable_root, FeatureGate::latest(), vec![]).is_root_object);

        let array_root = Node::singleton(Tag::Array).with_id(0);
        assert!(!Envelope::new(array_root, FeatureGate::latest(), vec![]).is_root_object);

        let null_ctor_root = Node::singleton(Tag::NullConstructor).with_id(0);
        assert!(!Envelope::new(null_ctor_root, FeatureGate::latest(), vec![]).is_root_object);
    }
}
