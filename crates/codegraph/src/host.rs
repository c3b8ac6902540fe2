//! The host-evaluator boundary (§1 "ambient host evaluator", out of scope).
//!
//! This crate emits source text; it never executes it. `deserialize` and
//! `fromJSON` need *something* to run that text and hand back a
//! reconstructed [`Value`](crate::value::Value) graph — that's the host's
//! job. Implement [`HostEvaluator`] with whatever engine the embedding
//! application already carries (a JS engine binding, a test double, …).

use codegraph_core::Result;

use crate::value::Value;

/// A host capable of executing emitted source text and handing back the
/// reconstructed value graph.
pub trait HostEvaluator {
    fn evaluate(&self, code: &str) -> Result<Value>;
}
