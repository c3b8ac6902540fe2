//! Public entry points (§5, §6): the handful of functions a caller actually
//! reaches for. Everything else in this crate is plumbing in service of
//! these six functions.

use codegraph_core::{FeatureGate, Result};

use crate::emitter;
use crate::envelope::Envelope;
use crate::host::HostEvaluator;
use crate::parser;
use crate::parser_async;
use crate::value::Value;

/// Caller-tunable knobs for a single parse/emit pass (§6).
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Features to turn off relative to [`FeatureGate::latest`], e.g. to
    /// target a runtime that lacks `Object.assign` or arrow functions.
    pub disabled_features: FeatureGate,
}

impl Options {
    pub fn gate(&self) -> FeatureGate {
        FeatureGate::latest().disable(self.disabled_features)
    }
}

/// Parse `value` and emit it as a single self-evaluating source expression.
pub fn serialize(value: &Value, options: Options) -> Result<String> {
    let (tree, ctx) = parser::parse(value, options.gate())?;
    emitter::emit(&tree, ctx.gate(), &ctx.marked_ids())
}

/// Async counterpart of [`serialize`]: awaits any pending promises
/// encountered in the graph (§4.G).
pub async fn serialize_async(value: &Value, options: Options) -> Result<String> {
    let (tree, ctx) = parser_async::parse(value, options.gate()).await?;
    emitter::emit(&tree, ctx.gate(), &ctx.marked_ids())
}

/// Parse `value` into the JSON-transportable [`Envelope`] shape (§4.I).
pub fn to_json(value: &Value, options: Options) -> Result<Envelope> {
    let (tree, ctx) = parser::parse(value, options.gate())?;
    Ok(Envelope::new(tree, ctx.gate(), ctx.marked_ids()))
}

/// Async counterpart of [`to_json`].
pub async fn to_json_async(value: &Value, options: Options) -> Result<Envelope> {
    let (tree, ctx) = parser_async::parse(value, options.gate()).await?;
    Ok(Envelope::new(tree, ctx.gate(), ctx.marked_ids()))
}

/// Emit an already-parsed [`Envelope`] as source text, without re-running
/// the parser.
pub fn compile_json(envelope: &Envelope) -> Result<String> {
    emitter::emit(&envelope.tree, envelope.gate(), &envelope.marked)
}

/// Compile `code` and hand it to `host` to reconstruct a [`Value`] graph
/// (§5: the host-evaluator boundary — this crate never executes code).
pub fn deserialize(code: &str, host: &impl HostEvaluator) -> Result<Value> {
    host.evaluate(code)
}

/// Compile `envelope` to source text and hand it to `host` to reconstruct
/// a [`Value`] graph.
pub fn from_json(envelope: &Envelope, host: &impl HostEvaluator) -> Result<Value> {
    let code = compile_json(envelope)?;
    host.evaluate(&code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::Error;

    struct EchoHost;

    impl HostEvaluator for EchoHost {
        fn evaluate(&self, _code: &str) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn serialize_wraps_marked_object_in_iife() {
        let out = serialize(&Value::object(indexmap::IndexMap::new()), Options::default()).unwrap();
        assert_eq!(out, "({})");
    }

    #[test]
    fn options_disable_features_narrows_the_gate() {
        use codegraph_core::Feature;
        let opts = Options {
            disabled_features: FeatureGate::none().with(Feature::Map),
        };
        let err = serialize(&Value::map(vec![]), opts).unwrap_err();
        assert!(matches!(err, Error::FeatureMissing(Feature::Map)));
    }

    #[test]
    fn to_json_then_compile_json_matches_direct_serialize() {
        let value = Value::array(vec![Some(Value::Number(1.0))]);
        let direct = serialize(&value, Options::default()).unwrap();
        let envelope = to_json(&value, Options::default()).unwrap();
        let via_json = compile_json(&envelope).unwrap();
        assert_eq!(direct, via_json);
    }

    #[test]
    fn deserialize_delegates_to_host() {
        let out = deserialize("null", &EchoHost).unwrap();
        assert!(matches!(out, Value::Null));
    }

    #[tokio::test]
    async fn serialize_async_matches_sync_for_non_promise_graphs() {
        let value = Value::object(indexmap::IndexMap::new());
        let sync_out = serialize(&value, Options::default()).unwrap();
        let async_out = serialize_async(&value, Options::default()).await.unwrap();
        assert_eq!(sync_out, async_out);
    }
}
