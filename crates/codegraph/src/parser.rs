//! Sync parser (§4.F): recursive descent from a `Value` graph to IR. Never
//! suspends (§5) — a pending [`Promise`](crate::value::PromiseState::Pending)
//! is a hard parse error here; only the async parser (`parser_async.rs`) can
//! await one.

use codegraph_core::registry;
use codegraph_core::{Error, Feature, FeatureGate, Node, ParserContext, Record, Result, Tag};

use crate::util;
use crate::value::{PromiseState, Value};

/// Parse `root` into an IR tree plus the context that recorded its
/// identities, feature gate, and marked set.
pub fn parse(root: &Value, gate: FeatureGate) -> Result<(Node, ParserContext)> {
    let mut ctx = ParserContext::new(gate);
    let node = parse_value(root, &mut ctx)?;
    Ok((node, ctx))
}

fn parse_value(value: &Value, ctx: &mut ParserContext) -> Result<Node> {
    match value {
        Value::Undefined => Ok(Node::singleton(Tag::Undefined)),
        Value::Null => Ok(Node::singleton(Tag::Null)),
        Value::Bool(true) => Ok(Node::singleton(Tag::True)),
        Value::Bool(false) => Ok(Node::singleton(Tag::False)),
        Value::Number(n) => Ok(parse_number(*n)),
        Value::BigInt(text) => {
            require(ctx, Feature::BigInt)?;
            Ok(Node::singleton(Tag::BigInt).with_s(text.to_string()))
        }
        Value::Str(s) => Ok(Node::singleton(Tag::String).with_s(codegraph_core::escape::escape(s))),
        Value::WellKnownSymbol(sym) => {
            require(ctx, Feature::Symbol)?;
            Ok(Node::singleton(Tag::WellKnownSymbol).with_s(sym.name()))
        }
        _ => parse_reference_typed(value, ctx),
    }
}

fn parse_number(n: f64) -> Node {
    if n.is_nan() {
        Node::singleton(Tag::NaN)
    } else if n.is_infinite() {
        if n > 0.0 {
            Node::singleton(Tag::PositiveInfinity)
        } else {
            Node::singleton(Tag::NegativeInfinity)
        }
    } else if n == 0.0 && n.is_sign_negative() {
        Node::singleton(Tag::NegativeZero)
    } else {
        Node::singleton(Tag::Number).with_s(util::format_number(n))
    }
}

fn require(ctx: &ParserContext, feature: Feature) -> Result<()> {
    if ctx.gate().test(feature) {
        Ok(())
    } else {
        Err(Error::FeatureMissing(feature))
    }
}

/// Intern, back-reference, or registry-check a reference-typed value before
/// dispatching on its concrete shape (§4.F).
fn parse_reference_typed(value: &Value, ctx: &mut ParserContext) -> Result<Node> {
    let ptr = value
        .identity()
        .expect("parse_reference_typed called on a value with no identity");
    let (id, fresh) = ctx.intern(ptr);
    if !fresh {
        ctx.mark(id);
        return Ok(Node::singleton(Tag::IndexedValue).with_id(id));
    }
    if let Some(key) = registry::lookup_by_value(ptr) {
        return Ok(Node::singleton(Tag::Reference).with_id(id).with_s(key));
    }
    dispatch(value, id, ctx)
}

fn dispatch(value: &Value, id: u32, ctx: &mut ParserContext) -> Result<Node> {
    match value {
        Value::Array(rc) => {
            let items = rc.borrow();
            let mut children = Vec::with_capacity(items.len());
            for item in items.iter() {
                children.push(match item {
                    Some(v) => Some(parse_value(v, ctx)?),
                    None => None,
                });
            }
            Ok(Node::singleton(Tag::Array)
                .with_id(id)
                .with_l(children.len() as u32)
                .with_a(children))
        }
        Value::Object(rc) => {
            let record = parse_fields(rc.borrow().iter(), ctx)?;
            Ok(Node::singleton(Tag::Object).with_id(id).with_d(record))
        }
        Value::NullProtoObject(rc) => {
            let record = parse_fields(rc.borrow().iter(), ctx)?;
            Ok(Node::singleton(Tag::NullConstructor).with_id(id).with_d(record))
        }
        Value::Map(rc) => {
            require(ctx, Feature::Map)?;
            let entries = rc.borrow();
            let count = entries.len();
            let record = parse_pairs(entries.iter().cloned(), ctx)?;
            Ok(Node::singleton(Tag::Map)
                .with_id(id)
                .with_l(count as u32)
                .with_d(record))
        }
        Value::Set(rc) => {
            require(ctx, Feature::Set)?;
            let elements = rc.borrow();
            let mut children = Vec::with_capacity(elements.len());
            for element in elements.iter() {
                children.push(Some(parse_value(element, ctx)?));
            }
            Ok(Node::singleton(Tag::Set)
                .with_id(id)
                .with_l(children.len() as u32)
                .with_a(children))
        }
        Value::Date(rc) => Ok(Node::singleton(Tag::Date)
            .with_id(id)
            .with_s(util::format_iso8601(**rc))),
        Value::RegExp(rc) => Ok(Node::singleton(Tag::RegExp)
            .with_id(id)
            .with_s(rc.source.clone())
            .with_c(rc.flags.clone())),
        Value::Error(rc) => {
            let data = rc.borrow();
            let record = parse_fields(data.extra.iter(), ctx)?;
            Ok(Node::singleton(Tag::Error)
                .with_id(id)
                .with_c(data.constructor_name.clone())
                .with_m(data.message.clone())
                .with_d(record))
        }
        Value::AggregateError(rc) => {
            require(ctx, Feature::AggregateError)?;
            let data = rc.borrow();
            let mut errors = Vec::with_capacity(data.errors.len());
            for e in &data.errors {
                errors.push(Some(parse_value(e, ctx)?));
            }
            let record = parse_fields(data.extra.iter(), ctx)?;
            Ok(Node::singleton(Tag::AggregateError)
                .with_id(id)
                .with_m(data.message.clone())
                .with_a(errors)
                .with_d(record))
        }
        Value::TypedArray(rc) => {
            require(ctx, Feature::TypedArray)?;
            let children: Vec<Option<Node>> =
                rc.elements.iter().map(|n| Some(parse_number(*n))).collect();
            let mut node = Node::singleton(Tag::TypedArray)
                .with_id(id)
                .with_c(rc.kind.ctor_name())
                .with_l(children.len() as u32)
                .with_a(children);
            if let Some(offset) = rc.byte_offset {
                node = node.with_b(offset as i64);
            }
            Ok(node)
        }
        Value::BigIntTypedArray(rc) => {
            require(ctx, Feature::BigIntTypedArray)?;
            let children: Vec<Option<Node>> = rc
                .elements
                .iter()
                .map(|n| Some(Node::singleton(Tag::BigInt).with_s(n.to_string())))
                .collect();
            let mut node = Node::singleton(Tag::BigIntTypedArray)
                .with_id(id)
                .with_c(rc.kind.ctor_name())
                .with_l(children.len() as u32)
                .with_a(children);
            if let Some(offset) = rc.byte_offset {
                node = node.with_b(offset as i64);
            }
            Ok(node)
        }
        Value::ArrayBuffer(rc) => Ok(Node::singleton(Tag::ArrayBuffer)
            .with_id(id)
            .with_l(rc.len() as u32)
            .with_s(util::bytes_to_decimal_list(rc.as_slice()))),
        Value::DataView(rc) => {
            let buffer = parse_array_buffer_child(&rc.buffer, ctx)?;
            Ok(Node::singleton(Tag::DataView)
                .with_id(id)
                .with_l(rc.byte_length as u32)
                .with_b(rc.byte_offset as i64)
                .with_f(buffer))
        }
        Value::Blob(rc) => {
            require(ctx, Feature::WebAPI)?;
            let bytes = rc.bytes();
            let buffer = Node::singleton(Tag::ArrayBuffer)
                .with_l(bytes.len() as u32)
                .with_s(util::bytes_to_decimal_list(&bytes));
            Ok(Node::singleton(Tag::Blob)
                .with_id(id)
                .with_c(rc.mime_type())
                .with_f(buffer))
        }
        Value::File(rc) => {
            require(ctx, Feature::WebAPI)?;
            let bytes = rc.bytes();
            let buffer = Node::singleton(Tag::ArrayBuffer)
                .with_l(bytes.len() as u32)
                .with_s(util::bytes_to_decimal_list(&bytes));
            Ok(Node::singleton(Tag::File)
                .with_id(id)
                .with_c(rc.mime_type())
                .with_m(rc.file_name())
                .with_b(rc.last_modified_ms())
                .with_f(buffer))
        }
        Value::Url(rc) => {
            require(ctx, Feature::WebAPI)?;
            Ok(Node::singleton(Tag::Url).with_id(id).with_s(rc.href()))
        }
        Value::UrlSearchParams(rc) => {
            require(ctx, Feature::WebAPI)?;
            let entries = rc.borrow();
            let flat = flatten_string_pairs(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Node::singleton(Tag::UrlSearchParams)
                .with_id(id)
                .with_d(Record::pairs(flat)))
        }
        Value::Headers(rc) => {
            require(ctx, Feature::WebAPI)?;
            let flat = flatten_string_pairs(rc.entries().into_iter());
            Ok(Node::singleton(Tag::Headers).with_id(id).with_d(Record::pairs(flat)))
        }
        Value::FormData(rc) => {
            require(ctx, Feature::WebAPI)?;
            let mut flat = Vec::new();
            for (k, entry) in rc.entries() {
                flat.push(Node::singleton(Tag::String).with_s(codegraph_core::escape::escape(&k)));
                let value_node = match entry {
                    crate::value::FormDataEntry::Text(s) => {
                        Node::singleton(Tag::String).with_s(codegraph_core::escape::escape(&s))
                    }
                    crate::value::FormDataEntry::File(file) => {
                        parse_value(&Value::File(file), ctx)?
                    }
                };
                flat.push(value_node);
            }
            Ok(Node::singleton(Tag::FormData).with_id(id).with_d(Record::pairs(flat)))
        }
        Value::Iterable(rc) => {
            let elements = rc.drain();
            let mut children = Vec::with_capacity(elements.len());
            for element in &elements {
                children.push(Some(parse_value(element, ctx)?));
            }
            Ok(Node::singleton(Tag::Iterable)
                .with_id(id)
                .with_l(children.len() as u32)
                .with_a(children))
        }
        Value::Promise(rc) => {
            require(ctx, Feature::Promise)?;
            let resolved = {
                let state = rc.borrow();
                match &*state {
                    PromiseState::Resolved(v) => v.clone(),
                    PromiseState::Pending(_) => {
                        return Err(Error::UnsupportedType(
                            "pending promise cannot be resolved by the synchronous parser".into(),
                        ));
                    }
                }
            };
            let child = parse_value(&resolved, ctx)?;
            Ok(Node::singleton(Tag::Promise).with_id(id).with_f(child))
        }
        Value::Function(_) => Err(Error::UnsupportedType(
            "function values are only supported when pre-registered".into(),
        )),
        Value::Undefined
        | Value::Null
        | Value::Bool(_)
        | Value::Number(_)
        | Value::BigInt(_)
        | Value::Str(_)
        | Value::WellKnownSymbol(_) => unreachable!("primitives never reach dispatch"),
    }
}

fn parse_array_buffer_child(buffer: &Value, ctx: &mut ParserContext) -> Result<Node> {
    match buffer {
        Value::ArrayBuffer(_) => parse_value(buffer, ctx),
        _ => Err(Error::UnsupportedType("DataView buffer must be an ArrayBuffer".into())),
    }
}

fn flatten_string_pairs(entries: impl Iterator<Item = (String, String)>) -> Vec<Node> {
    let mut flat = Vec::new();
    for (k, v) in entries {
        flat.push(Node::singleton(Tag::String).with_s(codegraph_core::escape::escape(&k)));
        flat.push(Node::singleton(Tag::String).with_s(codegraph_core::escape::escape(&v)));
    }
    flat
}

/// Eager/deferred split for object-shaped fields (§4.F ordering rule):
/// non-iterable values recurse first in insertion order, iterable values
/// afterward in insertion order. Depth-first recursion gives nested
/// deferred iterables the same depth-first drain order (§9 Open Question).
fn parse_fields<'a>(
    fields: impl Iterator<Item = (&'a String, &'a Value)>,
    ctx: &mut ParserContext,
) -> Result<Record> {
    let (eager, deferred): (Vec<_>, Vec<_>) = fields.partition(|(_, v)| !v.is_deferred());
    let mut keys = Vec::with_capacity(eager.len() + deferred.len());
    let mut values = Vec::with_capacity(eager.len() + deferred.len());
    for (k, v) in eager.into_iter().chain(deferred) {
        keys.push(k.clone());
        values.push(parse_value(v, ctx)?);
    }
    Ok(Record::new(keys, values))
}

/// Eager/deferred split for Map-shaped entries, flattened to `[k0,v0,k1,v1,…]`.
fn parse_pairs(entries: impl Iterator<Item = (Value, Value)>, ctx: &mut ParserContext) -> Result<Record> {
    let all: Vec<(Value, Value)> = entries.collect();
    let (eager, deferred): (Vec<_>, Vec<_>) =
        all.into_iter().partition(|(k, v)| !k.is_deferred() && !v.is_deferred());
    let mut flat = Vec::new();
    for (k, v) in eager.into_iter().chain(deferred) {
        flat.push(parse_value(&k, ctx)?);
        flat.push(parse_value(&v, ctx)?);
    }
    Ok(Record::pairs(flat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn null_and_undefined_are_singletons() {
        let (node, _) = parse(&Value::Null, FeatureGate::latest()).unwrap();
        assert_eq!(node.tag, Tag::Null);
        let (node, _) = parse(&Value::Undefined, FeatureGate::latest()).unwrap();
        assert_eq!(node.tag, Tag::Undefined);
    }

    #[test]
    fn negative_zero_and_nan_and_infinity_are_singletons() {
        assert_eq!(parse_number(-0.0).tag, Tag::NegativeZero);
        assert_eq!(parse_number(f64::NAN).tag, Tag::NaN);
        assert_eq!(parse_number(f64::INFINITY).tag, Tag::PositiveInfinity);
        assert_eq!(parse_number(f64::NEG_INFINITY).tag, Tag::NegativeInfinity);
    }

    #[test]
    fn string_is_escaped_in_s_slot() {
        let (node, _) = parse(&Value::Str(std::rc::Rc::from("<script></script>")), FeatureGate::latest()).unwrap();
        assert_eq!(node.tag, Tag::String);
        assert_eq!(node.s.as_deref(), Some("\\x3Cscript>\\x3C/script>"));
    }

    #[test]
    fn direct_cycle_produces_back_reference() {
        let mut fields = IndexMap::new();
        fields.insert("self".to_string(), Value::Undefined);
        let obj = Value::object(fields);
        if let Value::Object(rc) = &obj {
            rc.borrow_mut().insert("self".to_string(), obj.clone());
        }
        let (node, ctx) = parse(&obj, FeatureGate::latest()).unwrap();
        assert_eq!(node.tag, Tag::Object);
        let id = node.id.unwrap();
        let record = node.d.unwrap();
        assert_eq!(record.values[0].tag, Tag::IndexedValue);
        assert_eq!(record.values[0].id, Some(id));
        assert!(ctx.is_marked(id));
    }

    #[test]
    fn shared_subobject_has_one_introducing_node() {
        let shared = Value::object(IndexMap::new());
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), shared.clone());
        fields.insert("y".to_string(), shared.clone());
        let outer = Value::object(fields);
        let (node, ctx) = parse(&outer, FeatureGate::latest()).unwrap();
        let record = node.d.unwrap();
        assert_eq!(record.values[0].tag, Tag::Object);
        assert_eq!(record.values[1].tag, Tag::IndexedValue);
        assert_eq!(record.values[0].id, record.values[1].id);
        assert!(ctx.is_marked(record.values[0].id.unwrap()));
    }

    #[test]
    fn sparse_array_preserves_holes() {
        let arr = Value::array(vec![Some(Value::Number(1.0)), None, Some(Value::Number(3.0))]);
        let (node, _) = parse(&arr, FeatureGate::latest()).unwrap();
        assert_eq!(node.l, Some(3));
        let children = node.a.unwrap();
        assert!(children[0].is_some());
        assert!(children[1].is_none());
        assert!(children[2].is_some());
    }

    #[test]
    fn map_with_cyclic_key_is_supported() {
        let map = Value::map(Vec::new());
        if let Value::Map(rc) = &map {
            rc.borrow_mut().push((map.clone(), Value::Number(1.0)));
        }
        let (node, ctx) = parse(&map, FeatureGate::latest()).unwrap();
        assert_eq!(node.tag, Tag::Map);
        let id = node.id.unwrap();
        let record = node.d.unwrap();
        assert_eq!(record.values[0].tag, Tag::IndexedValue);
        assert_eq!(record.values[0].id, Some(id));
        assert!(ctx.is_marked(id));
    }

    #[test]
    fn disabled_map_feature_fails() {
        let map = Value::map(vec![]);
        let err = parse(&map, FeatureGate::none()).unwrap_err();
        assert!(matches!(err, Error::FeatureMissing(Feature::Map)));
    }

    #[test]
    fn pending_promise_fails_synchronously() {
        let promise = Value::Promise(std::rc::Rc::new(std::cell::RefCell::new(PromiseState::Pending(None))));
        let err = parse(&promise, FeatureGate::latest()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
    }

    #[test]
    fn registered_value_parses_as_reference() {
        let target = Value::object(IndexMap::new());
        let ptr = target.identity().unwrap();
        let key = format!("parser-test-key-{ptr}");
        codegraph_core::registry::register(key.clone(), ptr).ok();
        let (node, _) = parse(&target, FeatureGate::latest()).unwrap();
        assert_eq!(node.tag, Tag::Reference);
        assert_eq!(node.s, Some(key));
        // Keep the allocation alive for the rest of the process: the
        // registry maps raw pointer identity, and if this address gets
        // freed and reused by another test's Rc, that test would collide
        // with our registration.
        std::mem::forget(target);
    }

    #[test]
    fn registered_function_parses_as_reference() {
        let target = Value::function(());
        let ptr = target.identity().unwrap();
        let key = format!("parser-test-fn-key-{ptr}");
        codegraph_core::registry::register(key.clone(), ptr).ok();
        let (node, _) = parse(&target, FeatureGate::latest()).unwrap();
        assert_eq!(node.tag, Tag::Reference);
        assert_eq!(node.s, Some(key));
        std::mem::forget(target);
    }

    #[test]
    fn unregistered_function_is_unsupported() {
        let target = Value::function(());
        let err = parse(&target, FeatureGate::latest()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
    }
}
