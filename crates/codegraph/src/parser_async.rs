//! Async parser (§4.G): identical shape to the sync parser, except a
//! `Promise` node suspends until its value resolves. Recursion uses boxed
//! futures since `async fn` can't directly recurse.

use std::future::Future;
use std::pin::Pin;

use codegraph_core::registry;
use codegraph_core::{Error, Feature, FeatureGate, Node, ParserContext, Record, Result, Tag};

use crate::util;
use crate::value::{PromiseState, Value};

type BoxResultFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a>>;

/// Parse `root` into an IR tree plus the context that recorded its
/// identities, feature gate, and marked set, awaiting any promise nodes
/// encountered along the way.
pub async fn parse(root: &Value, gate: FeatureGate) -> Result<(Node, ParserContext)> {
    let mut ctx = ParserContext::new(gate);
    let node = parse_value(root, &mut ctx).await?;
    Ok((node, ctx))
}

fn parse_value<'a>(value: &'a Value, ctx: &'a mut ParserContext) -> BoxResultFuture<'a, Node> {
    Box::pin(async move {
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
            Value::Str(s) => {
                Ok(Node::singleton(Tag::String).with_s(codegraph_core::escape::escape(s)))
            }
            Value::WellKnownSymbol(sym) => {
                require(ctx, Feature::Symbol)?;
                Ok(Node::singleton(Tag::WellKnownSymbol).with_s(sym.name()))
            }
            _ => parse_reference_typed(value, ctx).await,
        }
    })
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

async fn parse_reference_typed(value: &Value, ctx: &mut ParserContext) -> Result<Node> {
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
    dispatch(value, id, ctx).await
}

async fn dispatch(value: &Value, id: u32, ctx: &mut ParserContext) -> Result<Node> {
    match value {
        Value::Array(rc) => {
            let items = rc.borrow().clone();
            let mut children = Vec::with_capacity(items.len());
            for item in items.iter() {
                children.push(match item {
                    Some(v) => Some(parse_value(v, ctx).await?),
                    None => None,
                });
            }
            Ok(Node::singleton(Tag::Array)
                .with_id(id)
                .with_l(children.len() as u32)
                .with_a(children))
        }
        Value::Object(rc) => {
            let fields = rc.borrow().clone();
            let record = parse_fields(fields.into_iter().collect(), ctx).await?;
            Ok(Node::singleton(Tag::Object).with_id(id).with_d(record))
        }
        Value::NullProtoObject(rc) => {
            let fields = rc.borrow().clone();
            let record = parse_fields(fields.into_iter().collect(), ctx).await?;
            Ok(Node::singleton(Tag::NullConstructor).with_id(id).with_d(record))
        }
        Value::Map(rc) => {
            require(ctx, Feature::Map)?;
            let entries = rc.borrow().clone();
            let count = entries.len();
            let record = parse_pairs(entries, ctx).await?;
            Ok(Node::singleton(Tag::Map)
                .with_id(id)
                .with_l(count as u32)
                .with_d(record))
        }
        Value::Set(rc) => {
            require(ctx, Feature::Set)?;
            let elements = rc.borrow().clone();
            let mut children = Vec::with_capacity(elements.len());
            for element in elements.iter() {
                children.push(Some(parse_value(element, ctx).await?));
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
            let (ctor, message, extra) = {
                let data = rc.borrow();
                (data.constructor_name.clone(), data.message.clone(), data.extra.clone())
            };
            let record = parse_fields(extra.into_iter().collect(), ctx).await?;
            Ok(Node::singleton(Tag::Error)
                .with_id(id)
                .with_c(ctor)
                .with_m(message)
                .with_d(record))
        }
        Value::AggregateError(rc) => {
            require(ctx, Feature::AggregateError)?;
            let (message, errors, extra) = {
                let data = rc.borrow();
                (data.message.clone(), data.errors.clone(), data.extra.clone())
            };
            let mut error_nodes = Vec::with_capacity(errors.len());
            for e in &errors {
                error_nodes.push(Some(parse_value(e, ctx).await?));
            }
            let record = parse_fields(extra.into_iter().collect(), ctx).await?;
            Ok(Node::singleton(Tag::AggregateError)
                .with_id(id)
                .with_m(message)
                .with_a(error_nodes)
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
            let buffer = parse_array_buffer_child(&rc.buffer, ctx).await?;
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
            let entries = rc.borrow().clone();
            let flat = flatten_string_pairs(entries);
            Ok(Node::singleton(Tag::UrlSearchParams)
                .with_id(id)
                .with_d(Record::pairs(flat)))
        }
        Value::Headers(rc) => {
            require(ctx, Feature::WebAPI)?;
            let flat = flatten_string_pairs(rc.entries());
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
                        parse_value(&Value::File(file), ctx).await?
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
                children.push(Some(parse_value(element, ctx).await?));
            }
            Ok(Node::singleton(Tag::Iterable)
                .with_id(id)
                .with_l(children.len() as u32)
                .with_a(children))
        }
        Value::Promise(rc) => {
            require(ctx, Feature::Promise)?;
            let pending = {
                let mut state = rc.borrow_mut();
                match &mut *state {
                    PromiseState::Resolved(v) => Some(Err(v.clone())),
                    PromiseState::Pending(slot) => slot.take().map(Ok),
                }
            };
            let resolved = match pending {
                Some(Err(v)) => v,
                Some(Ok(fut)) => {
                    let v = fut.await;
                    *rc.borrow_mut() = PromiseState::Resolved(v.clone());
                    v
                }
                None => {
                    return Err(Error::AssertionFailed(
                        "promise polled twice with no resolution cached".into(),
                    ));
                }
            };
            let child = parse_value(&resolved, ctx).await?;
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

async fn parse_array_buffer_child(buffer: &Value, ctx: &mut ParserContext) -> Result<Node> {
    match buffer {
        Value::ArrayBuffer(_) => parse_value(buffer, ctx).await,
        _ => Err(Error::UnsupportedType("DataView buffer must be an ArrayBuffer".into())),
    }
}

fn flatten_string_pairs(entries: impl IntoIterator<Item = (String, String)>) -> Vec<Node> {
    let mut flat = Vec::new();
    for (k, v) in entries {
        flat.push(Node::singleton(Tag::String).with_s(codegraph_core::escape::escape(&k)));
        flat.push(Node::singleton(Tag::String).with_s(codegraph_core::escape::escape(&v)));
    }
    flat
}

async fn parse_fields(fields: Vec<(String, Value)>, ctx: &mut ParserContext) -> Result<Record> {
    let (eager, deferred): (Vec<_>, Vec<_>) = fields.into_iter().partition(|(_, v)| !v.is_deferred());
    let mut keys = Vec::new();
    let mut values = Vec::new();
    for (k, v) in eager.into_iter().chain(deferred) {
        keys.push(k);
        values.push(parse_value(&v, ctx).await?);
    }
    Ok(Record::new(keys, values))
}

async fn parse_pairs(entries: Vec<(Value, Value)>, ctx: &mut ParserContext) -> Result<Record> {
    let (eager, deferred): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(|(k, v)| !k.is_deferred() && !v.is_deferred());
    let mut flat = Vec::new();
    for (k, v) in eager.into_iter().chain(deferred) {
        flat.push(parse_value(&k, ctx).await?);
        flat.push(parse_value(&v, ctx).await?);
    }
    Ok(Record::pairs(flat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PromiseState;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[tokio::test]
    async fn resolved_promise_parses_synchronously_fast_path() {
        let promise = Value::Promise(Rc::new(RefCell::new(PromiseState::Resolved(Value::Number(1.0)))));
        let (node, _) = parse(&promise, FeatureGate::latest()).await.unwrap();
        assert_eq!(node.tag, Tag::Promise);
        assert_eq!(node.f.unwrap().tag, Tag::Number);
    }

    #[tokio::test]
    async fn pending_promise_awaits_to_resolution() {
        let fut: Pin<Box<dyn Future<Output = Value>>> = Box::pin(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            Value::Str(Rc::from("done"))
        });
        let promise = Value::Promise(Rc::new(RefCell::new(PromiseState::Pending(Some(fut)))));
        let (node, _) = parse(&promise, FeatureGate::latest()).await.unwrap();
        assert_eq!(node.tag, Tag::Promise);
        assert_eq!(node.f.unwrap().s.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn file_inside_promise_round_trips_bytes() {
        struct TestFile;
        impl crate::value::BlobLike for TestFile {
            fn bytes(&self) -> Vec<u8> {
                b"Hello World".to_vec()
            }
            fn mime_type(&self) -> String {
                "text/plain".to_string()
            }
        }
        impl crate::value::FileLike for TestFile {
            fn file_name(&self) -> String {
                "hello.txt".to_string()
            }
            fn last_modified_ms(&self) -> i64 {
                1_681_027_542_680
            }
        }
        let file = Value::File(Rc::new(TestFile));
        let promise = Value::Promise(Rc::new(RefCell::new(PromiseState::Resolved(file))));
        let (node, _) = parse(&promise, FeatureGate::latest()).await.unwrap();
        let file_node = node.f.unwrap();
        assert_eq!(file_node.tag, Tag::File);
        assert_eq!(file_node.m.as_deref(), Some("hello.txt"));
        assert_eq!(file_node.c.as_deref(), Some("text/plain"));
        let buffer_node = file_node.f.unwrap();
        assert_eq!(buffer_node.s.as_deref(), Some("72,101,108,108,111,32,87,111,114,108,100"));
    }
}
