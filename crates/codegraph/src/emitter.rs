//! Emitter (§4.H): IR → a single self-evaluating expression string.
//!
//! Owns three mutable pieces of state while it walks the tree depth-first:
//! the variable allocator (marked ids get a name on first emission), the
//! ancestor stack (detects a child that equals a still-open ancestor —
//! that's a cycle, not an ordinary back-reference), and the deferred
//! assignment list (patches applied after the root expression finishes).

use std::collections::HashSet;

use tracing::trace;

use codegraph_core::escape;
use codegraph_core::{Error, Feature, FeatureGate, Node, Record, Result, Tag};

#[derive(Debug, Clone, PartialEq)]
enum PropKey {
    Index(usize),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
enum DeferredPatch {
    Prop {
        target_expr: String,
        key: PropKey,
        value_expr: String,
    },
    MapSet {
        target_expr: String,
        key_expr: String,
        value_expr: String,
    },
    SetAdd {
        target_expr: String,
        value_expr: String,
    },
}

/// Emit `root` as a single expression, given the marked-id set recorded by
/// the parser (§4.C) and the feature gate it ran under.
pub fn emit(root: &Node, gate: FeatureGate, marked: &[u32]) -> Result<String> {
    let mut emitter = Emitter {
        gate,
        marked: marked.iter().copied().collect(),
        vars: std::collections::HashMap::new(),
        ancestors: Vec::new(),
        deferred: Vec::new(),
    };
    let body = emitter.emit(root)?;
    emitter.finalize(root, body)
}

struct Emitter {
    gate: FeatureGate,
    marked: HashSet<u32>,
    vars: std::collections::HashMap<u32, String>,
    ancestors: Vec<u32>,
    deferred: Vec<DeferredPatch>,
}

impl Emitter {
    fn var_name(&mut self, id: u32) -> String {
        self.vars.entry(id).or_insert_with(|| format!("v{id}")).clone()
    }

    /// Wrap `build`'s result as `vN=<expr>` when `id` is marked, pushing
    /// `id` onto the ancestor stack for the duration of `build` so nested
    /// cyclic references can be detected. `build` itself may allocate a
    /// variable name for `id` that wasn't marked going in (e.g. a deferred
    /// field patch needs to reference its own owner) — the wrap check
    /// happens against `self.vars` *after* `build` runs, not against the
    /// `marked` flag captured before it, so either path gets the `vN=`
    /// prefix it needs.
    fn with_binding(
        &mut self,
        id: Option<u32>,
        build: impl FnOnce(&mut Self) -> Result<String>,
    ) -> Result<String> {
        let marked = id.map(|i| self.marked.contains(&i)).unwrap_or(false);
        if let Some(id) = id {
            self.ancestors.push(id);
        }
        if marked {
            self.var_name(id.unwrap());
        }
        let expr = build(self);
        if id.is_some() {
            self.ancestors.pop();
        }
        let expr = expr?;
        let needs_binding = id.map(|i| self.vars.contains_key(&i)).unwrap_or(false);
        if needs_binding {
            let name = self.var_name(id.unwrap());
            trace!(id = id.unwrap(), name = %name, "binding variable to expression");
            Ok(format!("{name}={expr}"))
        } else {
            Ok(expr)
        }
    }

    /// Resolve a child in an indexed (array index / object key) slot: an
    /// ancestor back-reference becomes a hole plus a deferred prop
    /// assignment; anything else is inlined.
    fn emit_prop_child(&mut self, owner_id: u32, key: PropKey, child: &Node) -> Result<Option<String>> {
        if child.tag == Tag::IndexedValue {
            let ref_id = child
                .id
                .ok_or_else(|| Error::AssertionFailed("IndexedValue node missing id".into()))?;
            if self.ancestors.contains(&ref_id) {
                let value_expr = self.var_name(ref_id);
                let target_expr = self.var_name(owner_id);
                trace!(owner_id, ref_id, "deferring prop assignment for ancestor cycle");
                self.deferred.push(DeferredPatch::Prop { target_expr, key, value_expr });
                return Ok(None);
            }
        }
        Ok(Some(self.emit(child)?))
    }

    fn emit_set_child(&mut self, owner_id: u32, child: &Node) -> Result<Option<String>> {
        if child.tag == Tag::IndexedValue {
            let ref_id = child
                .id
                .ok_or_else(|| Error::AssertionFailed("IndexedValue node missing id".into()))?;
            if self.ancestors.contains(&ref_id) {
                let value_expr = self.var_name(ref_id);
                let target_expr = self.var_name(owner_id);
                trace!(owner_id, ref_id, "deferring set.add for ancestor cycle");
                self.deferred.push(DeferredPatch::SetAdd { target_expr, value_expr });
                return Ok(None);
            }
        }
        Ok(Some(self.emit(child)?))
    }

    fn emit_map_pair(&mut self, owner_id: u32, key_node: &Node, value_node: &Node) -> Result<Option<(String, String)>> {
        let key_is_ancestor = self.is_ancestor_ref(key_node);
        let value_is_ancestor = self.is_ancestor_ref(value_node);
        if key_is_ancestor || value_is_ancestor {
            let key_expr = self.emit(key_node)?;
            let value_expr = self.emit(value_node)?;
            let target_expr = self.var_name(owner_id);
            trace!(owner_id, "deferring map.set for ancestor cycle");
            self.deferred.push(DeferredPatch::MapSet { target_expr, key_expr, value_expr });
            return Ok(None);
        }
        Ok(Some((self.emit(key_node)?, self.emit(value_node)?)))
    }

    fn is_ancestor_ref(&self, node: &Node) -> bool {
        node.tag == Tag::IndexedValue
            && node.id.map(|id| self.ancestors.contains(&id)).unwrap_or(false)
    }

    /// Decorate `base` with `record`'s fields, via one `Object.assign` call
    /// when that feature is on, else a deferred prop assignment per field.
    /// Shared by `Error`, `AggregateError`, and `NullConstructor`.
    fn apply_field_record(&mut self, owner_id: u32, base: String, record: Option<Record>) -> Result<String> {
        let record = match record {
            Some(r) if !r.keys.is_empty() => r,
            _ => return Ok(base),
        };
        if self.gate.test(Feature::ObjectAssign) {
            let mut pairs = Vec::new();
            for (key, value_node) in record.keys.iter().zip(record.values.iter()) {
                if let Some(text) = self.emit_prop_child(owner_id, PropKey::Name(key.clone()), value_node)? {
                    pairs.push(format!("{}:{}", render_key(key), text));
                }
            }
            if pairs.is_empty() {
                Ok(base)
            } else {
                Ok(format!("Object.assign({base},{{{}}})", pairs.join(",")))
            }
        } else {
            let target_expr = self.var_name(owner_id);
            trace!(owner_id, "deferring extra-field assignment, ObjectAssign disabled");
            for (key, value_node) in record.keys.iter().zip(record.values.iter()) {
                if let Some(value_expr) = self.emit_prop_child(owner_id, PropKey::Name(key.clone()), value_node)? {
                    self.deferred.push(DeferredPatch::Prop {
                        target_expr: target_expr.clone(),
                        key: PropKey::Name(key.clone()),
                        value_expr,
                    });
                }
            }
            Ok(base)
        }
    }

    fn emit(&mut self, node: &Node) -> Result<String> {
        match node.tag {
            Tag::True => Ok("true".to_string()),
            Tag::False => Ok("false".to_string()),
            Tag::Null => Ok("null".to_string()),
            Tag::Undefined => Ok("void 0".to_string()),
            Tag::NaN => Ok("NaN".to_string()),
            Tag::PositiveInfinity => Ok("Infinity".to_string()),
            Tag::NegativeInfinity => Ok("-Infinity".to_string()),
            Tag::NegativeZero => Ok("-0".to_string()),
            Tag::Number => Ok(node.s.clone().unwrap_or_default()),
            Tag::BigInt => Ok(format!("{}n", node.s.clone().unwrap_or_default())),
            Tag::String => Ok(format!("\"{}\"", node.s.clone().unwrap_or_default())),
            Tag::WellKnownSymbol => Ok(node.s.clone().unwrap_or_default()),
            Tag::IndexedValue => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("IndexedValue missing id".into()))?;
                Ok(self.var_name(id))
            }
            Tag::Reference => {
                let id = node.id;
                self.with_binding(id, |_this| {
                    let key = node.s.clone().unwrap_or_default();
                    Ok(format!("$R.get({})", escape::quote(&key)))
                })
            }
            Tag::Date => {
                let id = node.id;
                self.with_binding(id, |_this| {
                    Ok(format!("new Date({})", escape::quote(node.s.as_deref().unwrap_or(""))))
                })
            }
            Tag::RegExp => {
                let id = node.id;
                self.with_binding(id, |_this| {
                    let source = node.s.as_deref().unwrap_or("");
                    let flags = node.c.as_deref().unwrap_or("");
                    Ok(format!("new RegExp({},{})", escape::quote(source), escape::quote(flags)))
                })
            }
            Tag::Array => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("Array missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let children = node.a.clone().unwrap_or_default();
                    let mut parts = Vec::with_capacity(children.len());
                    for (i, child) in children.iter().enumerate() {
                        match child {
                            None => parts.push(String::new()),
                            Some(c) => match this.emit_prop_child(id, PropKey::Index(i), c)? {
                                Some(text) => parts.push(text),
                                None => parts.push(String::new()),
                            },
                        }
                    }
                    let mut rendered = parts.join(",");
                    if matches!(children.last(), Some(None)) {
                        rendered.push(',');
                    }
                    Ok(format!("[{rendered}]"))
                })
            }
            Tag::Object => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("Object missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let record = node.d.clone().unwrap_or_else(|| Record::keyless(vec![]));
                    let mut pairs = Vec::new();
                    for (key, value_node) in record.keys.iter().zip(record.values.iter()) {
                        if let Some(text) = this.emit_prop_child(id, PropKey::Name(key.clone()), value_node)? {
                            pairs.push(format!("{}:{}", render_key(key), text));
                        }
                    }
                    Ok(format!("{{{}}}", pairs.join(",")))
                })
            }
            Tag::NullConstructor => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("NullConstructor missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    this.apply_field_record(id, "Object.create(null)".to_string(), node.d.clone())
                })
            }
            Tag::Set => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("Set missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let children = node.a.clone().unwrap_or_default();
                    let mut inline = Vec::new();
                    for child in children.iter().flatten() {
                        if let Some(text) = this.emit_set_child(id, child)? {
                            inline.push(text);
                        }
                    }
                    Ok(format!("new Set([{}])", inline.join(",")))
                })
            }
            Tag::Map => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("Map missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let record = node.d.clone().unwrap_or_else(|| Record::keyless(vec![]));
                    let mut pairs = Vec::new();
                    for chunk in record.values.chunks(2) {
                        if let [k, v] = chunk
                            && let Some((ke, ve)) = this.emit_map_pair(id, k, v)?
                        {
                            pairs.push(format!("[{ke},{ve}]"));
                        }
                    }
                    Ok(format!("new Map([{}])", pairs.join(",")))
                })
            }
            Tag::Error => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("Error missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let ctor = node.c.clone().unwrap_or_else(|| "Error".to_string());
                    let msg = node.m.clone().unwrap_or_default();
                    let base = format!("new {ctor}({})", escape::quote(&msg));
                    this.apply_field_record(id, base, node.d.clone())
                })
            }
            Tag::AggregateError => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("AggregateError missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let msg = node.m.clone().unwrap_or_default();
                    let errs = node.a.clone().unwrap_or_default();
                    let mut parts = Vec::with_capacity(errs.len());
                    for (i, child) in errs.iter().enumerate() {
                        match child {
                            None => parts.push(String::new()),
                            Some(c) => match this.emit_prop_child(id, PropKey::Index(i), c)? {
                                Some(t) => parts.push(t),
                                None => parts.push(String::new()),
                            },
                        }
                    }
                    let base = format!("new AggregateError([{}],{})", parts.join(","), escape::quote(&msg));
                    this.apply_field_record(id, base, node.d.clone())
                })
            }
            Tag::TypedArray => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("TypedArray missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let ctor = node.c.clone().unwrap_or_default();
                    let children = node.a.clone().unwrap_or_default();
                    let mut parts = Vec::with_capacity(children.len());
                    for c in children.iter().flatten() {
                        parts.push(this.emit(c)?);
                    }
                    let mut expr = format!("new {ctor}([{}]", parts.join(","));
                    if let Some(offset) = node.b {
                        expr.push_str(&format!(",{offset}"));
                    }
                    expr.push(')');
                    Ok(expr)
                })
            }
            Tag::BigIntTypedArray => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("BigIntTypedArray missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let ctor = node.c.clone().unwrap_or_default();
                    let children = node.a.clone().unwrap_or_default();
                    let mut parts = Vec::with_capacity(children.len());
                    for c in children.iter().flatten() {
                        parts.push(this.emit(c)?);
                    }
                    let mut expr = format!("new {ctor}([{}]", parts.join(","));
                    if let Some(offset) = node.b {
                        expr.push_str(&format!(",{offset}"));
                    }
                    expr.push(')');
                    Ok(expr)
                })
            }
            Tag::ArrayBuffer => {
                let id = node.id;
                self.with_binding(id, |_this| {
                    let bytes = node.s.clone().unwrap_or_default();
                    if bytes.is_empty() {
                        Ok("new Uint8Array([]).buffer".to_string())
                    } else {
                        Ok(format!("new Uint8Array([{bytes}]).buffer"))
                    }
                })
            }
            Tag::DataView => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("DataView missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let buffer_node = node
                        .f
                        .as_deref()
                        .ok_or_else(|| Error::AssertionFailed("DataView missing buffer".into()))?;
                    let buffer_expr = this.emit(buffer_node)?;
                    let offset = node.b.unwrap_or(0);
                    let length = node.l.unwrap_or(0);
                    Ok(format!("new DataView({buffer_expr},{offset},{length})"))
                })
            }
            Tag::Blob => {
                let id = node.id;
                self.with_binding(id, |_this| {
                    let mime = node.c.clone().unwrap_or_default();
                    let buf_node = node
                        .f
                        .as_deref()
                        .ok_or_else(|| Error::AssertionFailed("Blob missing bytes".into()))?;
                    let bytes_text = buf_node.s.clone().unwrap_or_default();
                    Ok(format!(
                        "new Blob([new Uint8Array([{bytes_text}])],{{type:{}}})",
                        escape::quote(&mime)
                    ))
                })
            }
            Tag::File => {
                let id = node.id;
                self.with_binding(id, |_this| {
                    let mime = node.c.clone().unwrap_or_default();
                    let name = node.m.clone().unwrap_or_default();
                    let last_modified = node.b.unwrap_or(0);
                    let buf_node = node
                        .f
                        .as_deref()
                        .ok_or_else(|| Error::AssertionFailed("File missing bytes".into()))?;
                    let bytes_text = buf_node.s.clone().unwrap_or_default();
                    Ok(format!(
                        "new File([new Uint8Array([{bytes_text}])],{},{{type:{},lastModified:{last_modified}}})",
                        escape::quote(&name),
                        escape::quote(&mime)
                    ))
                })
            }
            Tag::Url => {
                let id = node.id;
                self.with_binding(id, |_this| Ok(format!("new URL({})", escape::quote(node.s.as_deref().unwrap_or("")))))
            }
            Tag::UrlSearchParams => {
                let id = node.id;
                self.with_binding(id, |this| {
                    let pairs = this.emit_string_pairs(node.d.clone())?;
                    Ok(format!("new URLSearchParams([{}])", pairs.join(",")))
                })
            }
            Tag::Headers => {
                let id = node.id;
                self.with_binding(id, |this| {
                    let pairs = this.emit_string_pairs(node.d.clone())?;
                    Ok(format!("new Headers([{}])", pairs.join(",")))
                })
            }
            Tag::FormData => {
                let id = node.id;
                self.with_binding(id, |this| {
                    let record = node.d.clone().unwrap_or_else(|| Record::keyless(vec![]));
                    let mut entries = Vec::new();
                    for chunk in record.values.chunks(2) {
                        if let [k, v] = chunk {
                            entries.push(format!("[{},{}]", this.emit(k)?, this.emit(v)?));
                        }
                    }
                    Ok(format!(
                        "(()=>{{const fd=new FormData();for(const[k,v] of [{}])fd.append(k,v);return fd}})()",
                        entries.join(",")
                    ))
                })
            }
            Tag::Iterable => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("Iterable missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let children = node.a.clone().unwrap_or_default();
                    let mut parts = Vec::with_capacity(children.len());
                    for c in children.iter().flatten() {
                        parts.push(this.emit(c)?);
                    }
                    let array_expr = format!("[{}]", parts.join(","));
                    if this.gate.test(Feature::ArrowFunction) {
                        Ok(format!("{{[Symbol.iterator]:()=>{array_expr}[Symbol.iterator]()}}"))
                    } else if this.gate.test(Feature::MethodShorthand) {
                        Ok(format!("{{[Symbol.iterator](){{return {array_expr}[Symbol.iterator]()}}}}"))
                    } else {
                        Ok(format!("{{[Symbol.iterator]:function(){{return {array_expr}[Symbol.iterator]()}}}}"))
                    }
                })
            }
            Tag::Promise => {
                let id = node.id.ok_or_else(|| Error::AssertionFailed("Promise missing id".into()))?;
                self.with_binding(Some(id), |this| {
                    let value_node = node
                        .f
                        .as_deref()
                        .ok_or_else(|| Error::AssertionFailed("Promise missing value".into()))?;
                    let is_ancestor = this.is_ancestor_ref(value_node);
                    let value_expr = this.emit(value_node)?;
                    if is_ancestor {
                        Ok(format!("Promise.resolve().then(()=>{value_expr})"))
                    } else {
                        Ok(format!("Promise.resolve({value_expr})"))
                    }
                })
            }
        }
    }

    fn emit_string_pairs(&mut self, record: Option<Record>) -> Result<Vec<String>> {
        let record = record.unwrap_or_else(|| Record::keyless(vec![]));
        let mut pairs = Vec::new();
        for chunk in record.values.chunks(2) {
            if let [k, v] = chunk {
                pairs.push(format!("[{},{}]", self.emit(k)?, self.emit(v)?));
            }
        }
        Ok(pairs)
    }

    /// Fold `body_expr` (the root's own rendered expression) and any deferred
    /// patches into the final comma-expression. Per §4.H, whenever patches
    /// exist the expression's *value* must still be the root's value, not
    /// the last patch's — so the root is always forced into a bound
    /// variable and pushed as the trailing comma-operand, regardless of
    /// whether the root happened to be marked during the walk.
    fn finalize(&mut self, root: &Node, body_expr: String) -> Result<String> {
        let patches = merge_deferred(std::mem::take(&mut self.deferred));

        let body = if patches.is_empty() {
            body_expr
        } else {
            let root_id = root
                .id
                .ok_or_else(|| Error::AssertionFailed("deferred patches exist but root carries no id to bind".into()))?;
            let root_var = self.var_name(root_id);
            trace!(root_id, "forcing root binding to carry comma-expression value through patches");
            let prefixed = if body_expr.starts_with(&format!("{root_var}=")) {
                body_expr
            } else {
                format!("{root_var}={body_expr}")
            };
            let mut parts = vec![prefixed];
            parts.extend(patches);
            parts.push(root_var);
            parts.join(",")
        };

        let mut var_ids: Vec<u32> = self.vars.keys().copied().collect();
        var_ids.sort_unstable();
        let var_names: Vec<String> = var_ids.iter().map(|id| self.vars[id].clone()).collect();

        if var_names.is_empty() {
            if body.starts_with('{') {
                Ok(format!("({body})"))
            } else {
                Ok(body)
            }
        } else if self.gate.test(Feature::ArrowFunction) {
            Ok(format!("(({})=>({body}))()", var_names.join(",")))
        } else {
            Ok(format!("(function({}){{return {body}}})()", var_names.join(",")))
        }
    }
}

fn render_key(key: &str) -> String {
    if is_bare_key(key) {
        key.to_string()
    } else {
        escape::quote(key)
    }
}

fn render_prop_target(target: &str, key: &PropKey) -> String {
    match key {
        PropKey::Index(i) => format!("{target}[{i}]"),
        PropKey::Name(name) => {
            if is_identifier(name) {
                format!("{target}.{name}")
            } else {
                format!("{target}[{}]", escape::quote(name))
            }
        }
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

fn is_numeric_key(key: &str) -> bool {
    key == "0" || (!key.starts_with('0') && key.parse::<u32>().is_ok())
}

fn is_bare_key(key: &str) -> bool {
    is_numeric_key(key) || is_identifier(key)
}

/// Coalesce adjacent deferred patches per §4.H's merge rules, returning the
/// final statement text for each (possibly chained) patch.
fn merge_deferred(patches: Vec<DeferredPatch>) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = patches.into_iter().peekable();
    while let Some(patch) = iter.next() {
        match patch {
            DeferredPatch::Prop { target_expr, key, value_expr } => {
                let mut chain = vec![render_prop_target(&target_expr, &key)];
                let value = value_expr;
                while let Some(DeferredPatch::Prop { value_expr: v2, .. }) = iter.peek() {
                    if *v2 != value {
                        break;
                    }
                    if let Some(DeferredPatch::Prop { target_expr: t2, key: k2, .. }) = iter.next() {
                        chain.push(render_prop_target(&t2, &k2));
                    }
                }
                out.push(format!("{}={}", chain.join("="), value));
            }
            DeferredPatch::MapSet { target_expr, key_expr, value_expr } => {
                let mut calls = vec![format!(".set({key_expr},{value_expr})")];
                while let Some(DeferredPatch::MapSet { target_expr: t2, .. }) = iter.peek() {
                    if *t2 != target_expr {
                        break;
                    }
                    if let Some(DeferredPatch::MapSet { key_expr: k2, value_expr: v2, .. }) = iter.next() {
                        calls.push(format!(".set({k2},{v2})"));
                    }
                }
                out.push(format!("{target_expr}{}", calls.concat()));
            }
            DeferredPatch::SetAdd { target_expr, value_expr } => {
                let mut calls = vec![format!(".add({value_expr})")];
                while let Some(DeferredPatch::SetAdd { target_expr: t2, .. }) = iter.peek() {
                    if *t2 != target_expr {
                        break;
                    }
                    if let Some(DeferredPatch::SetAdd { value_expr: v2, .. }) = iter.next() {
                        calls.push(format!(".add({v2})"));
                    }
                }
                out.push(format!("{target_expr}{}", calls.concat()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::Tag;

    #[test]
    fn plain_object_literal_has_no_wrapper_when_unmarked() {
        let node = Node::singleton(Tag::Object)
            .with_id(0)
            .with_d(Record::new(vec!["a".into()], vec![Node::singleton(Tag::Number).with_s("1")]));
        let out = emit(&node, FeatureGate::latest(), &[]).unwrap();
        assert_eq!(out, "({a:1})");
    }

    #[test]
    fn direct_cycle_emits_binding_and_deferred_self_assignment() {
        let back_ref = Node::singleton(Tag::IndexedValue).with_id(0);
        let node = Node::singleton(Tag::Object)
            .with_id(0)
            .with_d(Record::new(vec!["self".into()], vec![back_ref]));
        let out = emit(&node, FeatureGate::latest(), &[0]).unwrap();
        assert!(out.contains("v0={}"));
        assert!(out.contains("v0.self=v0"));
        assert!(out.ends_with("v0))()"), "unexpected trailing shape: {out}");
    }

    #[test]
    fn shared_subobject_inlines_second_occurrence() {
        let shared = Node::singleton(Tag::Object).with_id(1).with_d(Record::keyless(vec![]));
        let back_ref = Node::singleton(Tag::IndexedValue).with_id(1);
        let outer = Node::singleton(Tag::Object).with_id(0).with_d(Record::new(
            vec!["x".into(), "y".into()],
            vec![shared, back_ref],
        ));
        let out = emit(&outer, FeatureGate::latest(), &[1]).unwrap();
        assert!(out.contains("x:v1={}"));
        assert!(out.contains("y:v1"));
        assert!(!out.contains("v1.x")); // no deferred patch needed, it's a sibling not an ancestor
    }

    #[test]
    fn map_with_cyclic_key_defers_set_call() {
        let back_ref = Node::singleton(Tag::IndexedValue).with_id(0);
        let value = Node::singleton(Tag::Number).with_s("1");
        let node = Node::singleton(Tag::Map)
            .with_id(0)
            .with_l(1)
            .with_d(Record::pairs(vec![back_ref, value]));
        let out = emit(&node, FeatureGate::latest(), &[0]).unwrap();
        assert!(out.contains("v0=new Map([])"));
        assert!(out.contains("v0.set(v0,1)"));
    }

    #[test]
    fn sparse_array_renders_holes_with_trailing_comma() {
        let node = Node::singleton(Tag::Array).with_id(0).with_l(3).with_a(vec![
            Some(Node::singleton(Tag::Number).with_s("1")),
            None,
            Some(Node::singleton(Tag::Number).with_s("3")),
        ]);
        let out = emit(&node, FeatureGate::latest(), &[]).unwrap();
        assert_eq!(out, "[1,,3]");
    }

    #[test]
    fn trailing_hole_gets_extra_comma() {
        let node = Node::singleton(Tag::Array).with_id(0).with_l(3).with_a(vec![
            Some(Node::singleton(Tag::Number).with_s("1")),
            Some(Node::singleton(Tag::Number).with_s("2")),
            None,
        ]);
        let out = emit(&node, FeatureGate::latest(), &[]).unwrap();
        assert_eq!(out, "[1,2,,]");
    }

    #[test]
    fn string_with_script_tag_is_neutralized() {
        let node = Node::singleton(Tag::String).with_s("\\x3Cscript>\\x3C/script>");
        let out = emit(&node, FeatureGate::latest(), &[]).unwrap();
        assert!(!out.contains('<'));
    }

    #[test]
    fn bare_vs_quoted_object_keys() {
        assert!(is_bare_key("abc"));
        assert!(is_bare_key("_x$"));
        assert!(is_bare_key("0"));
        assert!(is_bare_key("12"));
        assert!(!is_bare_key("01"));
        assert!(!is_bare_key("a-b"));
    }

    #[test]
    fn non_root_extra_fields_bind_owner_when_object_assign_disabled() {
        // root={err:e}; e=new Error("msg"); e.extra="v" — err is not the
        // tree root, so it only gets a binding as a side effect of the
        // deferred extra-field patch below.
        let err = Node::singleton(Tag::Error)
            .with_id(1)
            .with_c("Error")
            .with_m("msg")
            .with_d(Record::new(vec!["extra".into()], vec![Node::singleton(Tag::String).with_s("v")]));
        let root = Node::singleton(Tag::Object)
            .with_id(0)
            .with_d(Record::new(vec!["err".into()], vec![err]));
        let gate = FeatureGate::latest().without(Feature::ObjectAssign);
        let out = emit(&root, gate, &[]).unwrap();
        assert!(out.contains("v1=new Error(\"msg\")"), "missing v1 binding: {out}");
        assert!(out.contains("v1.extra=\"v\""), "missing deferred patch: {out}");
        assert!(out.ends_with("v0))()"), "comma-expression must yield the root's bound value: {out}");
    }

    #[test]
    fn non_root_cycle_evaluates_to_root_value_not_last_patch() {
        // b={}; b.x=b; root={y:b} must evaluate to {y:b}, not to b itself.
        let b_self_ref = Node::singleton(Tag::IndexedValue).with_id(1);
        let b = Node::singleton(Tag::Object)
            .with_id(1)
            .with_d(Record::new(vec!["x".into()], vec![b_self_ref]));
        let root = Node::singleton(Tag::Object).with_id(0).with_d(Record::new(vec!["y".into()], vec![b]));
        let out = emit(&root, FeatureGate::latest(), &[1]).unwrap();
        assert!(out.contains("v1={}"));
        assert!(out.contains("v1.x=v1"));
        assert!(out.ends_with("v0))()"), "comma-expression must yield the root's value, not v1: {out}");
        assert!(out.contains("v0={y:v1"), "root must be bound and carry {{y:...}}: {out}");
    }

    #[test]
    fn no_arrow_function_falls_back_to_function_expression() {
        let back_ref = Node::singleton(Tag::IndexedValue).with_id(0);
        let node = Node::singleton(Tag::Object)
            .with_id(0)
            .with_d(Record::new(vec!["self".into()], vec![back_ref]));
        let gate = FeatureGate::latest().without(Feature::ArrowFunction);
        let out = emit(&node, gate, &[0]).unwrap();
        assert!(out.starts_with("(function(v0){return"));
    }
}
