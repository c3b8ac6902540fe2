//! The dynamic value graph a caller hands to the parser.
//!
//! `spec.md` assumes a dynamic host runtime where every object carries
//! implicit identity. Rust has no such thing, so reference-typed subjects
//! here are `Rc`-wrapped: two clones of the same `Rc` collapse to one
//! identity (`Rc::as_ptr`), which is the idiomatic Rust analogue of "the
//! same object encountered twice" (see `SPEC_FULL.md`).
//!
//! Mirrors the teacher's own `Value` enum (`crates/runtime/src/value.rs`:
//! "pure data... independent of Stack structure") in spirit — a flat
//! discriminated union callers build directly — generalized to the richer
//! variant set this system needs (maps/sets/errors/promises/typed buffers/
//! web-platform values) instead of the teacher's stack-machine primitives.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use indexmap::IndexMap;

/// Opaque per-allocation identity, used as the identity-table key (§3 `id`).
pub type PointerId = usize;

fn thin<T: ?Sized>(ptr: *const T) -> PointerId {
    ptr as *const () as PointerId
}

/// A typed-array element kind (§3 `TypedArray`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedArrayKind {
    Int8Array,
    Uint8Array,
    Uint8ClampedArray,
    Int16Array,
    Uint16Array,
    Int32Array,
    Uint32Array,
    Float32Array,
    Float64Array,
}

impl TypedArrayKind {
    pub fn ctor_name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8Array => "Int8Array",
            TypedArrayKind::Uint8Array => "Uint8Array",
            TypedArrayKind::Uint8ClampedArray => "Uint8ClampedArray",
            TypedArrayKind::Int16Array => "Int16Array",
            TypedArrayKind::Uint16Array => "Uint16Array",
            TypedArrayKind::Int32Array => "Int32Array",
            TypedArrayKind::Uint32Array => "Uint32Array",
            TypedArrayKind::Float32Array => "Float32Array",
            TypedArrayKind::Float64Array => "Float64Array",
        }
    }
}

/// A BigInt-backed typed-array element kind (§3 `BigIntTypedArray`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BigIntTypedArrayKind {
    BigInt64Array,
    BigUint64Array,
}

impl BigIntTypedArrayKind {
    pub fn ctor_name(self) -> &'static str {
        match self {
            BigIntTypedArrayKind::BigInt64Array => "BigInt64Array",
            BigIntTypedArrayKind::BigUint64Array => "BigUint64Array",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegExpData {
    pub source: String,
    pub flags: String,
}

#[derive(Debug, Clone)]
pub struct ErrorData {
    pub constructor_name: String,
    pub message: String,
    /// Extra enumerable own properties, in insertion order.
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct AggregateErrorData {
    pub message: String,
    pub errors: Vec<Value>,
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct TypedArrayData {
    pub kind: TypedArrayKind,
    pub elements: Vec<f64>,
    pub byte_offset: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct BigIntTypedArrayData {
    pub kind: BigIntTypedArrayKind,
    pub elements: Vec<i128>,
    pub byte_offset: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct DataViewData {
    pub buffer: Value,
    pub byte_offset: usize,
    pub byte_length: usize,
}

/// Capability interface for binary blobs (§1): the parser only ever needs
/// byte content and a MIME type. Implemented by the host.
pub trait BlobLike {
    fn bytes(&self) -> Vec<u8>;
    fn mime_type(&self) -> String;
}

/// Capability interface for files: a named, timestamped blob.
pub trait FileLike: BlobLike {
    fn file_name(&self) -> String;
    fn last_modified_ms(&self) -> i64;
}

/// Capability interface for URL objects: the parser only needs the href.
pub trait UrlLike {
    fn href(&self) -> String;
}

/// Capability interface for header bags.
pub trait HeadersLike {
    fn entries(&self) -> Vec<(String, String)>;
}

/// One FormData entry: a plain string field or a file attachment.
#[derive(Clone)]
pub enum FormDataEntry {
    Text(String),
    File(Rc<dyn FileLike>),
}

/// Capability interface for multipart form bodies.
pub trait FormDataLike {
    fn entries(&self) -> Vec<(String, FormDataEntry)>;
}

/// Single-shot iterable state (§4.F "deferred" children): a generator-like
/// value can only be drained once. `drain` takes the underlying iterator,
/// leaving `None` behind so a second drain attempt observes emptiness
/// rather than re-running side effects.
pub struct IterableData {
    source: RefCell<Option<Box<dyn Iterator<Item = Value>>>>,
}

impl IterableData {
    pub fn new(iter: impl Iterator<Item = Value> + 'static) -> Self {
        IterableData {
            source: RefCell::new(Some(Box::new(iter))),
        }
    }

    /// Drain all remaining elements. Returns an empty `Vec` if this
    /// iterable has already been drained.
    pub fn drain(&self) -> Vec<Value> {
        self.source
            .borrow_mut()
            .take()
            .map(|it| it.collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for IterableData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterableData").finish_non_exhaustive()
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = Value>>>;

/// A promise's resolution state. Rejection is out of scope (§1 Non-goals
/// cover only successful reconstruction); a rejected promise is represented
/// by the host simply never handing one to the parser.
pub enum PromiseState {
    Resolved(Value),
    Pending(Option<BoxFuture>),
}

impl fmt::Debug for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromiseState::Resolved(v) => f.debug_tuple("Resolved").field(v).finish(),
            PromiseState::Pending(_) => write!(f, "Pending(..)"),
        }
    }
}

/// Well-known symbols (§3 `WellKnownSymbol`). Unlike other reference types
/// these are realm-global singletons: referencing one twice in output is
/// just the same literal token twice, so they carry no identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownSymbol {
    Iterator,
    AsyncIterator,
    HasInstance,
    ToPrimitive,
    ToStringTag,
}

impl WellKnownSymbol {
    pub fn name(self) -> &'static str {
        match self {
            WellKnownSymbol::Iterator => "Symbol.iterator",
            WellKnownSymbol::AsyncIterator => "Symbol.asyncIterator",
            WellKnownSymbol::HasInstance => "Symbol.hasInstance",
            WellKnownSymbol::ToPrimitive => "Symbol.toPrimitive",
            WellKnownSymbol::ToStringTag => "Symbol.toStringTag",
        }
    }
}

/// The dynamic value graph. Primitives carry no identity; every other
/// variant is `Rc`-wrapped and its allocation address is its identity.
///
/// `Debug` is hand-rolled rather than derived: a couple of variants hold
/// `Rc<dyn Trait>` trait objects with no `Debug` bound, so this just prints
/// the variant name and identity for those.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Decimal text, optional leading `-`. Arbitrary precision is a text
    /// concern, not a numeric one, at this layer.
    BigInt(Rc<str>),
    Str(Rc<str>),
    WellKnownSymbol(WellKnownSymbol),

    /// `None` entries are holes (§3).
    Array(Rc<RefCell<Vec<Option<Value>>>>),
    Object(Rc<RefCell<IndexMap<String, Value>>>),
    /// `Object.create(null)` — no prototype.
    NullProtoObject(Rc<RefCell<IndexMap<String, Value>>>),
    /// Ordered key/value pairs. Not `IndexMap<Value, Value>`: keys may
    /// themselves be cyclic (spec scenario: `m.set(m, 1)`), so they can't
    /// be required to implement `Hash`.
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
    Set(Rc<RefCell<Vec<Value>>>),

    Date(Rc<f64>),
    RegExp(Rc<RegExpData>),
    Error(Rc<RefCell<ErrorData>>),
    AggregateError(Rc<RefCell<AggregateErrorData>>),

    TypedArray(Rc<TypedArrayData>),
    BigIntTypedArray(Rc<BigIntTypedArrayData>),
    ArrayBuffer(Rc<Vec<u8>>),
    DataView(Rc<DataViewData>),

    Blob(Rc<dyn BlobLike>),
    File(Rc<dyn FileLike>),
    Url(Rc<dyn UrlLike>),
    UrlSearchParams(Rc<RefCell<Vec<(String, String)>>>),
    Headers(Rc<dyn HeadersLike>),
    FormData(Rc<dyn FormDataLike>),

    Iterable(Rc<IterableData>),
    Promise(Rc<RefCell<PromiseState>>),

    /// A function value (§4.F: "functions ... are permitted only if
    /// pre-registered; else Unsupported"). Carries no callable behavior —
    /// the parser only ever needs its identity, to check the registry and
    /// either emit a `Reference` or fail with `Error::UnsupportedType`.
    Function(Rc<dyn Any>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::BigInt(s) => write!(f, "BigInt({s})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::WellKnownSymbol(s) => write!(f, "WellKnownSymbol({s:?})"),
            other => f
                .debug_struct(match other {
                    Value::Array(_) => "Array",
                    Value::Object(_) => "Object",
                    Value::NullProtoObject(_) => "NullProtoObject",
                    Value::Map(_) => "Map",
                    Value::Set(_) => "Set",
                    Value::Date(_) => "Date",
                    Value::RegExp(_) => "RegExp",
                    Value::Error(_) => "Error",
                    Value::AggregateError(_) => "AggregateError",
                    Value::TypedArray(_) => "TypedArray",
                    Value::BigIntTypedArray(_) => "BigIntTypedArray",
                    Value::ArrayBuffer(_) => "ArrayBuffer",
                    Value::DataView(_) => "DataView",
                    Value::Blob(_) => "Blob",
                    Value::File(_) => "File",
                    Value::Url(_) => "Url",
                    Value::UrlSearchParams(_) => "UrlSearchParams",
                    Value::Headers(_) => "Headers",
                    Value::FormData(_) => "FormData",
                    Value::Iterable(_) => "Iterable",
                    Value::Promise(_) => "Promise",
                    Value::Function(_) => "Function",
                    _ => unreachable!(),
                })
                .field("id", &other.identity())
                .finish(),
        }
    }
}

impl Value {
    /// This value's identity, or `None` for primitives and well-known
    /// symbols (§3: "Primitives carry no id").
    pub fn identity(&self) -> Option<PointerId> {
        match self {
            Value::Undefined
            | Value::Null
            | Value::Bool(_)
            | Value::Number(_)
            | Value::BigInt(_)
            | Value::Str(_)
            | Value::WellKnownSymbol(_) => None,
            Value::Array(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Object(rc) | Value::NullProtoObject(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Map(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Set(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Date(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::RegExp(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Error(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::AggregateError(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::TypedArray(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::BigIntTypedArray(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::ArrayBuffer(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::DataView(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Blob(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::File(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Url(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::UrlSearchParams(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Headers(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::FormData(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Iterable(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Promise(rc) => Some(thin(Rc::as_ptr(rc))),
            Value::Function(rc) => Some(thin(Rc::as_ptr(rc))),
        }
    }

    /// Whether this value's children must be drained after every sibling
    /// eager child has recursed (§4.F "Ordering rule inside objects /
    /// maps"). Only custom iterables have this single-shot-drain hazard;
    /// arrays/sets/maps materialize immediately.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::Iterable(_))
    }

    pub fn object(fields: IndexMap<String, Value>) -> Value {
        Value::Object(Rc::new(RefCell::new(fields)))
    }

    pub fn array(elements: Vec<Option<Value>>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn set(elements: Vec<Value>) -> Value {
        Value::Set(Rc::new(RefCell::new(elements)))
    }

    /// Wrap any host-owned handle as a function value. The handle's content
    /// is never inspected; only its `Rc` identity matters to the parser.
    pub fn function<T: 'static>(handle: T) -> Value {
        Value::Function(Rc::new(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_have_no_identity() {
        assert_eq!(Value::Null.identity(), None);
        assert_eq!(Value::Bool(true).identity(), None);
        assert_eq!(Value::Number(1.0).identity(), None);
        assert_eq!(Value::Str(Rc::from("hi")).identity(), None);
    }

    #[test]
    fn shared_rc_has_same_identity() {
        let shared = Value::object(IndexMap::new());
        let a = shared.clone();
        let b = shared.clone();
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn distinct_values_have_distinct_identity() {
        let a = Value::object(IndexMap::new());
        let b = Value::object(IndexMap::new());
        assert_ne!(a.identity(), b.identity());
    }
}
