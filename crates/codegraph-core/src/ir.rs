//! IR node model (§3, §4.D): the tagged tree produced by the parsers and
//! consumed by the emitter. Pure data — construction, traversal, and
//! structural comparison only. Serialization-stable: round-tripping through
//! JSON (the envelope, §4.I) reproduces identical structure.

use serde::{Deserialize, Serialize};

/// The single discriminant every IR node carries (`t` slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    True = 0,
    False = 1,
    Null = 2,
    Undefined = 3,
    NaN = 4,
    PositiveInfinity = 5,
    NegativeInfinity = 6,
    NegativeZero = 7,
    Number = 8,
    BigInt = 9,
    String = 10,
    Date = 11,
    RegExp = 12,
    Array = 13,
    Object = 14,
    NullConstructor = 15,
    Set = 16,
    Map = 17,
    Error = 18,
    AggregateError = 19,
    TypedArray = 20,
    BigIntTypedArray = 21,
    ArrayBuffer = 22,
    DataView = 23,
    Blob = 24,
    File = 25,
    Url = 26,
    UrlSearchParams = 27,
    Headers = 28,
    FormData = 29,
    Iterable = 30,
    Promise = 31,
    Reference = 32,
    IndexedValue = 33,
    WellKnownSymbol = 34,
}

impl Tag {
    const VARIANTS: [Tag; 35] = [
        Tag::True,
        Tag::False,
        Tag::Null,
        Tag::Undefined,
        Tag::NaN,
        Tag::PositiveInfinity,
        Tag::NegativeInfinity,
        Tag::NegativeZero,
        Tag::Number,
        Tag::BigInt,
        Tag::String,
        Tag::Date,
        Tag::RegExp,
        Tag::Array,
        Tag::Object,
        Tag::NullConstructor,
        Tag::Set,
        Tag::Map,
        Tag::Error,
        Tag::AggregateError,
        Tag::TypedArray,
        Tag::BigIntTypedArray,
        Tag::ArrayBuffer,
        Tag::DataView,
        Tag::Blob,
        Tag::File,
        Tag::Url,
        Tag::UrlSearchParams,
        Tag::Headers,
        Tag::FormData,
        Tag::Iterable,
        Tag::Promise,
        Tag::Reference,
        Tag::IndexedValue,
        Tag::WellKnownSymbol,
    ];

    fn from_u8(v: u8) -> Option<Tag> {
        Tag::VARIANTS.into_iter().find(|t| *t as u8 == v)
    }
}

impl Serialize for Tag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> Result<Tag, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = u8::deserialize(deserializer)?;
        Tag::from_u8(v).ok_or_else(|| serde::de::Error::custom(format!("unknown IR tag {v}")))
    }
}

/// The `d` slot: a keys × values child record, used by objects, error
/// option bags, iterable options, and map bodies. `keys[i]` pairs with
/// `values[i]`; `arity` records the logical pair count (equal to
/// `keys.len()` except where a variant reuses the record for something
/// arity-shaped but keyless, e.g. map bodies use empty `keys`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    pub values: Vec<Node>,
    pub arity: usize,
}

impl Record {
    pub fn new(keys: Vec<String>, values: Vec<Node>) -> Self {
        let arity = values.len();
        Record { keys, values, arity }
    }

    pub fn keyless(values: Vec<Node>) -> Self {
        Record::new(Vec::new(), values)
    }

    /// A flat `[k0,v0,k1,v1,…]` pair record with no string keys — used by
    /// `Map`, `Headers`, `FormData`, and `URLSearchParams` bodies, whose
    /// keys are themselves IR nodes rather than plain strings. `arity` is
    /// the pair count, not `values.len()`.
    pub fn pairs(flat: Vec<Node>) -> Self {
        let arity = flat.len() / 2;
        Record {
            keys: Vec::new(),
            values: flat,
            arity,
        }
    }
}

/// One IR node. Every variant shares this fixed-arity frame of optional
/// slots; which slots are populated is determined by `tag`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "t")]
    pub tag: Tag,
    #[serde(rename = "i", skip_serializing_if = "Option::is_none", default)]
    pub id: Option<u32>,
    #[serde(rename = "s", skip_serializing_if = "Option::is_none", default)]
    pub s: Option<String>,
    #[serde(rename = "l", skip_serializing_if = "Option::is_none", default)]
    pub l: Option<u32>,
    #[serde(rename = "c", skip_serializing_if = "Option::is_none", default)]
    pub c: Option<String>,
    #[serde(rename = "m", skip_serializing_if = "Option::is_none", default)]
    pub m: Option<String>,
    #[serde(rename = "d", skip_serializing_if = "Option::is_none", default)]
    pub d: Option<Record>,
    /// Ordered child nodes. A `None` entry denotes an array hole (§3).
    #[serde(rename = "a", skip_serializing_if = "Option::is_none", default)]
    pub a: Option<Vec<Option<Node>>>,
    #[serde(rename = "f", skip_serializing_if = "Option::is_none", default)]
    pub f: Option<Box<Node>>,
    #[serde(rename = "b", skip_serializing_if = "Option::is_none", default)]
    pub b: Option<i64>,
}

impl Node {
    /// A bare node carrying only a tag (canonical singletons).
    pub fn singleton(tag: Tag) -> Self {
        Node {
            tag,
            id: None,
            s: None,
            l: None,
            c: None,
            m: None,
            d: None,
            a: None,
            f: None,
            b: None,
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_s(mut self, s: impl Into<String>) -> Self {
        self.s = Some(s.into());
        self
    }

    pub fn with_l(mut self, l: u32) -> Self {
        self.l = Some(l);
        self
    }

    pub fn with_c(mut self, c: impl Into<String>) -> Self {
        self.c = Some(c.into());
        self
    }

    pub fn with_m(mut self, m: impl Into<String>) -> Self {
        self.m = Some(m.into());
        self
    }

    pub fn with_d(mut self, d: Record) -> Self {
        self.d = Some(d);
        self
    }

    pub fn with_a(mut self, a: Vec<Option<Node>>) -> Self {
        self.a = Some(a);
        self
    }

    pub fn with_f(mut self, f: Node) -> Self {
        self.f = Some(Box::new(f));
        self
    }

    pub fn with_b(mut self, b: i64) -> Self {
        self.b = Some(b);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trips_through_json() {
        for tag in Tag::VARIANTS {
            let json = serde_json::to_string(&tag).unwrap();
            let back: Tag = serde_json::from_str(&json).unwrap();
            assert_eq!(back, tag);
        }
    }

    #[test]
    fn node_round_trips_through_json() {
        let node = Node::singleton(Tag::Array)
            .with_id(3)
            .with_l(2)
            .with_a(vec![Some(Node::singleton(Tag::Number).with_s("1")), None]);
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn omitted_slots_are_absent_from_json() {
        let node = Node::singleton(Tag::Null);
        let json = serde_json::to_value(&node).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1, "only `t` should be present: {obj:?}");
    }
}
