//! Serializes an in-memory object graph — including shared references,
//! cycles, Maps/Sets, typed buffers, Errors, Promises, and a handful of
//! web-platform values — into a single self-evaluating source expression,
//! or into a JSON envelope for later compilation.
//!
//! # Pipeline
//!
//! `Value` graph → [`parser`]/[`parser_async`] (builds the IR defined in
//! `codegraph_core::ir`) → [`emitter`] (renders IR to source text). The
//! [`envelope`] module gives the IR a JSON-transportable shape when source
//! text isn't what the caller wants. [`api`] wires these into the six
//! functions most callers need; `value` and `host` are the two boundaries
//! a caller has to fill in themselves: the graph they're serializing, and
//! (for the reverse direction) something that can execute emitted code.
//!
//! # Modules
//!
//! - `value`: the dynamic value graph a caller hands to the parser
//! - `util`: number/date/byte text formatting shared by parser and emitter
//! - `parser` / `parser_async`: `Value` graph → IR
//! - `emitter`: IR → source text
//! - `envelope`: IR → JSON-transportable shape
//! - `host`: the host-evaluator boundary for the reverse direction
//! - `api`: public entry points

pub mod api;
pub mod emitter;
pub mod envelope;
pub mod host;
pub mod parser;
pub mod parser_async;
pub mod util;
pub mod value;

pub use api::{
    compile_json, deserialize, from_json, serialize, serialize_async, to_json, to_json_async, Options,
};
pub use envelope::Envelope;
pub use host::HostEvaluator;
pub use value::{
    AggregateErrorData, BigIntTypedArrayData, BigIntTypedArrayKind, BlobLike, DataViewData, ErrorData,
    FileLike, FormDataEntry, FormDataLike, HeadersLike, IterableData, PointerId, PromiseState, RegExpData,
    TypedArrayData, TypedArrayKind, UrlLike, Value, WellKnownSymbol,
};

pub use codegraph_core::{registry, Error, Feature, FeatureGate, Node, Record, Result, Tag};
