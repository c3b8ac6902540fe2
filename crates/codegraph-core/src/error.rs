//! Error kinds shared by the parser and emitter.
//!
//! Mirrors the shape of a hand-rolled serialization error enum: one variant
//! per failure mode, a `Display` impl that gives a one-line human message,
//! and `source()` forwarding wrapped errors rather than swallowing them.

use std::fmt;

use crate::feature::Feature;

/// Failure modes surfaced by the parser, emitter, and the host-evaluator
/// boundary.
#[derive(Debug)]
pub enum Error {
    /// An input value has no representable IR shape: a raw function or
    /// symbol without a pre-registered identity, or a host type outside the
    /// enumerated variant set.
    UnsupportedType(String),

    /// A value requires a feature the gate has turned off (e.g. a `Map`
    /// when the `Map` flag is disabled).
    FeatureMissing(Feature),

    /// An internal invariant was violated. Never expected in valid use;
    /// a marker that parser/emitter bookkeeping has a bug.
    AssertionFailed(String),

    /// `deserialize` / `fromJSON` propagate the host evaluator's failure
    /// verbatim.
    EvaluationFailed(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedType(what) => write!(f, "unsupported value: {what}"),
            Error::FeatureMissing(feature) => {
                write!(f, "value requires disabled feature: {feature:?}")
            }
            Error::AssertionFailed(msg) => write!(f, "internal invariant violated: {msg}"),
            Error::EvaluationFailed(e) => write!(f, "host evaluation failed: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::EvaluationFailed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
