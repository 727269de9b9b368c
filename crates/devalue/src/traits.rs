//! Errors and extension traits for custom types.

use crate::classify::Unsupported;
use crate::value::Value;

/// Error that can occur when encoding or decoding a value graph.
///
/// Encode-time variants carry the accessor path of the offending node, e.g.
/// `.foo.array[0]` or `.cache.get("key")`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("cannot stringify a function")]
    UnsupportedCallable { path: String },

    #[error("cannot stringify arbitrary non-POJOs")]
    UnsupportedOpaqueObject { path: String },

    #[error("cannot stringify POJOs with symbolic keys")]
    UnsupportedKey { path: String },

    #[error("invalid input: {0}")]
    MalformedInput(String),

    #[error("unknown type {0:?}")]
    UnknownTag(String),

    #[error("tag {0:?} is reserved for a built-in type")]
    ReservedTag(String),

    #[error("failed to revive {tag:?}: {reason}")]
    Revive { tag: String, reason: String },
}

impl Error {
    pub(crate) fn unsupported(kind: Unsupported, path: String) -> Self {
        match kind {
            Unsupported::Callable => Error::UnsupportedCallable { path },
            Unsupported::OpaqueObject => Error::UnsupportedOpaqueObject { path },
            Unsupported::NonStringKey => Error::UnsupportedKey { path },
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedInput(reason.into())
    }

    /// Location of the offending node. Empty for decode errors and for
    /// errors at the root.
    pub fn path(&self) -> &str {
        match self {
            Error::UnsupportedCallable { path }
            | Error::UnsupportedOpaqueObject { path }
            | Error::UnsupportedKey { path } => path,
            _ => "",
        }
    }
}

/// A reducer turns values it recognizes into a tagged list of fields.
///
/// The fields are encoded like any other value, so they may contain objects,
/// shared references, or other custom values.
pub trait Reducer {
    /// Tag written in front of the fields (e.g., "Vector").
    fn tag(&self) -> &str;

    /// Fields for `value`, or `None` if this reducer does not handle it.
    fn reduce(&self, value: &Value) -> Option<Vec<Value>>;
}

/// A reviver rebuilds a value from the fields its matching reducer produced.
pub trait Reviver {
    /// Tag this reviver handles.
    fn tag(&self) -> &str;

    /// Construct the value. Fields arrive fully decoded.
    fn revive(&self, fields: Vec<Value>) -> Result<Value, String>;
}

/// A [`Reducer`] backed by a closure.
pub struct FnReducer<F> {
    tag: String,
    reduce: F,
}

impl<F> FnReducer<F>
where
    F: Fn(&Value) -> Option<Vec<Value>>,
{
    pub fn new(tag: impl Into<String>, reduce: F) -> Self {
        Self {
            tag: tag.into(),
            reduce,
        }
    }
}

impl<F> Reducer for FnReducer<F>
where
    F: Fn(&Value) -> Option<Vec<Value>>,
{
    fn tag(&self) -> &str {
        &self.tag
    }

    fn reduce(&self, value: &Value) -> Option<Vec<Value>> {
        (self.reduce)(value)
    }
}

/// A [`Reviver`] backed by a closure.
pub struct FnReviver<F> {
    tag: String,
    revive: F,
}

impl<F> FnReviver<F>
where
    F: Fn(Vec<Value>) -> Result<Value, String>,
{
    pub fn new(tag: impl Into<String>, revive: F) -> Self {
        Self {
            tag: tag.into(),
            revive,
        }
    }
}

impl<F> Reviver for FnReviver<F>
where
    F: Fn(Vec<Value>) -> Result<Value, String>,
{
    fn tag(&self) -> &str {
        &self.tag
    }

    fn revive(&self, fields: Vec<Value>) -> Result<Value, String> {
        (self.revive)(fields)
    }
}
