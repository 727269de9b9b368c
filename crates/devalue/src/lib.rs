//! Serialize value graphs, cycles and shared references included.
//!
//! `devalue` turns a dynamically typed value graph into text, in one of two
//! forms:
//!
//! - [`uneval`]: a single JavaScript expression that evaluates to an
//!   equivalent graph
//! - [`stringify`]: a compact JSON array of indexed slots, read back with
//!   [`parse`]
//!
//! # Architecture
//!
//! ```text
//!                 ┌─> walk ──> Occurrences ──> ExpressionWriter ──> expression
//! Value ─classify─┤                 │
//!                 │                 └──> flatten ──> ArrayWriter ──> JSON text
//!                 │                                                     │
//! Value <──────── unflatten <── Flattened <── wire::read <──────────────┘
//! ```
//!
//! The walker counts references per object node. Nodes seen more than once
//! are shared: the expression form binds them to parameters of an
//! immediately invoked function, and the array form stores them in one slot
//! that everything else refers to by index.
//!
//! # Example
//!
//! ```
//! use devalue::{Value, parse, stringify, uneval};
//!
//! let node = Value::record([("name", Value::from("root"))]);
//! node.as_object().unwrap().set_property("self", node.clone());
//!
//! assert_eq!(
//!     uneval(&node)?,
//!     r#"(function(a){a.name="root";a.self=a;return a}({}))"#
//! );
//! assert_eq!(stringify(&node)?, r#"[{"name":1,"self":0},"root"]"#);
//!
//! let copy = parse(&stringify(&node)?)?;
//! assert!(copy.get("self").unwrap().ptr_eq(&copy));
//! # Ok::<(), devalue::Error>(())
//! ```
//!
//! # Custom types
//!
//! Values the built-in kinds do not cover can be written with a [`Reducer`]
//! and read back with a matching [`Reviver`]. Both are registered in
//! per-call tables ([`Reducers`], [`Revivers`]); nothing is global.
//!
//! # Safety of the output
//!
//! Both forms can be inlined in an HTML `<script>` element: `<`, U+2028 and
//! U+2029 are always escaped, and unpaired surrogates are written as `\u`
//! escapes.

pub mod classify;
pub mod config;
pub mod escape;
pub mod flatten;
pub mod names;
pub mod registry;
pub mod traits;
pub mod value;
pub mod walk;

pub mod input;
pub mod output;

// Re-exports: value model
pub use value::{DeepEq, JsString, Object, ObjectData, PropertyKey, Proto, Value};

// Re-exports: traits and errors
pub use traits::{Error, FnReducer, FnReviver, Reducer, Reviver};

// Re-exports: registry and config
pub use config::DecodeConfig;
pub use registry::{Reducers, Revivers};

// Re-exports: pipeline stages
pub use flatten::{Flattened, Slot};
pub use input::unflatten;
pub use output::{ArrayWriter, ExpressionWriter};
pub use walk::{Custom, Occurrences};

/// Render `value` as a JavaScript expression.
pub fn uneval(value: &Value) -> Result<String, Error> {
    uneval_with(value, |_| None)
}

/// Like [`uneval`], but `replacer` may supply the source text for any object
/// node. Its output is inserted verbatim.
pub fn uneval_with(
    value: &Value,
    replacer: impl Fn(&Value) -> Option<String>,
) -> Result<String, Error> {
    let occurrences = walk::walk_with(value, |node| replacer(node).map(Custom::Source))?;
    Ok(ExpressionWriter::emit(value, &occurrences))
}

/// Render `value` in the indexed array format.
pub fn stringify(value: &Value) -> Result<String, Error> {
    stringify_with(value, &Reducers::new())
}

/// Like [`stringify`], writing values the `reducers` accept as custom slots.
pub fn stringify_with(value: &Value, reducers: &Reducers) -> Result<String, Error> {
    Ok(ArrayWriter::emit(&encode(value, reducers)?))
}

/// Flatten `value` into slots without rendering them.
pub fn encode(value: &Value, reducers: &Reducers) -> Result<Flattened, Error> {
    let occurrences = walk::walk_with(value, |node| reducers.reduce(node))?;
    flatten::flatten(value, &occurrences)
}

/// Parse text produced by [`stringify`].
pub fn parse(text: &str) -> Result<Value, Error> {
    parse_with(text, &Revivers::new())
}

/// Like [`parse`], reviving custom slots with `revivers`.
pub fn parse_with(text: &str, revivers: &Revivers) -> Result<Value, Error> {
    parse_with_config(text, revivers, &DecodeConfig::default())
}

/// Like [`parse_with`], enforcing the limits in `config`.
pub fn parse_with_config(
    text: &str,
    revivers: &Revivers,
    config: &DecodeConfig,
) -> Result<Value, Error> {
    let flattened = input::read(text, config)?;
    unflatten(&flattened, revivers)
}
