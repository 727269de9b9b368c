//! Expression writer.
//!
//! Emits a value graph as a single JavaScript expression that evaluates to an
//! equivalent graph. Unshared nodes are written as literals. When anything is
//! shared, the expression is wrapped in an immediately invoked function whose
//! parameters are the shared nodes:
//!
//! ```text
//! (function(a){a.self=a;return a}({}))
//!            │  └─ mutations ─┘ │   └ shells
//!            └ shared nodes     └ root
//! ```
//!
//! Shells are created empty (`Array(n)`, `new Set`, `new Map`, `{}`,
//! `Object.create(null)`) and filled by one mutation statement per member, so
//! cycles never need forward references.

use crate::escape;
use crate::names;
use crate::value::{JsString, Object, ObjectData, PropertyKey, Proto, Value};
use crate::walk::{Custom, Occurrences};
use std::collections::HashMap;

/// Emits a walked graph as a JavaScript expression.
pub struct ExpressionWriter<'a> {
    occurrences: &'a Occurrences,
    names: HashMap<usize, String>,
}

enum Part {
    Value(Value),
    Hole,
}

enum Shape {
    Array { trailing_hole: bool },
    Set,
    Map,
    Record { bare: bool, keys: Vec<JsString> },
}

/// A container literal being rendered.
struct Frame {
    shape: Shape,
    parts: std::vec::IntoIter<Part>,
    done: Vec<String>,
}

enum Open {
    Leaf(String),
    Frame(Frame),
}

impl<'a> ExpressionWriter<'a> {
    pub fn new(occurrences: &'a Occurrences) -> Self {
        let names = occurrences
            .shared()
            .iter()
            .enumerate()
            .map(|(ordinal, object)| (object.id(), names::binding(ordinal)))
            .collect();
        Self { occurrences, names }
    }

    /// Emit `root`. `occurrences` must come from walking the same root.
    pub fn emit(root: &Value, occurrences: &Occurrences) -> String {
        let writer = ExpressionWriter::new(occurrences);
        let body = writer.expression(root);
        if writer.names.is_empty() {
            return body;
        }

        let mut params = Vec::new();
        let mut shells = Vec::new();
        let mut statements = Vec::new();
        for object in occurrences.shared() {
            let Some(name) = writer.names.get(&object.id()) else {
                continue;
            };
            params.push(name.as_str());
            shells.push(writer.shell(name, &object, &mut statements));
        }
        statements.push(format!("return {body}"));

        format!(
            "(function({}){{{}}}({}))",
            params.join(","),
            statements.join(";"),
            shells.join(",")
        )
    }

    /// Initial value for a shared node, pushing the statements that fill it.
    fn shell(&self, name: &str, object: &Object, statements: &mut Vec<String>) -> String {
        if let Some(Custom::Source(source)) = self.occurrences.custom(object) {
            return source.clone();
        }

        match &*object.borrow() {
            ObjectData::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if let Some(item) = item {
                        statements.push(format!("{name}[{i}]={}", self.expression(item)));
                    }
                }
                format!("Array({})", items.len())
            }

            ObjectData::Set(set) => {
                if !set.is_empty() {
                    let adds: Vec<String> = set
                        .iter()
                        .map(|item| format!("add({})", self.expression(item)))
                        .collect();
                    statements.push(format!("{name}.{}", adds.join(".")));
                }
                "new Set".to_string()
            }

            ObjectData::Map(map) => {
                if !map.is_empty() {
                    let sets: Vec<String> = map
                        .iter()
                        .map(|(key, value)| {
                            format!("set({}, {})", self.expression(key), self.expression(value))
                        })
                        .collect();
                    statements.push(format!("{name}.{}", sets.join(".")));
                }
                "new Map".to_string()
            }

            ObjectData::Record(record) => {
                let bare = record.proto == Proto::Null;
                for (key, value) in &record.properties {
                    let PropertyKey::String(key) = key else {
                        continue;
                    };
                    let value = self.expression(value);
                    statements.push(if !bare && *key == "__proto__" {
                        format!(
                            "Object.defineProperty({name},\"__proto__\",{{value:{value},enumerable:true,configurable:true,writable:true}})"
                        )
                    } else {
                        format!("{name}{}={value}", escape::safe_prop(key))
                    });
                }
                let shell = if bare { "Object.create(null)" } else { "{}" };
                shell.to_string()
            }

            other => leaf(other),
        }
    }

    /// Expression for `value`: a name if it is shared, a literal otherwise.
    fn expression(&self, value: &Value) -> String {
        let mut stack = match self.open(value) {
            Open::Leaf(text) => return text,
            Open::Frame(frame) => vec![frame],
        };

        loop {
            let Some(top) = stack.last_mut() else {
                return String::new();
            };
            match top.parts.next() {
                Some(Part::Hole) => top.done.push(String::new()),
                Some(Part::Value(child)) => match self.open(&child) {
                    Open::Leaf(text) => top.done.push(text),
                    Open::Frame(frame) => stack.push(frame),
                },
                None => {
                    let text = stack.pop().map(Frame::close).unwrap_or_default();
                    match stack.last_mut() {
                        Some(parent) => parent.done.push(text),
                        None => return text,
                    }
                }
            }
        }
    }

    fn open(&self, value: &Value) -> Open {
        let object = match value {
            Value::Object(object) => object,
            primitive => return Open::Leaf(escape::primitive(primitive).unwrap_or_default()),
        };
        if let Some(name) = self.names.get(&object.id()) {
            return Open::Leaf(name.clone());
        }
        if let Some(Custom::Source(source)) = self.occurrences.custom(object) {
            return Open::Leaf(source.clone());
        }

        let (shape, parts): (Shape, Vec<Part>) = match &*object.borrow() {
            ObjectData::Array(items) => (
                Shape::Array {
                    trailing_hole: matches!(items.last(), Some(None)),
                },
                items
                    .iter()
                    .map(|item| match item {
                        Some(value) => Part::Value(value.clone()),
                        None => Part::Hole,
                    })
                    .collect(),
            ),
            ObjectData::Set(set) => (Shape::Set, set.iter().cloned().map(Part::Value).collect()),
            ObjectData::Map(map) => (
                Shape::Map,
                map.iter()
                    .flat_map(|(key, value)| [Part::Value(key.clone()), Part::Value(value.clone())])
                    .collect(),
            ),
            ObjectData::Record(record) => {
                let (keys, parts) = record
                    .properties
                    .iter()
                    .filter_map(|(key, value)| match key {
                        PropertyKey::String(key) => Some((key.clone(), Part::Value(value.clone()))),
                        PropertyKey::Symbol(_) => None,
                    })
                    .unzip();
                let bare = record.proto == Proto::Null;
                (Shape::Record { bare, keys }, parts)
            }
            other => return Open::Leaf(leaf(other)),
        };
        Open::Frame(Frame {
            shape,
            parts: parts.into_iter(),
            done: Vec::new(),
        })
    }
}

impl Frame {
    fn close(self) -> String {
        match self.shape {
            Shape::Array { trailing_hole } => {
                let tail = if trailing_hole { "," } else { "" };
                format!("[{}{tail}]", self.done.join(","))
            }
            Shape::Set => format!("new Set([{}])", self.done.join(",")),
            Shape::Map => {
                let entries: Vec<String> = self
                    .done
                    .chunks(2)
                    .map(|pair| format!("[{}]", pair.join(",")))
                    .collect();
                format!("new Map([{}])", entries.join(","))
            }
            Shape::Record { bare, keys } => {
                let fields: Vec<String> = keys
                    .iter()
                    .zip(&self.done)
                    .map(|(key, value)| format!("{}:{value}", literal_key(key)))
                    .collect();
                let literal = format!("{{{}}}", fields.join(","));
                match (bare, fields.is_empty()) {
                    (false, _) => literal,
                    (true, true) => "Object.create(null)".to_string(),
                    (true, false) => format!("Object.assign(Object.create(null),{literal})"),
                }
            }
        }
    }
}

/// Key in an object literal. `__proto__` is computed so it defines an own
/// property instead of setting the prototype.
fn literal_key(key: &JsString) -> String {
    if *key == "__proto__" {
        "[\"__proto__\"]".to_string()
    } else {
        escape::safe_key(key)
    }
}

/// Literal for a node without children.
fn leaf(data: &ObjectData) -> String {
    match data {
        ObjectData::Boxed(inner) => {
            format!("Object({})", escape::primitive(inner).unwrap_or_default())
        }
        ObjectData::Date(ms) => format!("new Date({})", escape::js_number(*ms)),
        ObjectData::RegExp { source, flags } => {
            format!("new RegExp({}, {})", escape::quote(source), escape::quote(flags))
        }
        // Containers have frames; functions are rejected by the walk.
        _ => "void 0".to_string(),
    }
}
