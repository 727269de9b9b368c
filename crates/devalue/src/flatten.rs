//! Flattening a value graph into indexed slots.
//!
//! Every node gets one index, assigned in pre-order first-encounter order, and
//! one slot. Containers refer to their children by index, so shared and cyclic
//! references need no special handling. Special scalars never get a slot; they
//! are referred to by a negative [`sentinel`].
//!
//! ```text
//! value ──walk──> Occurrences ──flatten──> Flattened { root, slots }
//!                                              │
//!                      stringify <─────────────┤
//!                      unflatten <─────────────┘
//! ```

use crate::classify::{self, Kind, Unsupported};
use crate::traits::Error;
use crate::value::{self, JsString, ObjectData, PropertyKey, Value};
use crate::walk::{Custom, Occurrences};
use std::collections::HashMap;

/// Reserved negative indices.
pub mod sentinel {
    pub const UNDEFINED: i64 = -1;
    /// A missing list element.
    pub const HOLE: i64 = -2;
    pub const NAN: i64 = -3;
    pub const POSITIVE_INFINITY: i64 = -4;
    pub const NEGATIVE_INFINITY: i64 = -5;
    pub const NEGATIVE_ZERO: i64 = -6;

    /// Whether `index` is any sentinel.
    pub fn is_sentinel(index: i64) -> bool {
        (NEGATIVE_ZERO..=UNDEFINED).contains(&index)
    }
}

/// A scalar stored directly in a slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Bool(bool),
    /// Always finite and never negative zero.
    Number(f64),
    String(JsString),
}

/// One entry of the flattened sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Primitive(Primitive),
    /// Decimal digits with an optional leading `-`.
    BigInt(String),
    /// Element indices; [`sentinel::HOLE`] marks a hole.
    List(Vec<i64>),
    Record {
        bare: bool,
        entries: Vec<(JsString, i64)>,
    },
    Set(Vec<i64>),
    Map(Vec<(i64, i64)>),
    /// A boxed scalar, referring to the scalar's index.
    Boxed(i64),
    /// ISO-8601 text; empty for an invalid timestamp.
    Date(String),
    RegExp {
        source: JsString,
        flags: JsString,
    },
    Custom {
        tag: String,
        fields: Vec<i64>,
    },
}

impl Slot {
    /// Fill the child reference at `position`. List positions count holes;
    /// map positions alternate key and value.
    fn set_ref(&mut self, position: usize, index: i64) {
        match self {
            Slot::List(refs) | Slot::Set(refs) => refs[position] = index,
            Slot::Custom { fields, .. } => fields[position] = index,
            Slot::Record { entries, .. } => entries[position].1 = index,
            Slot::Map(entries) => {
                let entry = &mut entries[position / 2];
                if position % 2 == 0 {
                    entry.0 = index;
                } else {
                    entry.1 = index;
                }
            }
            Slot::Boxed(inner) => *inner = index,
            Slot::Primitive(_) | Slot::BigInt(_) | Slot::Date(_) | Slot::RegExp { .. } => {}
        }
    }
}

/// A flattened graph. `root` is 0 unless the whole value is a special scalar,
/// in which case it is that sentinel and `slots` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Flattened {
    pub root: i64,
    pub slots: Vec<Slot>,
}

#[derive(PartialEq, Eq, Hash)]
enum PrimitiveKey {
    Null,
    Bool(bool),
    Number(u64),
    String(JsString),
    BigInt(String),
}

enum Target {
    Root,
    Child { slot: usize, position: usize },
}

struct Flattener<'a> {
    occurrences: &'a Occurrences,
    slots: Vec<Slot>,
    objects: HashMap<usize, i64>,
    primitives: HashMap<PrimitiveKey, i64>,
    stack: Vec<(Value, Target)>,
}

/// Flatten `root`. `occurrences` must come from walking the same root; it
/// supplies the custom replacements the walk recorded.
pub fn flatten(root: &Value, occurrences: &Occurrences) -> Result<Flattened, Error> {
    let mut flattener = Flattener {
        occurrences,
        slots: Vec::new(),
        objects: HashMap::new(),
        primitives: HashMap::new(),
        stack: vec![(root.clone(), Target::Root)],
    };

    let mut root_index = 0;
    while let Some((value, target)) = flattener.stack.pop() {
        let index = flattener.index_of(&value)?;
        match target {
            Target::Root => root_index = index,
            Target::Child { slot, position } => flattener.slots[slot].set_ref(position, index),
        }
    }

    tracing::debug!(slots = flattener.slots.len(), "flattened value graph");
    Ok(Flattened {
        root: root_index,
        slots: flattener.slots,
    })
}

impl Flattener<'_> {
    fn allocate(&mut self, slot: Slot) -> i64 {
        self.slots.push(slot);
        (self.slots.len() - 1) as i64
    }

    /// Index for `value`, allocating a slot on first encounter and scheduling
    /// its children.
    fn index_of(&mut self, value: &Value) -> Result<i64, Error> {
        if let Some(sentinel) = classify::special(value).and_then(|special| special.sentinel()) {
            return Ok(sentinel);
        }

        let object = match value {
            Value::Object(object) => object,
            primitive => return Ok(self.primitive(primitive)),
        };
        if let Some(&index) = self.objects.get(&object.id()) {
            return Ok(index);
        }

        let (slot, children) = match self.occurrences.custom(object) {
            Some(Custom::Reduced { tag, fields }) => (
                Slot::Custom {
                    tag: tag.clone(),
                    fields: vec![0; fields.len()],
                },
                fields.iter().cloned().enumerate().collect(),
            ),
            Some(Custom::Source(_)) => {
                return Err(Error::unsupported(Unsupported::OpaqueObject, String::new()));
            }
            None => {
                let kind = classify::classify(value)
                    .map_err(|kind| Error::unsupported(kind, String::new()))?;
                node_slot(&object.borrow(), kind)
            }
        };

        let index = self.allocate(slot);
        self.objects.insert(object.id(), index);
        for (position, child) in children.into_iter().rev() {
            self.stack.push((
                child,
                Target::Child {
                    slot: index as usize,
                    position,
                },
            ));
        }
        Ok(index)
    }

    fn primitive(&mut self, value: &Value) -> i64 {
        let (key, slot) = match value {
            Value::Bool(b) => (PrimitiveKey::Bool(*b), Slot::Primitive(Primitive::Bool(*b))),
            Value::Number(n) => (
                PrimitiveKey::Number(n.to_bits()),
                Slot::Primitive(Primitive::Number(*n)),
            ),
            Value::String(s) => (
                PrimitiveKey::String(s.clone()),
                Slot::Primitive(Primitive::String(s.clone())),
            ),
            Value::BigInt(n) => {
                let digits = n.to_string();
                (PrimitiveKey::BigInt(digits.clone()), Slot::BigInt(digits))
            }
            _ => (PrimitiveKey::Null, Slot::Primitive(Primitive::Null)),
        };
        if let Some(&index) = self.primitives.get(&key) {
            return index;
        }
        let index = self.allocate(slot);
        self.primitives.insert(key, index);
        index
    }
}

/// Slot for an object node, with child references zeroed, plus each child
/// with the position of its reference in the slot.
fn node_slot(data: &ObjectData, kind: Kind) -> (Slot, Vec<(usize, Value)>) {
    match data {
        ObjectData::Array(items) => {
            let refs = items
                .iter()
                .map(|item| if item.is_some() { 0 } else { sentinel::HOLE })
                .collect();
            let children = items
                .iter()
                .enumerate()
                .filter_map(|(position, item)| Some((position, item.clone()?)))
                .collect();
            (Slot::List(refs), children)
        }
        ObjectData::Record(record) => {
            let (entries, values): (Vec<(JsString, i64)>, Vec<Value>) = record
                .properties
                .iter()
                .filter_map(|(key, value)| match key {
                    PropertyKey::String(key) => Some(((key.clone(), 0), value.clone())),
                    PropertyKey::Symbol(_) => None,
                })
                .unzip();
            let bare = matches!(kind, Kind::Record { bare: true });
            let children = values.into_iter().enumerate().collect();
            (Slot::Record { bare, entries }, children)
        }
        ObjectData::Set(set) => (
            Slot::Set(vec![0; set.len()]),
            set.iter().cloned().enumerate().collect(),
        ),
        ObjectData::Map(map) => (
            Slot::Map(vec![(0, 0); map.len()]),
            map.iter()
                .flat_map(|(key, value)| [key.clone(), value.clone()])
                .enumerate()
                .collect(),
        ),
        ObjectData::Boxed(inner) => (Slot::Boxed(0), vec![(0, inner.clone())]),
        ObjectData::Date(ms) => (
            Slot::Date(value::to_iso_string(*ms).unwrap_or_default()),
            Vec::new(),
        ),
        ObjectData::RegExp { source, flags } => (
            Slot::RegExp {
                source: source.clone(),
                flags: flags.clone(),
            },
            Vec::new(),
        ),
        // Rejected by classification before a slot is built.
        ObjectData::Function { .. } => (Slot::Primitive(Primitive::Null), Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walk::walk;

    fn flat(value: &Value) -> Flattened {
        flatten(value, &walk(value).unwrap()).unwrap()
    }

    fn string(s: &str) -> Slot {
        Slot::Primitive(Primitive::String(s.into()))
    }

    #[test]
    fn test_sentinel_root() {
        for (value, expected) in [
            (Value::Undefined, sentinel::UNDEFINED),
            (Value::Number(f64::NAN), sentinel::NAN),
            (Value::Number(f64::INFINITY), sentinel::POSITIVE_INFINITY),
            (Value::Number(f64::NEG_INFINITY), sentinel::NEGATIVE_INFINITY),
            (Value::Number(-0.0), sentinel::NEGATIVE_ZERO),
        ] {
            let flattened = flat(&value);
            assert_eq!(flattened.root, expected);
            assert!(flattened.slots.is_empty());
        }
    }

    #[test]
    fn test_null_is_a_slot() {
        let flattened = flat(&Value::Null);
        assert_eq!(flattened.root, 0);
        assert_eq!(flattened.slots, vec![Slot::Primitive(Primitive::Null)]);
    }

    #[test]
    fn test_pre_order_indices() {
        let value = Value::record([
            ("a", Value::array(["x".into()])),
            ("b", "y".into()),
        ]);
        let flattened = flat(&value);
        assert_eq!(
            flattened.slots,
            vec![
                Slot::Record {
                    bare: false,
                    entries: vec![("a".into(), 1), ("b".into(), 3)],
                },
                Slot::List(vec![2]),
                string("x"),
                string("y"),
            ]
        );
    }

    #[test]
    fn test_repeated_primitives_share_a_slot() {
        let flattened = flat(&Value::array(["a string".into(), "a string".into()]));
        assert_eq!(flattened.slots, vec![Slot::List(vec![1, 1]), string("a string")]);
    }

    #[test]
    fn test_holes() {
        let flattened = flat(&Value::sparse_array([None, Some("b".into()), None]));
        assert_eq!(
            flattened.slots,
            vec![Slot::List(vec![sentinel::HOLE, 1, sentinel::HOLE]), string("b")]
        );

        let flattened = flat(&Value::sparse_array([None, None, Some(1.into()), Some(2.into())]));
        assert_eq!(
            flattened.slots[0],
            Slot::List(vec![sentinel::HOLE, sentinel::HOLE, 1, 2])
        );
    }

    #[test]
    fn test_cycles_point_back() {
        let map = Value::map([]);
        map.as_object().unwrap().map_set("self".into(), map.clone());
        assert_eq!(
            flat(&map).slots,
            vec![Slot::Map(vec![(1, 0)]), string("self")]
        );
    }

    #[test]
    fn test_boxed_and_dates() {
        let flattened = flat(&Value::array([
            Value::boxed(42.into()),
            Value::date(1e12),
            Value::invalid_date(),
            Value::boxed(Value::Number(f64::NAN)),
        ]));
        assert_eq!(
            flattened.slots,
            vec![
                Slot::List(vec![1, 3, 4, 5]),
                Slot::Boxed(2),
                Slot::Primitive(Primitive::Number(42.0)),
                Slot::Date("2001-09-09T01:46:40.000Z".into()),
                Slot::Date(String::new()),
                Slot::Boxed(sentinel::NAN),
            ]
        );
    }

    #[test]
    fn test_reduced_nodes() {
        let point = Value::instance("Point", [("x", Value::from(1))]);
        let root = Value::array([point.clone(), point.clone()]);
        let occurrences = crate::walk::walk_with(&root, |value| {
            value.ptr_eq(&point).then(|| Custom::Reduced {
                tag: "Point".into(),
                fields: vec![1.into(), 2.into()],
            })
        })
        .unwrap();
        let flattened = flatten(&root, &occurrences).unwrap();
        assert_eq!(
            flattened.slots,
            vec![
                Slot::List(vec![1, 1]),
                Slot::Custom {
                    tag: "Point".into(),
                    fields: vec![2, 3],
                },
                Slot::Primitive(Primitive::Number(1.0)),
                Slot::Primitive(Primitive::Number(2.0)),
            ]
        );
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let value = crate::value::testing::nested(100_000);
        assert_eq!(flat(&value).slots.len(), 100_001);
    }
}
