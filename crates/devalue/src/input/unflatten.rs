//! Rebuilding a value graph from flattened slots.
//!
//! Containers are created as empty shells and memoized before any of their
//! children are resolved, so a child that refers back to an ancestor gets the
//! ancestor's shell. Custom slots are the exception: a reviver needs its
//! fields fully decoded, so a custom slot is only memoized once revived, and
//! reaching it again from its own fields is an error.

use crate::flatten::{Flattened, Primitive, Slot, sentinel};
use crate::registry::Revivers;
use crate::traits::Error;
use crate::value::{self, MapData, Object, ObjectData, Proto, Record, SetData, Value};
use indexmap::IndexMap;
use num_bigint::BigInt;

/// Rebuild the graph `flattened` describes.
pub fn unflatten(flattened: &Flattened, revivers: &Revivers) -> Result<Value, Error> {
    if flattened.root < 0 {
        return sentinel_value(flattened.root)
            .ok_or_else(|| Error::malformed(format!("{} is not a valid root", flattened.root)));
    }
    if flattened.slots.is_empty() {
        return Err(Error::malformed("no slots"));
    }

    let mut resolver = Resolver {
        slots: &flattened.slots,
        revivers,
        memo: vec![None; flattened.slots.len()],
        reviving: vec![false; flattened.slots.len()],
        stack: Vec::new(),
    };
    let value = resolver.run(flattened.root)?;
    tracing::debug!(slots = flattened.slots.len(), "unflattened value graph");
    Ok(value)
}

fn sentinel_value(index: i64) -> Option<Value> {
    Some(match index {
        sentinel::UNDEFINED => Value::Undefined,
        sentinel::NAN => Value::Number(f64::NAN),
        sentinel::POSITIVE_INFINITY => Value::Number(f64::INFINITY),
        sentinel::NEGATIVE_INFINITY => Value::Number(f64::NEG_INFINITY),
        sentinel::NEGATIVE_ZERO => Value::Number(-0.0),
        _ => return None,
    })
}

/// Index of the `position`-th child reference of a slot.
fn child_ref(slot: &Slot, position: usize) -> Option<i64> {
    match slot {
        Slot::List(refs) | Slot::Set(refs) => refs.get(position).copied(),
        Slot::Custom { fields, .. } => fields.get(position).copied(),
        Slot::Record { entries, .. } => entries.get(position).map(|(_, index)| *index),
        Slot::Map(entries) => entries.get(position / 2).map(|&(key, value)| {
            if position % 2 == 0 { key } else { value }
        }),
        _ => None,
    }
}

enum Target {
    /// A container shell receiving its members.
    Fill {
        object: Object,
        pending_key: Option<Value>,
    },
    /// A custom slot collecting fields for its reviver.
    Revive(Vec<Value>),
}

struct Frame {
    index: usize,
    position: usize,
    target: Target,
}

enum Resolved {
    Ready(Value),
    /// A shell to use now and a frame that fills it.
    Open(Value, Frame),
    /// A custom slot; its value arrives when the frame completes.
    Revive(Frame),
}

struct Resolver<'a> {
    slots: &'a [Slot],
    revivers: &'a Revivers,
    memo: Vec<Option<Value>>,
    reviving: Vec<bool>,
    stack: Vec<Frame>,
}

impl Resolver<'_> {
    fn run(&mut self, root_index: i64) -> Result<Value, Error> {
        let mut root = None;
        let resolved = self.resolve(root_index)?;
        self.settle(resolved, &mut root);

        let slots = self.slots;
        while let Some(frame) = self.stack.last_mut() {
            let slot = &slots[frame.index];
            match child_ref(slot, frame.position) {
                Some(sentinel::HOLE) if matches!(slot, Slot::List(_)) => frame.position += 1,
                Some(sentinel::HOLE) => {
                    return Err(Error::malformed("hole outside a list"));
                }
                Some(child) => {
                    let resolved = self.resolve(child)?;
                    self.settle(resolved, &mut root);
                }
                None => {
                    let Some(frame) = self.stack.pop() else {
                        break;
                    };
                    if let Target::Revive(fields) = frame.target {
                        let value = self.revive(frame.index, fields)?;
                        self.deliver(value, &mut root);
                    }
                }
            }
        }

        root.ok_or_else(|| Error::malformed("root did not resolve"))
    }

    fn settle(&mut self, resolved: Resolved, root: &mut Option<Value>) {
        match resolved {
            Resolved::Ready(value) => self.deliver(value, root),
            Resolved::Open(shell, frame) => {
                self.deliver(shell, root);
                self.stack.push(frame);
            }
            Resolved::Revive(frame) => self.stack.push(frame),
        }
    }

    /// Hand a resolved child to the frame waiting for it.
    fn deliver(&mut self, value: Value, root: &mut Option<Value>) {
        let Some(frame) = self.stack.last_mut() else {
            *root = Some(value);
            return;
        };
        let slot = &self.slots[frame.index];
        match &mut frame.target {
            Target::Fill {
                object,
                pending_key,
            } => match slot {
                Slot::List(_) => {
                    object.set_index(frame.position, value);
                }
                Slot::Record { entries, .. } => {
                    object.set_property(entries[frame.position].0.clone(), value);
                }
                Slot::Set(_) => {
                    object.add(value);
                }
                Slot::Map(_) if frame.position % 2 == 0 => *pending_key = Some(value),
                Slot::Map(_) => {
                    object.map_set(pending_key.take().unwrap_or(Value::Undefined), value);
                }
                _ => {}
            },
            Target::Revive(fields) => fields.push(value),
        }
        frame.position += 1;
    }

    fn resolve(&mut self, index: i64) -> Result<Resolved, Error> {
        if index < 0 {
            return sentinel_value(index)
                .map(Resolved::Ready)
                .ok_or_else(|| Error::malformed(format!("{index} is not a valid reference")));
        }
        let i = usize::try_from(index)
            .ok()
            .filter(|&i| i < self.slots.len())
            .ok_or_else(|| Error::malformed(format!("index {index} is out of range")))?;
        if let Some(value) = &self.memo[i] {
            return Ok(Resolved::Ready(value.clone()));
        }
        if self.reviving[i] {
            return Err(Error::malformed(format!(
                "custom value at {i} is reachable from its own fields"
            )));
        }

        let (object, frame) = match &self.slots[i] {
            Slot::Primitive(primitive) => {
                let value = primitive_value(primitive);
                self.memo[i] = Some(value.clone());
                return Ok(Resolved::Ready(value));
            }
            Slot::BigInt(digits) => {
                let value = bigint_value(digits)?;
                self.memo[i] = Some(value.clone());
                return Ok(Resolved::Ready(value));
            }
            Slot::List(refs) => (Object::new(ObjectData::Array(vec![None; refs.len()])), true),
            Slot::Record { bare, .. } => {
                let proto = if *bare { Proto::Null } else { Proto::Object };
                let record = Record {
                    proto,
                    properties: IndexMap::new(),
                };
                (Object::new(ObjectData::Record(record)), true)
            }
            Slot::Set(_) => (Object::new(ObjectData::Set(SetData::default())), true),
            Slot::Map(_) => (Object::new(ObjectData::Map(MapData::default())), true),
            Slot::Custom { tag, .. } => {
                if self.revivers.reviver_for(tag).is_none() {
                    return Err(Error::UnknownTag(tag.clone()));
                }
                self.reviving[i] = true;
                return Ok(Resolved::Revive(Frame {
                    index: i,
                    position: 0,
                    target: Target::Revive(Vec::new()),
                }));
            }
            leaf => (leaf_object(leaf, self.slots)?, false),
        };

        let value = Value::Object(object.clone());
        self.memo[i] = Some(value.clone());
        if !frame {
            return Ok(Resolved::Ready(value));
        }
        Ok(Resolved::Open(
            value,
            Frame {
                index: i,
                position: 0,
                target: Target::Fill {
                    object,
                    pending_key: None,
                },
            },
        ))
    }

    fn revive(&mut self, index: usize, fields: Vec<Value>) -> Result<Value, Error> {
        let Slot::Custom { tag, .. } = &self.slots[index] else {
            return Err(Error::malformed(format!("slot {index} is not a custom value")));
        };
        let reviver = self
            .revivers
            .reviver_for(tag)
            .ok_or_else(|| Error::UnknownTag(tag.clone()))?;
        let value = reviver.revive(fields).map_err(|reason| Error::Revive {
            tag: tag.clone(),
            reason,
        })?;
        self.reviving[index] = false;
        self.memo[index] = Some(value.clone());
        Ok(value)
    }
}

/// Object for a slot without children.
fn leaf_object(slot: &Slot, slots: &[Slot]) -> Result<Object, Error> {
    let data = match slot {
        Slot::Date(iso) => ObjectData::Date(value::from_iso_string(iso)),
        Slot::RegExp { source, flags } => ObjectData::RegExp {
            source: source.clone(),
            flags: flags.clone(),
        },
        Slot::Boxed(inner) => ObjectData::Boxed(boxed_inner(*inner, slots)?),
        _ => return Err(Error::malformed("expected an object slot")),
    };
    Ok(Object::new(data))
}

/// The scalar a boxed slot wraps: a number sentinel, or a bool, number or
/// string slot.
fn boxed_inner(index: i64, slots: &[Slot]) -> Result<Value, Error> {
    let inner = if index < 0 {
        sentinel_value(index).filter(|value| matches!(value, Value::Number(_)))
    } else {
        usize::try_from(index)
            .ok()
            .and_then(|i| slots.get(i))
            .and_then(|slot| match slot {
                Slot::Primitive(Primitive::Null) => None,
                Slot::Primitive(primitive) => Some(primitive_value(primitive)),
                _ => None,
            })
    };
    inner.ok_or_else(|| Error::malformed(format!("boxed value refers to {index}, not a scalar")))
}

fn primitive_value(primitive: &Primitive) -> Value {
    match primitive {
        Primitive::Null => Value::Null,
        Primitive::Bool(b) => Value::Bool(*b),
        Primitive::Number(n) => Value::Number(*n),
        Primitive::String(s) => Value::String(s.clone()),
    }
}

fn bigint_value(digits: &str) -> Result<Value, Error> {
    let unsigned = digits.strip_prefix('-').unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::malformed(format!("invalid BigInt {digits:?}")));
    }
    digits
        .parse::<BigInt>()
        .map(Value::BigInt)
        .map_err(|_| Error::malformed(format!("invalid BigInt {digits:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DeepEq;

    fn decode(slots: Vec<Slot>) -> Result<Value, Error> {
        unflatten(&Flattened { root: 0, slots }, &Revivers::new())
    }

    fn number(n: f64) -> Slot {
        Slot::Primitive(Primitive::Number(n))
    }

    #[test]
    fn test_sentinel_roots() {
        let value = unflatten(
            &Flattened {
                root: sentinel::NEGATIVE_ZERO,
                slots: Vec::new(),
            },
            &Revivers::new(),
        )
        .unwrap();
        assert!(value.deep_eq(&Value::Number(-0.0)));

        let hole = Flattened {
            root: sentinel::HOLE,
            slots: Vec::new(),
        };
        assert!(matches!(
            unflatten(&hole, &Revivers::new()),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_self_reference_resolves_to_shell() {
        let value = decode(vec![Slot::List(vec![0])]).unwrap();
        assert!(value.at(0).unwrap().ptr_eq(&value));
    }

    #[test]
    fn test_holes_and_sentinels() {
        let value = decode(vec![Slot::List(vec![
            sentinel::HOLE,
            sentinel::UNDEFINED,
            sentinel::NAN,
            sentinel::HOLE,
        ])])
        .unwrap();
        let expected = Value::sparse_array([
            None,
            Some(Value::Undefined),
            Some(Value::Number(f64::NAN)),
            None,
        ]);
        assert!(value.deep_eq(&expected));
    }

    #[test]
    fn test_hole_outside_list_is_rejected() {
        let err = decode(vec![Slot::Record {
            bare: false,
            entries: vec![("a".into(), sentinel::HOLE)],
        }])
        .unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_out_of_range_reference() {
        let err = decode(vec![Slot::List(vec![1])]).unwrap_err();
        assert_eq!(err, Error::MalformedInput("index 1 is out of range".into()));
    }

    #[test]
    fn test_boxed_values() {
        let value = decode(vec![
            Slot::List(vec![1, 3]),
            Slot::Boxed(2),
            number(42.0),
            Slot::Boxed(sentinel::NAN),
        ])
        .unwrap();
        let expected = Value::array([
            Value::boxed(42.into()),
            Value::boxed(Value::Number(f64::NAN)),
        ]);
        assert!(value.deep_eq(&expected));

        assert!(decode(vec![Slot::Boxed(0)]).is_err());
        assert!(decode(vec![Slot::Boxed(sentinel::UNDEFINED)]).is_err());
        assert!(decode(vec![Slot::Boxed(1), Slot::Primitive(Primitive::Null)]).is_err());
    }

    #[test]
    fn test_bigints() {
        let value = decode(vec![Slot::BigInt("-123456789012345678901234567890".into())]).unwrap();
        assert_eq!(format!("{value:?}"), "-123456789012345678901234567890n");
        for bad in ["", "-", "1_000", "+1", "0x10", "1.5"] {
            assert!(decode(vec![Slot::BigInt(bad.into())]).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_invalid_date_text() {
        let value = decode(vec![Slot::Date("nope".into())]).unwrap();
        assert!(value.deep_eq(&Value::invalid_date()));
        let value = decode(vec![Slot::Date(String::new())]).unwrap();
        assert!(value.deep_eq(&Value::invalid_date()));
    }

    #[test]
    fn test_custom_values_are_revived() {
        let revivers = Revivers::new()
            .with("Pair", |fields| Ok(Value::array(fields)))
            .unwrap();
        let flattened = Flattened {
            root: 0,
            slots: vec![
                Slot::List(vec![1, 1]),
                Slot::Custom {
                    tag: "Pair".into(),
                    fields: vec![2, sentinel::UNDEFINED],
                },
                number(1.0),
            ],
        };
        let value = unflatten(&flattened, &revivers).unwrap();
        let pair = value.at(0).unwrap();
        assert!(pair.ptr_eq(&value.at(1).unwrap()));
        assert!(pair.deep_eq(&Value::array([1.into(), Value::Undefined])));
    }

    #[test]
    fn test_custom_root() {
        let revivers = Revivers::new()
            .with("Answer", |_| Ok(Value::from(42)))
            .unwrap();
        let flattened = Flattened {
            root: 0,
            slots: vec![Slot::Custom {
                tag: "Answer".into(),
                fields: Vec::new(),
            }],
        };
        let value = unflatten(&flattened, &revivers).unwrap();
        assert_eq!(value.as_number(), Some(42.0));
    }

    #[test]
    fn test_custom_cycle_is_rejected() {
        let revivers = Revivers::new()
            .with("Loop", |fields| Ok(Value::array(fields)))
            .unwrap();
        let flattened = Flattened {
            root: 0,
            slots: vec![
                Slot::Custom {
                    tag: "Loop".into(),
                    fields: vec![1],
                },
                Slot::List(vec![0]),
            ],
        };
        assert!(matches!(
            unflatten(&flattened, &revivers),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_unknown_and_failing_revivers() {
        let custom = Slot::Custom {
            tag: "Point".into(),
            fields: Vec::new(),
        };
        assert_eq!(
            decode(vec![custom.clone()]).unwrap_err(),
            Error::UnknownTag("Point".into())
        );

        let revivers = Revivers::new()
            .with("Point", |_| Err("missing x".into()))
            .unwrap();
        let flattened = Flattened {
            root: 0,
            slots: vec![custom],
        };
        assert_eq!(
            unflatten(&flattened, &revivers).unwrap_err(),
            Error::Revive {
                tag: "Point".into(),
                reason: "missing x".into(),
            }
        );
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let depth = 100_000;
        let mut slots: Vec<Slot> = (1..=depth).map(|next| Slot::List(vec![next])).collect();
        slots.push(Slot::List(Vec::new()));
        let value = decode(slots).unwrap();
        assert!(value.at(0).is_some());
    }
}
