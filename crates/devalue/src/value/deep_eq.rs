//! Structural equality for value graphs.
//!
//! `deep_eq` compares two graphs by shape rather than identity, but it is
//! identity-aware: sharing and cycles must line up. If `a.x` and `a.y` are the
//! same object, `b.x` and `b.y` must be the same object too.
//!
//! # Compared exactly
//!
//! - Numbers by SameValue (`NaN` equals `NaN`, `-0` differs from `0`)
//! - Record prototypes and key order
//! - List length and hole positions
//! - Set and map iteration order

use super::{Object, ObjectData, Value};
use std::collections::HashMap;

/// Trait for identity-aware structural equality.
///
/// Unlike `PartialEq`, this follows object references and terminates on
/// cyclic graphs.
pub trait DeepEq {
    fn deep_eq(&self, other: &Self) -> bool;
}

impl DeepEq for Value {
    fn deep_eq(&self, other: &Self) -> bool {
        let mut matcher = Matcher::default();
        matcher.stack.push((self.clone(), other.clone()));
        matcher.run()
    }
}

#[derive(Default)]
struct Matcher {
    stack: Vec<(Value, Value)>,
    left_to_right: HashMap<usize, usize>,
    right_to_left: HashMap<usize, usize>,
}

impl Matcher {
    fn run(&mut self) -> bool {
        while let Some((a, b)) = self.stack.pop() {
            let same = match (&a, &b) {
                (Value::Object(x), Value::Object(y)) => self.objects(x, y),
                _ => primitive_eq(&a, &b),
            };
            if !same {
                return false;
            }
        }
        true
    }

    fn objects(&mut self, x: &Object, y: &Object) -> bool {
        match (
            self.left_to_right.get(&x.id()),
            self.right_to_left.get(&y.id()),
        ) {
            (Some(&right), Some(&left)) => return right == y.id() && left == x.id(),
            (None, None) => {}
            _ => return false,
        }
        self.left_to_right.insert(x.id(), y.id());
        self.right_to_left.insert(y.id(), x.id());

        let (left, right) = (x.borrow(), y.borrow());
        match (&*left, &*right) {
            (ObjectData::Array(a), ObjectData::Array(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                for (a, b) in a.iter().zip(b) {
                    match (a, b) {
                        (None, None) => {}
                        (Some(a), Some(b)) => self.stack.push((a.clone(), b.clone())),
                        _ => return false,
                    }
                }
                true
            }

            (ObjectData::Record(a), ObjectData::Record(b)) => {
                if a.proto != b.proto || a.properties.len() != b.properties.len() {
                    return false;
                }
                for ((ka, va), (kb, vb)) in a.properties.iter().zip(&b.properties) {
                    if ka != kb {
                        return false;
                    }
                    self.stack.push((va.clone(), vb.clone()));
                }
                true
            }

            (ObjectData::Set(a), ObjectData::Set(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                self.stack
                    .extend(a.iter().cloned().zip(b.iter().cloned()));
                true
            }

            (ObjectData::Map(a), ObjectData::Map(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    self.stack.push((ka.clone(), kb.clone()));
                    self.stack.push((va.clone(), vb.clone()));
                }
                true
            }

            (ObjectData::Boxed(a), ObjectData::Boxed(b)) => primitive_eq(a, b),

            (ObjectData::Date(a), ObjectData::Date(b)) => same_value(*a, *b),

            (
                ObjectData::RegExp {
                    source: s1,
                    flags: f1,
                },
                ObjectData::RegExp {
                    source: s2,
                    flags: f2,
                },
            ) => s1 == s2 && f1 == f2,

            // Functions have no comparable structure
            (ObjectData::Function { .. }, ObjectData::Function { .. }) => x.ptr_eq(y),

            _ => false,
        }
    }
}

fn primitive_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => same_value(*a, *b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::BigInt(a), Value::BigInt(b)) => a == b,
        _ => false,
    }
}

fn same_value(a: f64, b: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cyclic_record() -> Value {
        let node = Value::record([("name", Value::from("n"))]);
        node.as_object().unwrap().set_property("self", node.clone());
        node
    }

    #[test]
    fn test_primitives() {
        assert!(Value::Number(f64::NAN).deep_eq(&Value::Number(f64::NAN)));
        assert!(!Value::Number(0.0).deep_eq(&Value::Number(-0.0)));
        assert!(!Value::Undefined.deep_eq(&Value::Null));
        assert!(Value::from("a").deep_eq(&Value::from("a")));
    }

    #[test]
    fn test_distinct_but_equal_graphs() {
        let a = Value::record([("a", Value::array([1.into(), 2.into()]))]);
        let b = Value::record([("a", Value::array([1.into(), 2.into()]))]);
        assert!(a.deep_eq(&b));
    }

    #[test]
    fn test_key_order_matters() {
        let a = Value::record([("a", Value::from(1)), ("b", Value::from(2))]);
        let b = Value::record([("b", Value::from(2)), ("a", Value::from(1))]);
        assert!(!a.deep_eq(&b));
    }

    #[test]
    fn test_holes_are_not_undefined() {
        let a = Value::sparse_array([None, Some(Value::Undefined)]);
        let b = Value::sparse_array([Some(Value::Undefined), None]);
        assert!(!a.deep_eq(&b));
    }

    #[test]
    fn test_cycles_terminate() {
        assert!(cyclic_record().deep_eq(&cyclic_record()));
    }

    #[test]
    fn test_sharing_must_line_up() {
        let x = Value::array([]);
        let shared = Value::array([x.clone(), x]);
        let copied = Value::array([Value::array([]), Value::array([])]);
        assert!(!shared.deep_eq(&copied));
        assert!(!copied.deep_eq(&shared));
    }
}
