//! Classification of values into a closed set of kinds.
//!
//! Everything downstream (walker, encoder, renderers) dispatches on [`Kind`]
//! instead of inspecting [`ObjectData`] directly, so the set of supported
//! shapes is decided in one place.

use crate::value::{ObjectData, PropertyKey, Proto, Value};

/// Scalar type of a primitive or a boxed wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Number,
    String,
    Boolean,
}

/// Singleton states that encode without a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    Undefined,
    Null,
    NaN,
    PositiveInfinity,
    NegativeInfinity,
    NegativeZero,
}

impl Special {
    /// Sentinel index in the array format. `null` has none: it is an
    /// ordinary primitive slot.
    pub fn sentinel(self) -> Option<i64> {
        use crate::flatten::sentinel;
        match self {
            Special::Undefined => Some(sentinel::UNDEFINED),
            Special::Null => None,
            Special::NaN => Some(sentinel::NAN),
            Special::PositiveInfinity => Some(sentinel::POSITIVE_INFINITY),
            Special::NegativeInfinity => Some(sentinel::NEGATIVE_INFINITY),
            Special::NegativeZero => Some(sentinel::NEGATIVE_ZERO),
        }
    }
}

/// The kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Scalar(Scalar),
    Special(Special),
    BigInt,
    Boxed(Scalar),
    Timestamp,
    Pattern,
    List,
    Set,
    Map,
    Record { bare: bool },
}

impl Kind {
    /// Whether values of this kind have identity and get an index.
    pub fn is_node(self) -> bool {
        !matches!(self, Kind::Scalar(_) | Kind::Special(_) | Kind::BigInt)
    }
}

/// Why a value cannot be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Unsupported {
    #[error("callable value")]
    Callable,
    #[error("object of an unsupported kind")]
    OpaqueObject,
    #[error("record with a non-string key")]
    NonStringKey,
}

/// Special state of a primitive, if it has one.
pub fn special(value: &Value) -> Option<Special> {
    match value {
        Value::Undefined => Some(Special::Undefined),
        Value::Null => Some(Special::Null),
        Value::Number(n) if n.is_nan() => Some(Special::NaN),
        Value::Number(n) if *n == f64::INFINITY => Some(Special::PositiveInfinity),
        Value::Number(n) if *n == f64::NEG_INFINITY => Some(Special::NegativeInfinity),
        Value::Number(n) if *n == 0.0 && n.is_sign_negative() => Some(Special::NegativeZero),
        _ => None,
    }
}

fn scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::Number(_) => Some(Scalar::Number),
        Value::String(_) => Some(Scalar::String),
        Value::Bool(_) => Some(Scalar::Boolean),
        _ => None,
    }
}

/// Classify a value. Does not look past the value's own shape: children are
/// classified when the walker reaches them.
pub fn classify(value: &Value) -> Result<Kind, Unsupported> {
    if let Some(special) = special(value) {
        return Ok(Kind::Special(special));
    }
    let object = match value {
        Value::BigInt(_) => return Ok(Kind::BigInt),
        Value::Object(object) => object,
        other => return scalar(other).map(Kind::Scalar).ok_or(Unsupported::OpaqueObject),
    };

    match &*object.borrow() {
        ObjectData::Function { .. } => Err(Unsupported::Callable),
        ObjectData::Boxed(inner) => scalar(inner)
            .map(Kind::Boxed)
            .ok_or(Unsupported::OpaqueObject),
        ObjectData::Date(_) => Ok(Kind::Timestamp),
        ObjectData::RegExp { .. } => Ok(Kind::Pattern),
        ObjectData::Array(_) => Ok(Kind::List),
        ObjectData::Set(_) => Ok(Kind::Set),
        ObjectData::Map(_) => Ok(Kind::Map),
        ObjectData::Record(record) => {
            let bare = match record.proto {
                Proto::Object => false,
                Proto::Null => true,
                Proto::Class(_) => return Err(Unsupported::OpaqueObject),
            };
            if record
                .properties
                .keys()
                .any(|key| matches!(key, PropertyKey::Symbol(_)))
            {
                return Err(Unsupported::NonStringKey);
            }
            Ok(Kind::Record { bare })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;

    #[test]
    fn test_specials() {
        assert_eq!(
            classify(&Value::Number(-0.0)),
            Ok(Kind::Special(Special::NegativeZero))
        );
        assert_eq!(classify(&Value::Number(0.0)), Ok(Kind::Scalar(Scalar::Number)));
        assert_eq!(
            classify(&Value::Number(f64::NAN)),
            Ok(Kind::Special(Special::NaN))
        );
        assert_eq!(classify(&Value::Null), Ok(Kind::Special(Special::Null)));
        assert_eq!(Special::Null.sentinel(), None);
        assert_eq!(Special::NegativeZero.sentinel(), Some(-6));
    }

    #[test]
    fn test_containers() {
        assert_eq!(classify(&Value::array([])), Ok(Kind::List));
        assert_eq!(classify(&Value::set([])), Ok(Kind::Set));
        assert_eq!(classify(&Value::map([])), Ok(Kind::Map));
        assert_eq!(
            classify(&Value::bare_record(Vec::<(&str, Value)>::new())),
            Ok(Kind::Record { bare: true })
        );
        assert_eq!(
            classify(&Value::boxed("x".into())),
            Ok(Kind::Boxed(Scalar::String))
        );
    }

    #[test]
    fn test_nodes() {
        assert!(Kind::Timestamp.is_node());
        assert!(Kind::Boxed(Scalar::Number).is_node());
        assert!(!Kind::BigInt.is_node());
        assert!(!Kind::Special(Special::Undefined).is_node());
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(classify(&Value::function("f")), Err(Unsupported::Callable));
        assert_eq!(
            classify(&Value::instance("Foo", Vec::<(&str, Value)>::new())),
            Err(Unsupported::OpaqueObject)
        );
        assert_eq!(
            classify(&Value::boxed(Value::Undefined)),
            Err(Unsupported::OpaqueObject)
        );

        let record = Value::record([("a", Value::from(1))]);
        if let Some(object) = record.as_object() {
            object.set_property(PropertyKey::Symbol("tag".into()), Value::Null);
        }
        assert_eq!(classify(&record), Err(Unsupported::NonStringKey));
    }

    #[test]
    fn test_classify_does_not_mutate() {
        let object = Object::new(ObjectData::Array(vec![None, Some(Value::Null)]));
        let value = Value::Object(object.clone());
        classify(&value).unwrap();
        match &*object.borrow() {
            ObjectData::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }
}
