//! Ordered tables of reducers and revivers.
//!
//! Tables are plain values owned by the caller and passed into each call;
//! nothing is registered globally. Lookup is first-match in registration
//! order.

use crate::traits::{Error, FnReducer, FnReviver, Reducer, Reviver};
use crate::value::Value;
use crate::walk::Custom;

/// Tags the wire format uses for built-in kinds. They always win over custom
/// tags on decode, so they cannot be registered.
pub const BUILTIN_TAGS: &[&str] = &["Date", "Set", "Map", "RegExp", "Object", "BigInt", "null"];

pub fn is_builtin_tag(tag: &str) -> bool {
    BUILTIN_TAGS.contains(&tag)
}

fn check_tag(tag: &str) -> Result<(), Error> {
    if is_builtin_tag(tag) {
        return Err(Error::ReservedTag(tag.to_string()));
    }
    Ok(())
}

/// Encoding-side table.
#[derive(Default)]
pub struct Reducers {
    entries: Vec<Box<dyn Reducer>>,
}

impl Reducers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reducer. Fails if its tag is a built-in tag.
    pub fn register(&mut self, reducer: impl Reducer + 'static) -> Result<&mut Self, Error> {
        check_tag(reducer.tag())?;
        self.entries.push(Box::new(reducer));
        Ok(self)
    }

    /// Builder form of [`register`](Self::register) for closures.
    pub fn with(
        mut self,
        tag: impl Into<String>,
        reduce: impl Fn(&Value) -> Option<Vec<Value>> + 'static,
    ) -> Result<Self, Error> {
        self.register(FnReducer::new(tag, reduce))?;
        Ok(self)
    }

    /// Run the first reducer that accepts `value`.
    pub fn reduce(&self, value: &Value) -> Option<Custom> {
        self.entries.iter().find_map(|reducer| {
            reducer.reduce(value).map(|fields| Custom::Reduced {
                tag: reducer.tag().to_string(),
                fields,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decoding-side table.
#[derive(Default)]
pub struct Revivers {
    entries: Vec<Box<dyn Reviver>>,
}

impl Revivers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reviver. Fails if its tag is a built-in tag.
    pub fn register(&mut self, reviver: impl Reviver + 'static) -> Result<&mut Self, Error> {
        check_tag(reviver.tag())?;
        self.entries.push(Box::new(reviver));
        Ok(self)
    }

    /// Builder form of [`register`](Self::register) for closures.
    pub fn with(
        mut self,
        tag: impl Into<String>,
        revive: impl Fn(Vec<Value>) -> Result<Value, String> + 'static,
    ) -> Result<Self, Error> {
        self.register(FnReviver::new(tag, revive))?;
        Ok(self)
    }

    /// Get the reviver for a tag.
    pub fn reviver_for(&self, tag: &str) -> Option<&dyn Reviver> {
        self.entries
            .iter()
            .find(|reviver| reviver.tag() == tag)
            .map(|reviver| &**reviver)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tags_are_reserved() {
        for tag in BUILTIN_TAGS {
            let err = Reducers::new().with(*tag, |_| None).err();
            assert_eq!(err, Some(Error::ReservedTag(tag.to_string())));
            let err = Revivers::new().with(*tag, |_| Ok(Value::Null)).err();
            assert_eq!(err, Some(Error::ReservedTag(tag.to_string())));
        }
    }

    #[test]
    fn test_first_matching_reducer_wins() {
        let reducers = Reducers::new()
            .with("Never", |_| None)
            .unwrap()
            .with("First", |v| Some(vec![v.clone()]))
            .unwrap()
            .with("Second", |v| Some(vec![v.clone()]))
            .unwrap();
        assert_eq!(reducers.len(), 3);
        match reducers.reduce(&Value::from(1)) {
            Some(Custom::Reduced { tag, fields }) => {
                assert_eq!(tag, "First");
                assert_eq!(fields.len(), 1);
            }
            other => panic!("expected a reduction, got {other:?}"),
        }
    }

    #[test]
    fn test_reviver_lookup() {
        let revivers = Revivers::new()
            .with("Point", |_| Ok(Value::Null))
            .unwrap();
        assert!(revivers.reviver_for("Point").is_some());
        assert!(revivers.reviver_for("point").is_none());
    }
}
