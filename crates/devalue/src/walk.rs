//! Occurrence counting over a value graph.
//!
//! The walker visits every object node reachable from the root once, counting
//! how many times each is referenced. Nodes referenced more than once (or
//! reachable from themselves) are *shared*: the expression renderer binds them
//! to names, and both encoders emit them once.

use crate::classify::{Kind, classify};
use crate::escape;
use crate::traits::Error;
use crate::value::{Object, ObjectData, PropertyKey, Value};
use std::collections::HashMap;

/// How a hook replaced a node.
#[derive(Debug, Clone)]
pub enum Custom {
    /// A reducer matched: the node is written as `tag` plus its fields, which
    /// are themselves part of the graph.
    Reduced { tag: String, fields: Vec<Value> },
    /// An expression replacer matched: the node is written as this source
    /// text, verbatim.
    Source(String),
}

/// Result of a walk: reference counts and first-encounter order.
#[derive(Debug, Default)]
pub struct Occurrences {
    counts: HashMap<usize, usize>,
    order: Vec<Object>,
    custom: HashMap<usize, Custom>,
}

impl Occurrences {
    /// Times `object` was referenced. Zero if it was never reached.
    pub fn count(&self, object: &Object) -> usize {
        self.counts.get(&object.id()).copied().unwrap_or(0)
    }

    pub fn is_shared(&self, object: &Object) -> bool {
        self.count(object) > 1
    }

    /// Every object node in pre-order first-encounter order.
    pub fn first_seen(&self) -> &[Object] {
        &self.order
    }

    /// Shared nodes by descending count; ties keep first-encounter order.
    pub fn shared(&self) -> Vec<Object> {
        let mut shared: Vec<Object> = self
            .order
            .iter()
            .filter(|object| self.is_shared(object))
            .cloned()
            .collect();
        shared.sort_by_key(|object| std::cmp::Reverse(self.count(object)));
        shared
    }

    /// Replacement recorded for `object` by the hook.
    pub fn custom(&self, object: &Object) -> Option<&Custom> {
        self.custom.get(&object.id())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

enum Step {
    Visit(Value),
    Enter(String),
    Leave,
}

/// Walk without custom handling.
pub fn walk(root: &Value) -> Result<Occurrences, Error> {
    walk_with(root, |_| None)
}

/// Walk, asking `hook` about every object node before classifying it.
pub fn walk_with(
    root: &Value,
    hook: impl Fn(&Value) -> Option<Custom>,
) -> Result<Occurrences, Error> {
    let mut occurrences = Occurrences::default();
    let mut path: Vec<String> = Vec::new();
    let mut stack = vec![Step::Visit(root.clone())];

    while let Some(step) = stack.pop() {
        let value = match step {
            Step::Enter(segment) => {
                path.push(segment);
                continue;
            }
            Step::Leave => {
                path.pop();
                continue;
            }
            Step::Visit(value) => value,
        };

        let Value::Object(object) = &value else {
            continue;
        };
        if let Some(count) = occurrences.counts.get_mut(&object.id()) {
            *count += 1;
            continue;
        }
        occurrences.counts.insert(object.id(), 1);
        occurrences.order.push(object.clone());

        let children = match hook(&value) {
            Some(Custom::Reduced { tag, fields }) => {
                let children = fields.iter().map(|field| (None, field.clone())).collect();
                occurrences
                    .custom
                    .insert(object.id(), Custom::Reduced { tag, fields });
                children
            }
            Some(source @ Custom::Source(_)) => {
                occurrences.custom.insert(object.id(), source);
                continue;
            }
            None => {
                let kind =
                    classify(&value).map_err(|kind| Error::unsupported(kind, path.concat()))?;
                edges(object, kind)
            }
        };

        for (segment, child) in children.into_iter().rev() {
            match segment {
                Some(segment) => {
                    stack.push(Step::Leave);
                    stack.push(Step::Visit(child));
                    stack.push(Step::Enter(segment));
                }
                None => stack.push(Step::Visit(child)),
            }
        }
    }

    tracing::debug!(
        nodes = occurrences.len(),
        shared = occurrences.counts.values().filter(|&&count| count > 1).count(),
        "walked value graph"
    );
    Ok(occurrences)
}

/// Children of a node in natural order, with the path segment leading to
/// each one where it has a name.
fn edges(object: &Object, kind: Kind) -> Vec<(Option<String>, Value)> {
    if !matches!(kind, Kind::List | Kind::Set | Kind::Map | Kind::Record { .. }) {
        return Vec::new();
    }
    match &*object.borrow() {
        ObjectData::Array(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| Some((Some(format!("[{i}]")), item.clone()?)))
            .collect(),
        ObjectData::Set(set) => set.iter().map(|item| (None, item.clone())).collect(),
        ObjectData::Map(map) => map
            .iter()
            .flat_map(|(key, value)| {
                let literal = escape::primitive(key).unwrap_or_else(|| "...".to_string());
                [
                    (None, key.clone()),
                    (Some(format!(".get({literal})")), value.clone()),
                ]
            })
            .collect(),
        ObjectData::Record(record) => record
            .properties
            .iter()
            .filter_map(|(key, value)| match key {
                PropertyKey::String(key) => Some((Some(escape::safe_prop(key)), value.clone())),
                PropertyKey::Symbol(_) => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_shared_references() {
        let shared = Value::array([]);
        let root = Value::record([("a", shared.clone()), ("b", shared.clone())]);
        let occurrences = walk(&root).unwrap();
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences.count(shared.as_object().unwrap()), 2);
        assert_eq!(occurrences.count(root.as_object().unwrap()), 1);
    }

    #[test]
    fn test_self_reference_is_shared() {
        let root = Value::array([]);
        root.as_object().unwrap().push(root.clone());
        let occurrences = walk(&root).unwrap();
        assert!(occurrences.is_shared(root.as_object().unwrap()));
    }

    #[test]
    fn test_primitives_are_not_counted() {
        let occurrences = walk(&Value::array(["x".into(), "x".into()])).unwrap();
        assert_eq!(occurrences.len(), 1);
    }

    #[test]
    fn test_first_encounter_is_pre_order() {
        let c = Value::array([]);
        let b = Value::array([c.clone()]);
        let d = Value::array([]);
        let root = Value::array([b.clone(), d.clone()]);
        let order: Vec<usize> = walk(&root)
            .unwrap()
            .first_seen()
            .iter()
            .map(Object::id)
            .collect();
        let expected: Vec<usize> = [&root, &b, &c, &d]
            .iter()
            .map(|v| v.as_object().unwrap().id())
            .collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_shared_sorted_by_count_then_first_seen() {
        let once_more = Value::array([]);
        let most = Value::array([]);
        let root = Value::array([
            once_more.clone(),
            once_more.clone(),
            most.clone(),
            most.clone(),
            most.clone(),
        ]);
        let shared = walk(&root).unwrap().shared();
        assert_eq!(shared.len(), 2);
        assert!(shared[0].ptr_eq(most.as_object().unwrap()));
        assert!(shared[1].ptr_eq(once_more.as_object().unwrap()));
    }

    #[test]
    fn test_error_paths() {
        let root = Value::record([(
            "foo",
            Value::record([("array", Value::array([Value::function("f")]))]),
        )]);
        let err = walk(&root).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCallable { .. }));
        assert_eq!(err.path(), ".foo.array[0]");

        let root = Value::record([(
            "foo",
            Value::record([(
                "map",
                Value::map([("key".into(), Value::instance("Foo", Vec::<(&str, Value)>::new()))]),
            )]),
        )]);
        let err = walk(&root).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOpaqueObject { .. }));
        assert_eq!(err.path(), ".foo.map.get(\"key\")");
    }

    #[test]
    fn test_quoted_path_segments() {
        let root = Value::record([("x-y", Value::function("f"))]);
        assert_eq!(walk(&root).unwrap_err().path(), "[\"x-y\"]");
    }

    #[test]
    fn test_hook_runs_before_classification() {
        let point = Value::instance("Point", [("x", Value::from(1))]);
        let root = Value::array([point.clone()]);
        let occurrences = walk_with(&root, |value| {
            value
                .ptr_eq(&point)
                .then(|| Custom::Reduced {
                    tag: "Point".into(),
                    fields: vec![1.into()],
                })
        })
        .unwrap();
        assert!(matches!(
            occurrences.custom(point.as_object().unwrap()),
            Some(Custom::Reduced { .. })
        ));
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let value = crate::value::testing::nested(100_000);
        assert_eq!(walk(&value).unwrap().len(), 100_001);
    }
}
