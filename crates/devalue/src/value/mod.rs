//! Host value model.
//!
//! A dynamically typed value graph. Primitives are plain data and compare by
//! value; everything else is an [`Object`], which has reference identity and
//! interior mutability. Cyclic graphs are built the same way the decoder
//! builds them: create an empty shell, then fill it.
//!
//! ```
//! use devalue::Value;
//!
//! let node = Value::record(Vec::<(&str, Value)>::new());
//! node.as_object().unwrap().set_property("self", node.clone());
//! assert!(node.get("self").unwrap().ptr_eq(&node));
//! ```

mod deep_eq;

pub use deep_eq::DeepEq;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::mem;
use std::rc::Rc;

// ============================================================================
// Strings
// ============================================================================

/// A string of UTF-16 code units.
///
/// Unlike `String`, this can hold unpaired surrogates, which the host model
/// allows and the encoders must preserve.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsString(Vec<u16>);

impl JsString {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a string from raw code units, surrogates included.
    pub fn from_units(units: impl Into<Vec<u16>>) -> Self {
        Self(units.into())
    }

    pub fn units(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode to UTF-8, replacing unpaired surrogates with U+FFFD.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }

    /// Decode to UTF-8, failing on unpaired surrogates.
    pub fn to_utf8(&self) -> Option<String> {
        String::from_utf16(&self.0).ok()
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        Self(s.encode_utf16().collect())
    }
}

impl From<String> for JsString {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&String> for JsString {
    fn from(s: &String) -> Self {
        Self::from(s.as_str())
    }
}

impl PartialEq<str> for JsString {
    fn eq(&self, other: &str) -> bool {
        self.0.iter().copied().eq(other.encode_utf16())
    }
}

impl PartialEq<&str> for JsString {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string_lossy(), f)
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

// ============================================================================
// Values
// ============================================================================

/// Any value reachable in a graph.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(JsString),
    BigInt(BigInt),
    Object(Object),
}

impl Value {
    pub fn string(s: impl Into<JsString>) -> Self {
        Value::String(s.into())
    }

    pub fn bigint(n: impl Into<BigInt>) -> Self {
        Value::BigInt(n.into())
    }

    /// A dense list.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Self::sparse_array(items.into_iter().map(Some))
    }

    /// A list where `None` marks a hole.
    pub fn sparse_array(items: impl IntoIterator<Item = Option<Value>>) -> Self {
        Object::new(ObjectData::Array(items.into_iter().collect())).into()
    }

    /// A plain record with string keys in the given order.
    pub fn record<K: Into<JsString>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::with_proto(Proto::Object, entries)
    }

    /// A record with no prototype.
    pub fn bare_record<K: Into<JsString>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::with_proto(Proto::Null, entries)
    }

    /// An instance of a host class. Not serializable without a reducer.
    pub fn instance<K: Into<JsString>>(
        class: impl Into<String>,
        entries: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        Self::with_proto(Proto::Class(class.into()), entries)
    }

    fn with_proto<K: Into<JsString>>(
        proto: Proto,
        entries: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        let properties = entries
            .into_iter()
            .map(|(k, v)| (PropertyKey::String(k.into()), v))
            .collect();
        Object::new(ObjectData::Record(Record { proto, properties })).into()
    }

    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut set = SetData::default();
        for item in items {
            set.add(item);
        }
        Object::new(ObjectData::Set(set)).into()
    }

    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut map = MapData::default();
        for (key, value) in entries {
            map.set(key, value);
        }
        Object::new(ObjectData::Map(map)).into()
    }

    /// Wrap a primitive in an object, giving it identity.
    pub fn boxed(inner: Value) -> Self {
        Object::new(ObjectData::Boxed(inner)).into()
    }

    /// A timestamp in milliseconds since the epoch. Out-of-range and
    /// non-finite inputs produce an invalid timestamp.
    pub fn date(ms: f64) -> Self {
        Object::new(ObjectData::Date(time_clip(ms))).into()
    }

    pub fn invalid_date() -> Self {
        Self::date(f64::NAN)
    }

    pub fn regexp(source: impl Into<JsString>, flags: impl Into<JsString>) -> Self {
        Object::new(ObjectData::RegExp {
            source: source.into(),
            flags: flags.into(),
        })
        .into()
    }

    pub fn function(name: impl Into<String>) -> Self {
        Object::new(ObjectData::Function { name: name.into() }).into()
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&JsString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Own string-keyed property of a record.
    pub fn get(&self, key: &str) -> Option<Value> {
        let object = self.as_object()?;
        match &*object.borrow() {
            ObjectData::Record(record) => record.get(key).cloned(),
            _ => None,
        }
    }

    /// Element of a list. Holes and out-of-range indices are `None`.
    pub fn at(&self, index: usize) -> Option<Value> {
        let object = self.as_object()?;
        match &*object.borrow() {
            ObjectData::Array(items) => items.get(index).cloned().flatten(),
            _ => None,
        }
    }

    /// Reference identity. Always false for primitives.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::BigInt(n) => write!(f, "{n}n"),
            Value::Object(object) => fmt::Debug::fmt(object, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<JsString> for Value {
    fn from(s: JsString) -> Self {
        Value::String(s)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::BigInt(n)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

// ============================================================================
// Objects
// ============================================================================

/// A heap node with reference identity.
#[derive(Clone)]
pub struct Object(Rc<RefCell<ObjectData>>);

impl Object {
    pub fn new(data: ObjectData) -> Self {
        Self(Rc::new(RefCell::new(data)))
    }

    /// Identity key, stable while the object is alive.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn borrow(&self) -> Ref<'_, ObjectData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ObjectData> {
        self.0.borrow_mut()
    }

    /// Assign a list element, growing the list with holes as needed.
    /// Returns false if this is not a list.
    pub fn set_index(&self, index: usize, value: Value) -> bool {
        match &mut *self.borrow_mut() {
            ObjectData::Array(items) => {
                if items.len() <= index {
                    items.resize(index + 1, None);
                }
                items[index] = Some(value);
                true
            }
            _ => false,
        }
    }

    pub fn push(&self, value: Value) -> bool {
        match &mut *self.borrow_mut() {
            ObjectData::Array(items) => {
                items.push(Some(value));
                true
            }
            _ => false,
        }
    }

    /// Assign a record property, keeping the original position of an
    /// existing key.
    pub fn set_property(&self, key: impl Into<PropertyKey>, value: Value) -> bool {
        match &mut *self.borrow_mut() {
            ObjectData::Record(record) => {
                record.properties.insert(key.into(), value);
                true
            }
            _ => false,
        }
    }

    /// Add a set element.
    pub fn add(&self, value: Value) -> bool {
        match &mut *self.borrow_mut() {
            ObjectData::Set(set) => {
                set.add(value);
                true
            }
            _ => false,
        }
    }

    /// Insert or replace a map entry.
    pub fn map_set(&self, key: Value, value: Value) -> bool {
        match &mut *self.borrow_mut() {
            ObjectData::Map(map) => {
                map.set(key, value);
                true
            }
            _ => false,
        }
    }
}

impl Drop for Object {
    // Drop glue would recurse once per level. The last owner detaches the
    // children instead, emptying each child it alone owns before that child
    // drops.
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) != 1 {
            return;
        }
        let mut pending = detach_children(&self.0);
        while let Some(object) = pending.pop() {
            if Rc::strong_count(&object.0) == 1 {
                pending.extend(detach_children(&object.0));
            }
        }
    }
}

/// Move the object-valued children out of a node, leaving it empty.
fn detach_children(cell: &RefCell<ObjectData>) -> Vec<Object> {
    let Ok(mut data) = cell.try_borrow_mut() else {
        return Vec::new();
    };
    let children: Vec<Value> = match &mut *data {
        ObjectData::Array(items) => mem::take(items).into_iter().flatten().collect(),
        ObjectData::Record(record) => mem::take(&mut record.properties).into_values().collect(),
        ObjectData::Set(set) => mem::take(&mut set.entries).into_values().collect(),
        ObjectData::Map(map) => mem::take(&mut map.entries)
            .into_values()
            .flat_map(|(key, value)| [key, value])
            .collect(),
        ObjectData::Boxed(_)
        | ObjectData::Date(_)
        | ObjectData::RegExp { .. }
        | ObjectData::Function { .. } => return Vec::new(),
    };
    children
        .into_iter()
        .filter_map(|child| match child {
            Value::Object(object) => Some(object),
            _ => None,
        })
        .collect()
}

impl fmt::Debug for Object {
    // Never recurses: graphs may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0.try_borrow() {
            Ok(data) => data.kind_name(),
            Err(_) => "<borrowed>",
        };
        write!(f, "{kind}@{:x}", self.id())
    }
}

/// The contents of an [`Object`].
#[derive(Debug, Clone)]
pub enum ObjectData {
    /// `None` is a hole.
    Array(Vec<Option<Value>>),
    Record(Record),
    Set(SetData),
    Map(MapData),
    /// A primitive wrapped in an object.
    Boxed(Value),
    /// Milliseconds since the epoch; NaN is an invalid timestamp.
    Date(f64),
    RegExp {
        source: JsString,
        flags: JsString,
    },
    Function {
        name: String,
    },
}

impl ObjectData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjectData::Array(_) => "Array",
            ObjectData::Record(record) => match record.proto {
                Proto::Object => "Object",
                Proto::Null => "NullObject",
                Proto::Class(_) => "Instance",
            },
            ObjectData::Set(_) => "Set",
            ObjectData::Map(_) => "Map",
            ObjectData::Boxed(_) => "Boxed",
            ObjectData::Date(_) => "Date",
            ObjectData::RegExp { .. } => "RegExp",
            ObjectData::Function { .. } => "Function",
        }
    }
}

/// Prototype of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proto {
    /// The ordinary object prototype.
    Object,
    /// No prototype at all.
    Null,
    /// A host class the serializer does not know.
    Class(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(JsString),
    /// A symbol, identified by its description.
    Symbol(String),
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.into())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::String(s.into())
    }
}

impl From<JsString> for PropertyKey {
    fn from(s: JsString) -> Self {
        PropertyKey::String(s)
    }
}

/// An insertion-ordered property bag.
#[derive(Debug, Clone)]
pub struct Record {
    pub proto: Proto,
    pub properties: IndexMap<PropertyKey, Value>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(&PropertyKey::from(key))
    }
}

/// Set membership key: SameValueZero for primitives, identity for objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    String(JsString),
    BigInt(BigInt),
    Object(usize),
}

impl ValueKey {
    fn of(value: &Value) -> Self {
        match value {
            Value::Undefined => ValueKey::Undefined,
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Number(n) if n.is_nan() => ValueKey::Number(f64::NAN.to_bits()),
            Value::Number(n) if *n == 0.0 => ValueKey::Number(0.0f64.to_bits()),
            Value::Number(n) => ValueKey::Number(n.to_bits()),
            Value::String(s) => ValueKey::String(s.clone()),
            Value::BigInt(n) => ValueKey::BigInt(n.clone()),
            Value::Object(object) => ValueKey::Object(object.id()),
        }
    }
}

/// Unique elements in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SetData {
    entries: IndexMap<ValueKey, Value>,
}

impl SetData {
    pub fn add(&mut self, value: Value) {
        self.entries.entry(ValueKey::of(&value)).or_insert(value);
    }

    pub fn has(&self, value: &Value) -> bool {
        self.entries.contains_key(&ValueKey::of(value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }
}

/// Key/value pairs in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MapData {
    entries: IndexMap<ValueKey, (Value, Value)>,
}

impl MapData {
    pub fn set(&mut self, key: Value, value: Value) {
        match self.entries.get_mut(&ValueKey::of(&key)) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(ValueKey::of(&key), (key, value));
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(&ValueKey::of(key)).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(k, v)| (k, v))
    }
}

// ============================================================================
// Timestamps
// ============================================================================

const MAX_TIME_MS: f64 = 8.64e15;

fn time_clip(ms: f64) -> f64 {
    if !ms.is_finite() || ms.abs() > MAX_TIME_MS {
        return f64::NAN;
    }
    // `+ 0.0` turns -0 into +0
    ms.trunc() + 0.0
}

/// Milliseconds in 400 Gregorian years. The calendar repeats with this
/// period, so years outside chrono's range are handled by shifting whole
/// cycles.
const CYCLE_MS: i64 = 146_097 * 86_400_000;

/// ISO-8601 text for a timestamp, `None` if it is invalid.
///
/// Years outside 0..=9999 use the six-digit signed form.
pub fn to_iso_string(ms: f64) -> Option<String> {
    if ms.is_nan() {
        return None;
    }
    let ms = ms as i64;
    let cycles = ms.div_euclid(CYCLE_MS);
    let date = DateTime::<Utc>::from_timestamp_millis(ms.rem_euclid(CYCLE_MS))?;
    let rest = date.format("-%m-%dT%H:%M:%S%.3fZ");
    let year = i64::from(date.year()) + cycles * 400;
    Some(if (0..=9999).contains(&year) {
        format!("{year:04}{rest}")
    } else {
        let sign = if year < 0 { '-' } else { '+' };
        format!("{sign}{:06}{rest}", year.unsigned_abs())
    })
}

/// Parse ISO-8601 text into milliseconds. Unparseable text is an invalid
/// timestamp (NaN), never an error.
pub fn from_iso_string(text: &str) -> f64 {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return time_clip(date.timestamp_millis() as f64);
    }
    parse_extended_year(text).map_or(f64::NAN, |ms| time_clip(ms as f64))
}

/// `YYYY-…Z` or `±YYYYYY-…Z`, in UTC.
fn parse_extended_year(text: &str) -> Option<i64> {
    let (negative, digits) = match text.as_bytes().first()? {
        b'+' => (false, 6),
        b'-' => (true, 6),
        _ => (false, 4),
    };
    let start = usize::from(digits == 6);
    let year_text = text.get(start..start + digits)?;
    if !year_text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i64 = year_text.parse().ok()?;
    let year = if negative { -year } else { year };
    let rest = &text[start + digits..];

    let cycles = year.div_euclid(400);
    let shifted = format!("{:04}{rest}", year.rem_euclid(400));
    let date = NaiveDateTime::parse_from_str(&shifted, "%Y-%m-%dT%H:%M:%S%.fZ").ok()?;
    Some(date.and_utc().timestamp_millis() + cycles * CYCLE_MS)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Value;

    /// `depth` lists, each holding the next.
    pub fn nested(depth: usize) -> Value {
        let mut value = Value::array([]);
        for _ in 0..depth {
            value = Value::array([value]);
        }
        value
    }
}
