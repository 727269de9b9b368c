//! Array-format text reader.
//!
//! Reads the text `stringify` produces into [`Flattened`] slots. Tokenizing is
//! left to `serde_json`; this module only knows the fixed two-level shape:
//!
//! ```text
//! text   = sentinel | "[" slot ("," slot)* "]"
//! slot   = scalar | "[" (scalar ("," scalar)*)? "]" | "{" (string ":" int)* "}"
//! scalar = null | true | false | number | string
//! ```
//!
//! Every string is read with `deserialize_bytes`, which yields WTF-8 rather
//! than rejecting escaped unpaired surrogates, and is then re-encoded as
//! UTF-16 code units.

use crate::config::DecodeConfig;
use crate::flatten::{Flattened, Primitive, Slot, sentinel};
use crate::traits::Error;
use crate::value::JsString;
use serde::Deserialize;
use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::value::RawValue;
use std::fmt;

type JsonResult<T> = Result<T, serde_json::Error>;

/// Read array-format text.
pub fn read(text: &str, config: &DecodeConfig) -> Result<Flattened, Error> {
    if !config.accepts_len(text.len()) {
        return Err(Error::malformed(format!(
            "input is {} bytes, limit is {}",
            text.len(),
            config.max_input_len.unwrap_or_default()
        )));
    }

    let mut deserializer = serde_json::Deserializer::from_str(text);
    let flattened = Document { config }
        .deserialize(&mut deserializer)
        .map_err(malformed)?;
    deserializer.end().map_err(malformed)?;
    Ok(flattened)
}

fn malformed(err: serde_json::Error) -> Error {
    Error::malformed(err.to_string())
}

fn invalid(reason: impl fmt::Display) -> serde_json::Error {
    de::Error::custom(reason)
}

/// Largest integer every reader of the format represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn index(n: f64) -> JsonResult<i64> {
    if n.fract() != 0.0 || n.abs() > MAX_SAFE_INTEGER {
        return Err(invalid(format_args!("{n} is not an index")));
    }
    Ok(n as i64)
}

// ============================================================================
// Top level
// ============================================================================

/// The whole text: a bare sentinel or the slot array.
struct Document<'a> {
    config: &'a DecodeConfig,
}

impl<'de> DeserializeSeed<'de> for Document<'_> {
    type Value = Flattened;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Flattened, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for Document<'_> {
    type Value = Flattened;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of slots or a sentinel")
    }

    fn visit_i64<E: de::Error>(self, root: i64) -> Result<Flattened, E> {
        if !sentinel::is_sentinel(root) || root == sentinel::HOLE {
            return Err(E::custom(format_args!("{root} is not a valid root")));
        }
        Ok(Flattened {
            root,
            slots: Vec::new(),
        })
    }

    fn visit_u64<E: de::Error>(self, root: u64) -> Result<Flattened, E> {
        Err(E::custom(format_args!("{root} is not a valid root")))
    }

    fn visit_f64<E: de::Error>(self, root: f64) -> Result<Flattened, E> {
        let root = index(root).map_err(E::custom)?;
        self.visit_i64(root)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Flattened, A::Error> {
        let mut slots = Vec::new();
        while let Some(WireSlot(slot)) = seq.next_element::<WireSlot>()? {
            slots.push(slot);
            if !self.config.accepts_slots(slots.len()) {
                return Err(de::Error::custom(format_args!(
                    "more than {} slots",
                    self.config.max_slots.unwrap_or_default()
                )));
            }
        }
        if slots.is_empty() {
            return Err(de::Error::custom("empty array"));
        }
        Ok(Flattened { root: 0, slots })
    }
}

// ============================================================================
// Slots
// ============================================================================

/// One element of the slot array. Captured raw so that strings can be
/// re-read as bytes.
struct WireSlot(Slot);

impl<'de> Deserialize<'de> for WireSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = <&RawValue>::deserialize(deserializer)?;
        slot(raw.get()).map(WireSlot).map_err(de::Error::custom)
    }
}

fn slot(text: &str) -> JsonResult<Slot> {
    match text.as_bytes().first() {
        Some(b'[') => array_slot(serde_json::from_str::<Vec<Scalar>>(text)?),
        Some(b'{') => {
            let WireRecord(entries) = serde_json::from_str::<WireRecord>(text)?;
            Ok(Slot::Record {
                bare: false,
                entries,
            })
        }
        _ => Ok(Slot::Primitive(match scalar(text)? {
            Scalar::Null => Primitive::Null,
            Scalar::Bool(b) => Primitive::Bool(b),
            Scalar::Number(n) => Primitive::Number(n),
            Scalar::String(s) => Primitive::String(s),
        })),
    }
}

/// A `{key: index}` record slot, keys in document order.
struct WireRecord(Vec<(JsString, i64)>);

impl<'de> Deserialize<'de> for WireRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(WireRecordVisitor)
    }
}

struct WireRecordVisitor;

impl<'de> Visitor<'de> for WireRecordVisitor {
    type Value = WireRecord;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a record of indices")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<WireRecord, A::Error> {
        let mut entries = Vec::new();
        while let Some(WireString(key)) = map.next_key::<WireString>()? {
            let index = map
                .next_value::<Scalar>()?
                .into_index()
                .map_err(de::Error::custom)?;
            entries.push((key, index));
        }
        Ok(WireRecord(entries))
    }
}

// ============================================================================
// Scalars
// ============================================================================

enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    String(JsString),
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = <&RawValue>::deserialize(deserializer)?;
        scalar(raw.get()).map_err(de::Error::custom)
    }
}

fn scalar(text: &str) -> JsonResult<Scalar> {
    if text.starts_with('"') {
        let WireString(s) = serde_json::from_str::<WireString>(text)?;
        return Ok(Scalar::String(s));
    }
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Null => Ok(Scalar::Null),
        serde_json::Value::Bool(b) => Ok(Scalar::Bool(b)),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Scalar::Number)
            .ok_or_else(|| invalid(format_args!("invalid number {n}"))),
        _ => Err(invalid("nested containers are not allowed")),
    }
}

impl Scalar {
    fn describe(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "a boolean",
            Scalar::Number(_) => "a number",
            Scalar::String(_) => "a string",
        }
    }

    fn into_index(self) -> JsonResult<i64> {
        match self {
            Scalar::Number(n) => index(n),
            other => Err(invalid(format_args!(
                "expected an index, got {}",
                other.describe()
            ))),
        }
    }

    fn into_string(self) -> JsonResult<JsString> {
        match self {
            Scalar::String(s) => Ok(s),
            other => Err(invalid(format_args!(
                "expected a string, got {}",
                other.describe()
            ))),
        }
    }
}

/// A JSON string as UTF-16 code units, unpaired surrogates included.
struct WireString(JsString);

impl<'de> Deserialize<'de> for WireString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_bytes(WireStringVisitor)
    }
}

struct WireStringVisitor;

impl<'de> Visitor<'de> for WireStringVisitor {
    type Value = WireString;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string")
    }

    fn visit_bytes<E: de::Error>(self, bytes: &[u8]) -> Result<WireString, E> {
        Ok(WireString(JsString::from_units(wtf8_to_utf16(bytes))))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<WireString, E> {
        Ok(WireString(s.into()))
    }
}

/// Re-encode WTF-8 (UTF-8 that may contain encoded surrogates) as UTF-16.
fn wtf8_to_utf16(bytes: &[u8]) -> Vec<u16> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let lead = bytes[i];
        let (len, init) = match lead {
            0x00..=0x7F => (1, u32::from(lead)),
            0xC0..=0xDF => (2, u32::from(lead & 0x1F)),
            0xE0..=0xEF => (3, u32::from(lead & 0x0F)),
            _ => (4, u32::from(lead & 0x07)),
        };
        let end = (i + len).min(bytes.len());
        let code = bytes[i + 1..end]
            .iter()
            .fold(init, |code, &byte| (code << 6) | u32::from(byte & 0x3F));
        i = end;

        match u16::try_from(code) {
            Ok(unit) => units.push(unit),
            Err(_) => {
                let offset = code - 0x1_0000;
                units.push(0xD800 | (offset >> 10) as u16);
                units.push(0xDC00 | (offset & 0x3FF) as u16);
            }
        }
    }
    units
}

// ============================================================================
// Tagged slots
// ============================================================================

/// Interpret a slot written as an array: a list of indices, or a tag followed
/// by the tag's payload.
fn array_slot(items: Vec<Scalar>) -> JsonResult<Slot> {
    let mut items = items.into_iter();
    let tag = match items.next() {
        None => return Ok(Slot::List(Vec::new())),
        Some(Scalar::String(tag)) => tag,
        Some(first) => {
            let refs = std::iter::once(first)
                .chain(items)
                .map(Scalar::into_index)
                .collect::<JsonResult<_>>()?;
            return Ok(Slot::List(refs));
        }
    };
    let tag = tag
        .to_utf8()
        .ok_or_else(|| invalid("tag is not valid UTF-8"))?;
    let rest: Vec<Scalar> = items.collect();
    let count = rest.len();
    let arity =
        |expected: &str| invalid(format_args!("{tag} expects {expected}, got {count} values"));

    match tag.as_str() {
        "Date" => {
            let [iso] = <[Scalar; 1]>::try_from(rest).map_err(|_| arity("one value"))?;
            Ok(Slot::Date(iso.into_string()?.to_string_lossy()))
        }
        "RegExp" => {
            let mut rest = rest.into_iter();
            let source = match (rest.next(), rest.len()) {
                (Some(source), 0 | 1) => source.into_string()?,
                _ => return Err(arity("one or two values")),
            };
            let flags = match rest.next() {
                Some(flags) => flags.into_string()?,
                None => JsString::new(),
            };
            Ok(Slot::RegExp { source, flags })
        }
        "BigInt" => {
            let [digits] = <[Scalar; 1]>::try_from(rest).map_err(|_| arity("one value"))?;
            let digits = digits
                .into_string()?
                .to_utf8()
                .ok_or_else(|| invalid("BigInt digits are not valid UTF-8"))?;
            Ok(Slot::BigInt(digits))
        }
        "Object" => {
            let [inner] = <[Scalar; 1]>::try_from(rest).map_err(|_| arity("one value"))?;
            Ok(Slot::Boxed(inner.into_index()?))
        }
        "Set" => Ok(Slot::Set(indices(rest)?)),
        "Map" => {
            if count % 2 != 0 {
                return Err(arity("key/value pairs"));
            }
            let refs = indices(rest)?;
            Ok(Slot::Map(
                refs.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect(),
            ))
        }
        "null" => {
            if count % 2 != 0 {
                return Err(arity("key/index pairs"));
            }
            let mut entries = Vec::with_capacity(count / 2);
            let mut rest = rest.into_iter();
            while let (Some(key), Some(value)) = (rest.next(), rest.next()) {
                entries.push((key.into_string()?, value.into_index()?));
            }
            Ok(Slot::Record {
                bare: true,
                entries,
            })
        }
        _ => Ok(Slot::Custom {
            fields: indices(rest)?,
            tag,
        }),
    }
}

fn indices(items: Vec<Scalar>) -> JsonResult<Vec<i64>> {
    items.into_iter().map(Scalar::into_index).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(text: &str) -> Vec<Slot> {
        read(text, &DecodeConfig::default()).unwrap().slots
    }

    fn malformed(text: &str) -> bool {
        matches!(
            read(text, &DecodeConfig::default()),
            Err(Error::MalformedInput(_))
        )
    }

    #[test]
    fn test_sentinel_roots() {
        let flattened = read(" -6 ", &DecodeConfig::default()).unwrap();
        assert_eq!(flattened.root, sentinel::NEGATIVE_ZERO);
        assert!(flattened.slots.is_empty());
        assert!(malformed("-2"));
        assert!(malformed("-7"));
        assert!(malformed("0"));
        assert!(malformed("-0"));
    }

    #[test]
    fn test_slot_kinds() {
        assert_eq!(
            slots(r#"[[1,-2],{"a":0},["null","k",0],["Map",1,2],["RegExp","x"],["Point",3]]"#),
            vec![
                Slot::List(vec![1, sentinel::HOLE]),
                Slot::Record {
                    bare: false,
                    entries: vec![("a".into(), 0)],
                },
                Slot::Record {
                    bare: true,
                    entries: vec![("k".into(), 0)],
                },
                Slot::Map(vec![(1, 2)]),
                Slot::RegExp {
                    source: "x".into(),
                    flags: JsString::new(),
                },
                Slot::Custom {
                    tag: "Point".into(),
                    fields: vec![3],
                },
            ]
        );
    }

    #[test]
    fn test_strings_keep_escaped_surrogates() {
        assert_eq!(
            slots(r#"["a\uD800b","\u003C/script>","\n𝌆","\uD834\uDF06\uDC00"]"#),
            vec![
                Slot::Primitive(Primitive::String(JsString::from_units(vec![
                    0x61, 0xD800, 0x62
                ]))),
                Slot::Primitive(Primitive::String("</script>".into())),
                Slot::Primitive(Primitive::String("\n𝌆".into())),
                Slot::Primitive(Primitive::String(JsString::from_units(vec![
                    0xD834, 0xDF06, 0xDC00
                ]))),
            ]
        );
    }

    #[test]
    fn test_record_keys_keep_escaped_surrogates() {
        assert_eq!(
            slots(r#"[{"\uDFFF":1,"b":1},2]"#)[0],
            Slot::Record {
                bare: false,
                entries: vec![(JsString::from_units(vec![0xDFFF]), 1), ("b".into(), 1)],
            }
        );
    }

    #[test]
    fn test_wtf8_to_utf16() {
        assert_eq!(wtf8_to_utf16(b"ab"), vec![0x61, 0x62]);
        assert_eq!(wtf8_to_utf16("ñ€𝌆".as_bytes()), vec![0xF1, 0x20AC, 0xD834, 0xDF06]);
        assert_eq!(wtf8_to_utf16(&[0xED, 0xA0, 0x80]), vec![0xD800]);
    }

    #[test]
    fn test_whitespace_is_allowed() {
        assert_eq!(
            slots("[ [ 1 , 2 ] ,\n\"x\" ]"),
            vec![
                Slot::List(vec![1, 2]),
                Slot::Primitive(Primitive::String("x".into()))
            ]
        );
    }

    #[test]
    fn test_rejects_malformed_text() {
        for text in [
            "",
            "[]",
            "{}",
            "\"x\"",
            "[1,]",
            "[1",
            "[1] x",
            "[[1.5]]",
            "[[[1]]]",
            "[{\"a\":\"b\"}]",
            "[\"\u{1}\"]",
            "[\"\\x\"]",
            "[[\"Map\",1]]",
            "[[\"Date\"]]",
            "[[\"Object\",\"x\"]]",
            "[[\"RegExp\",\"a\",\"b\",\"c\"]]",
            "[nul]",
        ] {
            assert!(malformed(text), "accepted {text:?}");
        }
    }

    #[test]
    fn test_rejects_numbers_outside_json_grammar() {
        for text in ["[01]", "[1.]", "[.5]", "[+1]", "[1e]", "[-]", "[[01]]", "[1e400]"] {
            assert!(malformed(text), "accepted {text:?}");
        }
    }

    #[test]
    fn test_limits() {
        let config = DecodeConfig {
            max_input_len: Some(4),
            max_slots: None,
        };
        assert!(read("[1,2]", &config).is_err());

        let config = DecodeConfig {
            max_input_len: None,
            max_slots: Some(1),
        };
        assert!(read("[1]", &config).is_ok());
        assert!(read("[1,2]", &config).is_err());
    }
}
