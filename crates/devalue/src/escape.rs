//! Quoting and literal formatting shared by both output formats.
//!
//! Every quoted string is valid JSON and a valid JavaScript string literal,
//! and is safe to place inside an HTML `<script>` element:
//!
//! - `<` is written as `\u003C`, so `</script>` and `<!--` cannot appear
//! - U+2028 and U+2029 are escaped (they end a line in older JavaScript)
//! - unpaired surrogates are escaped, so the text stays well-formed UTF-8 and
//!   decodes back to the same code units
//! - no raw control characters are emitted, C1 controls and DEL included

use crate::value::{JsString, Value};

/// Quote a string.
pub fn quote(s: &JsString) -> String {
    quote_units(s.units())
}

/// Quote raw UTF-16 code units.
pub fn quote_units(units: &[u16]) -> String {
    let mut out = String::with_capacity(units.len() + 2);
    out.push('"');

    let mut i = 0;
    while i < units.len() {
        let unit = units[i];
        match unit {
            0x22 => out.push_str("\\\""),
            0x5C => out.push_str("\\\\"),
            0x08 => out.push_str("\\b"),
            0x0C => out.push_str("\\f"),
            0x0A => out.push_str("\\n"),
            0x0D => out.push_str("\\r"),
            0x09 => out.push_str("\\t"),
            0x3C => out.push_str("\\u003C"),
            0x2028 => out.push_str("\\u2028"),
            0x2029 => out.push_str("\\u2029"),
            0x00..=0x1F | 0x7F..=0x9F => push_unicode_escape(&mut out, unit),
            0xD800..=0xDBFF => match units.get(i + 1) {
                Some(&low @ 0xDC00..=0xDFFF) => {
                    let code = 0x10000 + ((u32::from(unit) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
                    match char::from_u32(code) {
                        Some(c) => out.push(c),
                        None => {
                            push_unicode_escape(&mut out, unit);
                            push_unicode_escape(&mut out, low);
                        }
                    }
                    i += 1;
                }
                _ => push_unicode_escape(&mut out, unit),
            },
            0xDC00..=0xDFFF => push_unicode_escape(&mut out, unit),
            _ => match char::from_u32(u32::from(unit)) {
                Some(c) => out.push(c),
                None => push_unicode_escape(&mut out, unit),
            },
        }
        i += 1;
    }

    out.push('"');
    out
}

fn push_unicode_escape(out: &mut String, unit: u16) {
    out.push_str(&format!("\\u{unit:04X}"));
}

/// Whether `key` can be written bare, as `{key: ...}` or `obj.key`.
pub fn is_identifier(key: &JsString) -> bool {
    let units = key.units();
    let Some((&first, rest)) = units.split_first() else {
        return false;
    };
    let start = |u: u16| u == u16::from(b'_') || u == u16::from(b'$') || is_ascii_alpha(u);
    start(first) && rest.iter().all(|&u| start(u) || (0x30..=0x39).contains(&u))
}

fn is_ascii_alpha(unit: u16) -> bool {
    (0x41..=0x5A).contains(&unit) || (0x61..=0x7A).contains(&unit)
}

/// Key position in an object literal: `foo` or `"x-y"`.
pub fn safe_key(key: &JsString) -> String {
    if is_identifier(key) {
        key.to_string_lossy()
    } else {
        quote(key)
    }
}

/// Property access: `.foo` or `["x-y"]`.
pub fn safe_prop(key: &JsString) -> String {
    if is_identifier(key) {
        format!(".{}", key.to_string_lossy())
    } else {
        format!("[{}]", quote(key))
    }
}

/// Format a finite number so both JSON and JavaScript read it back exactly.
///
/// Integers below 1e21 are written in full; very large and very small
/// magnitudes use exponent notation.
pub fn number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if n.fract() == 0.0 && abs < 1e21 {
        format!("{n:.0}")
    } else if !(1e-6..1e21).contains(&abs) {
        format!("{n:e}")
    } else {
        format!("{n}")
    }
}

/// JavaScript literal for a number, including the special states.
pub fn js_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 && n.is_sign_negative() {
        return "-0".to_string();
    }
    let text = number(n);
    if let Some(rest) = text.strip_prefix("0.") {
        format!(".{rest}")
    } else if let Some(rest) = text.strip_prefix("-0.") {
        format!("-.{rest}")
    } else {
        text
    }
}

/// JavaScript literal for a primitive. `None` for objects.
pub fn primitive(value: &Value) -> Option<String> {
    Some(match value {
        Value::Undefined => "void 0".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => js_number(*n),
        Value::String(s) => quote(s),
        Value::BigInt(n) => format!("{n}n"),
        Value::Object(_) => return None,
    })
}
