//! Indexed-array writer.
//!
//! Emits a [`Flattened`] graph as JSON text: an array with one entry per slot,
//! or a bare sentinel number when the whole value is a special scalar.

use crate::escape;
use crate::flatten::{Flattened, Primitive, Slot};
use crate::value::JsString;

/// Emits flattened slots as JSON.
pub struct ArrayWriter {
    output: String,
}

impl ArrayWriter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    /// Emit a flattened graph.
    pub fn emit(flattened: &Flattened) -> String {
        if flattened.root < 0 {
            return flattened.root.to_string();
        }
        let mut writer = Self::new();
        writer.output.push('[');
        for (i, slot) in flattened.slots.iter().enumerate() {
            if i > 0 {
                writer.output.push(',');
            }
            writer.write_slot(slot);
        }
        writer.output.push(']');
        writer.output
    }

    fn write_slot(&mut self, slot: &Slot) {
        match slot {
            Slot::Primitive(Primitive::Null) => self.output.push_str("null"),
            Slot::Primitive(Primitive::Bool(b)) => self.output.push_str(&b.to_string()),
            Slot::Primitive(Primitive::Number(n)) => self.output.push_str(&escape::number(*n)),
            Slot::Primitive(Primitive::String(s)) => self.output.push_str(&escape::quote(s)),

            Slot::BigInt(digits) => self.write_tagged("BigInt", |w| w.write_str(digits)),

            Slot::List(refs) => {
                self.output.push('[');
                self.write_refs(refs);
                self.output.push(']');
            }

            Slot::Record {
                bare: false,
                entries,
            } => {
                self.output.push('{');
                for (i, (key, index)) in entries.iter().enumerate() {
                    if i > 0 {
                        self.output.push(',');
                    }
                    self.output.push_str(&escape::quote(key));
                    self.output.push(':');
                    self.output.push_str(&index.to_string());
                }
                self.output.push('}');
            }

            Slot::Record { bare: true, entries } => self.write_tagged("null", |w| {
                for (key, index) in entries {
                    w.output.push(',');
                    w.output.push_str(&escape::quote(key));
                    w.output.push(',');
                    w.output.push_str(&index.to_string());
                }
            }),

            Slot::Set(refs) => self.write_tagged("Set", |w| w.write_tail(refs)),

            Slot::Map(entries) => self.write_tagged("Map", |w| {
                for (key, value) in entries {
                    w.output.push_str(&format!(",{key},{value}"));
                }
            }),

            Slot::Boxed(inner) => self.write_tagged("Object", |w| w.write_tail(&[*inner])),

            Slot::Date(iso) => self.write_tagged("Date", |w| w.write_str(iso)),

            Slot::RegExp { source, flags } => self.write_tagged("RegExp", |w| {
                w.output.push(',');
                w.output.push_str(&escape::quote(source));
                if !flags.is_empty() {
                    w.output.push(',');
                    w.output.push_str(&escape::quote(flags));
                }
            }),

            Slot::Custom { tag, fields } => self.write_tagged(tag, |w| w.write_tail(fields)),
        }
    }

    /// `[<tag>` then whatever `rest` writes, then `]`.
    fn write_tagged(&mut self, tag: &str, rest: impl FnOnce(&mut Self)) {
        self.output.push('[');
        self.output.push_str(&escape::quote(&JsString::from(tag)));
        rest(self);
        self.output.push(']');
    }

    fn write_str(&mut self, s: &str) {
        self.output.push(',');
        self.output.push_str(&escape::quote(&JsString::from(s)));
    }

    fn write_refs(&mut self, refs: &[i64]) {
        for (i, index) in refs.iter().enumerate() {
            if i > 0 {
                self.output.push(',');
            }
            self.output.push_str(&index.to_string());
        }
    }

    fn write_tail(&mut self, refs: &[i64]) {
        for index in refs {
            self.output.push(',');
            self.output.push_str(&index.to_string());
        }
    }
}

impl Default for ArrayWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::sentinel;

    fn emit(slots: Vec<Slot>) -> String {
        ArrayWriter::emit(&Flattened { root: 0, slots })
    }

    #[test]
    fn test_sentinel_root_is_bare() {
        let flattened = Flattened {
            root: sentinel::NEGATIVE_ZERO,
            slots: Vec::new(),
        };
        assert_eq!(ArrayWriter::emit(&flattened), "-6");
    }

    #[test]
    fn test_slot_shapes() {
        assert_eq!(
            emit(vec![
                Slot::List(vec![1, sentinel::HOLE]),
                Slot::Record {
                    bare: true,
                    entries: vec![("k".into(), 0)],
                },
                Slot::Map(vec![(1, 2)]),
                Slot::RegExp {
                    source: "a/b".into(),
                    flags: "".into(),
                },
                Slot::Custom {
                    tag: "Point".into(),
                    fields: vec![3, 4],
                },
                Slot::BigInt("-12".into()),
            ]),
            r#"[[1,-2],["null","k",0],["Map",1,2],["RegExp","a/b"],["Point",3,4],["BigInt","-12"]]"#
        );
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(
            emit(vec![
                Slot::List(Vec::new()),
                Slot::Record {
                    bare: false,
                    entries: Vec::new(),
                },
                Slot::Set(Vec::new()),
                Slot::Map(Vec::new()),
            ]),
            r#"[[],{},["Set"],["Map"]]"#
        );
    }
}
