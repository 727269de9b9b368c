//! Short identifiers for shared nodes in generated expressions.

const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_$";

/// Names that cannot be used as a parameter, or that would shadow a global
/// the generated code refers to.
pub const RESERVED: &[&str] = &[
    // keywords and future reserved words
    "do", "if", "in", "for", "int", "let", "new", "try", "var", "byte", "case", "char", "else",
    "enum", "goto", "long", "this", "void", "with", "await", "break", "catch", "class", "const",
    "final", "float", "short", "super", "throw", "while", "yield", "delete", "double", "export",
    "import", "native", "return", "switch", "throws", "typeof", "boolean", "default", "extends",
    "finally", "package", "private", "abstract", "continue", "debugger", "function", "volatile",
    "interface", "protected", "transient", "implements", "instanceof", "synchronized",
    // literals and globals
    "null", "true", "false", "undefined", "NaN", "Infinity", "eval", "arguments", "Object",
    "Array", "Set", "Map", "Date", "RegExp", "BigInt",
];

/// The `ordinal`-th name in bijective base 54: `a`..`$`, then `aa`, `ab`, ...
pub fn name(ordinal: usize) -> String {
    let base = CHARS.len();
    let mut n = ordinal;
    let mut out = Vec::new();
    loop {
        out.push(CHARS[n % base]);
        if n < base {
            break;
        }
        n = n / base - 1;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

/// Like [`name`], with `0` appended to reserved names. Base names never
/// contain digits, so the suffixed form cannot collide with another name.
pub fn binding(ordinal: usize) -> String {
    let mut name = name(ordinal);
    if RESERVED.contains(&name.as_str()) {
        name.push('0');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_single_characters_first() {
        assert_eq!(name(0), "a");
        assert_eq!(name(25), "z");
        assert_eq!(name(26), "A");
        assert_eq!(name(53), "$");
        assert_eq!(name(54), "aa");
        assert_eq!(name(55), "ab");
        assert_eq!(name(54 + 54 * 54), "aaa");
    }

    #[test]
    fn test_reserved_names_are_suffixed() {
        assert_eq!(name(230), "do");
        assert_eq!(binding(230), "do0");
        assert_eq!(binding(0), "a");
    }

    #[test]
    fn test_bindings_are_unique() {
        let mut seen = HashSet::new();
        for ordinal in 0..25_000 {
            let binding = binding(ordinal);
            assert!(!RESERVED.contains(&binding.as_str()));
            assert!(seen.insert(binding));
        }
    }
}
