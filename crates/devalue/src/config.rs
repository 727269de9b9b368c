//! Decode limits.

use serde::{Deserialize, Serialize};

/// Limits applied when parsing untrusted text.
///
/// Example config.toml:
/// ```toml
/// [decode]
/// max_input_len = 1048576   # bytes of text accepted (default: unlimited)
/// max_slots = 65536         # slots in the array (default: unlimited)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DecodeConfig {
    /// Longest input accepted, in bytes. None = unlimited
    pub max_input_len: Option<usize>,
    /// Most slots accepted. None = unlimited
    pub max_slots: Option<usize>,
}

impl DecodeConfig {
    /// Does `len` bytes of input fit?
    pub fn accepts_len(&self, len: usize) -> bool {
        self.max_input_len.is_none_or(|max| len <= max)
    }

    /// Does a slot count of `count` fit?
    pub fn accepts_slots(&self, count: usize) -> bool {
        self.max_slots.is_none_or(|max| count <= max)
    }
}
