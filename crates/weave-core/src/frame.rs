use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::ConfigValue;

/// Describes the frame currently being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameInfo {
    /// Zero-based frame index.
    pub index: u64,
    /// Default texture width for this frame.
    pub width: u32,
    /// Default texture height for this frame.
    pub height: u32,
}

impl FrameInfo {
    pub fn new(index: u64, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
        }
    }
}

impl std::fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({}, {}x{})", self.index, self.width, self.height)
    }
}

/// Key/value store shared by all passes of a graph.
///
/// Values written during a frame are visible to stages later in the same
/// frame and to every stage in subsequent frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDictionary {
    values: BTreeMap<String, ConfigValue>,
}

impl FrameDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Boolean lookup; absent or non-bool entries read as false.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(ConfigValue::as_bool).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_display() {
        assert_eq!(FrameInfo::new(3, 4, 2).to_string(), "Frame(3, 4x2)");
    }

    #[test]
    fn test_dictionary_flag() {
        let mut dict = FrameDictionary::new();
        assert!(!dict.flag("change_occurred"));
        dict.insert("change_occurred", true);
        assert!(dict.flag("change_occurred"));
        dict.insert("change_occurred", 1);
        assert!(!dict.flag("change_occurred"));
        assert_eq!(dict.remove("change_occurred"), Some(ConfigValue::Int(1)));
        assert!(dict.is_empty());
    }
}
