//! Configuration values and records handed to passes at creation time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single option value.
///
/// The serde representation is untagged, so TOML and JSON documents map
/// onto it directly: `true`, `16`, `0.25`, `"Stratified"`, or a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// An enumerated symbol such as `Aces` or `CullBack`.
    Symbol(String),
    Record(ConfigRecord),
}

impl ConfigValue {
    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Symbol(_) => "symbol",
            ConfigValue::Record(_) => "record",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            ConfigValue::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&ConfigRecord> {
        match self {
            ConfigValue::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(v) => write!(f, "{:?}", v),
            ConfigValue::Symbol(s) => write!(f, "{}", s),
            ConfigValue::Record(r) => write!(f, "{}", r),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int(v as i64)
    }
}

impl From<u32> for ConfigValue {
    fn from(v: u32) -> Self {
        ConfigValue::Int(v as i64)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<f32> for ConfigValue {
    fn from(v: f32) -> Self {
        ConfigValue::Float(v as f64)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Symbol(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Symbol(v)
    }
}

impl From<ConfigRecord> for ConfigValue {
    fn from(v: ConfigRecord) -> Self {
        ConfigValue::Record(v)
    }
}

/// An ordered mapping of option name to value.
///
/// Records are built up front and then frozen into a stage; there is no
/// in-place mutation API once a record has been handed to the registry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigRecord {
    entries: BTreeMap<String, ConfigValue>,
}

impl ConfigRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigValue::as_bool)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ConfigValue::as_int)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ConfigValue::as_float)
    }

    pub fn get_symbol(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_symbol)
    }

    pub fn get_record(&self, key: &str) -> Option<&ConfigRecord> {
        self.get(key).and_then(ConfigValue::as_record)
    }
}

impl FromIterator<(String, ConfigValue)> for ConfigRecord {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for ConfigRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_getters() {
        let rec = ConfigRecord::new()
            .with("sampleCount", 16)
            .with("adjustShadingNormals", true)
            .with("whitePoint", 6500.0)
            .with("operator", "Aces");
        assert_eq!(rec.get_int("sampleCount"), Some(16));
        assert_eq!(rec.get_bool("adjustShadingNormals"), Some(true));
        assert_eq!(rec.get_float("whitePoint"), Some(6500.0));
        assert_eq!(rec.get_symbol("operator"), Some("Aces"));
        assert_eq!(rec.get_float("sampleCount"), Some(16.0));
        assert!(rec.get("missing").is_none());
    }

    #[test]
    fn test_untagged_json() {
        let rec: ConfigRecord = serde_json::from_str(
            r#"{"a": true, "b": 3, "c": 0.5, "d": "Stratified", "e": {"f": 1}}"#,
        )
        .unwrap();
        assert_eq!(rec.get("a"), Some(&ConfigValue::Bool(true)));
        assert_eq!(rec.get("b"), Some(&ConfigValue::Int(3)));
        assert_eq!(rec.get("c"), Some(&ConfigValue::Float(0.5)));
        assert_eq!(rec.get_symbol("d"), Some("Stratified"));
        assert_eq!(rec.get_record("e").and_then(|r| r.get_int("f")), Some(1));
    }

    #[test]
    fn test_untagged_toml() {
        let rec: ConfigRecord = toml::from_str(
            "clamp = true\nfilmSpeed = 100.0\n[nested]\nbinCount = 16\n",
        )
        .unwrap();
        assert_eq!(rec.get_bool("clamp"), Some(true));
        assert_eq!(rec.get("filmSpeed"), Some(&ConfigValue::Float(100.0)));
        assert_eq!(
            rec.get_record("nested").and_then(|r| r.get_int("binCount")),
            Some(16)
        );
    }

    #[test]
    fn test_display() {
        let rec = ConfigRecord::new().with("b", 1.0).with("a", "X");
        assert_eq!(rec.to_string(), "{a: X, b: 1.0}");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ConfigValue::from(1).type_name(), "integer");
        assert_eq!(ConfigValue::from(ConfigRecord::new()).type_name(), "record");
    }
}
