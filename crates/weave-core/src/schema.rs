//! Typed option schemas for pass configuration records.
//!
//! Every registered pass type declares its options up front. A record handed
//! to the registry is checked against the schema: unknown keys, wrong value
//! types and unknown enum symbols always fail; out-of-range numbers fail or
//! clamp depending on the [`RangePolicy`]. The resolved record has every
//! declared option present, defaults filled in.

use serde::{Deserialize, Serialize};

use crate::value::{ConfigRecord, ConfigValue};

/// What to do with numeric options that fall outside their declared range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    /// Fail with an invalid-configuration error.
    #[default]
    Reject,
    /// Clamp into range and log a warning.
    Clamp,
}

/// The type (and constraints) of a single option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionKind {
    Bool,
    Int { min: Option<i64>, max: Option<i64> },
    Float { min: Option<f64>, max: Option<f64> },
    /// One of a fixed set of symbols.
    Symbol { variants: Vec<String> },
    /// A nested record with its own schema.
    Record(ConfigSchema),
}

impl OptionKind {
    fn describe(&self) -> String {
        match self {
            OptionKind::Bool => "bool".to_string(),
            OptionKind::Int { min, max } => format!("integer{}", range_text(min, max)),
            OptionKind::Float { min, max } => format!("float{}", range_text(min, max)),
            OptionKind::Symbol { variants } => format!("one of {}", variants.join("|")),
            OptionKind::Record(_) => "record".to_string(),
        }
    }
}

fn range_text<T: std::fmt::Display>(min: &Option<T>, max: &Option<T>) -> String {
    match (min, max) {
        (None, None) => String::new(),
        (Some(lo), None) => format!(" >= {}", lo),
        (None, Some(hi)) => format!(" <= {}", hi),
        (Some(lo), Some(hi)) => format!(" in [{}, {}]", lo, hi),
    }
}

/// A declared option: name, type, default and a short description.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub name: String,
    pub kind: OptionKind,
    pub default: ConfigValue,
    pub description: String,
}

impl OptionSpec {
    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, OptionKind::Bool, ConfigValue::Bool(default))
    }

    pub fn int(name: impl Into<String>, default: i64) -> Self {
        Self::new(
            name,
            OptionKind::Int {
                min: None,
                max: None,
            },
            ConfigValue::Int(default),
        )
    }

    pub fn float(name: impl Into<String>, default: f64) -> Self {
        Self::new(
            name,
            OptionKind::Float {
                min: None,
                max: None,
            },
            ConfigValue::Float(default),
        )
    }

    pub fn symbol(name: impl Into<String>, variants: &[&str], default: &str) -> Self {
        Self::new(
            name,
            OptionKind::Symbol {
                variants: variants.iter().map(|v| v.to_string()).collect(),
            },
            ConfigValue::Symbol(default.to_string()),
        )
    }

    /// A nested record; its default is the nested schema's defaults.
    pub fn record(name: impl Into<String>, schema: ConfigSchema) -> Self {
        let default = ConfigValue::Record(schema.defaults());
        Self::new(name, OptionKind::Record(schema), default)
    }

    fn new(name: impl Into<String>, kind: OptionKind, default: ConfigValue) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
            description: String::new(),
        }
    }

    /// Constrain a numeric option to `[min, max]`. Ignored for non-numeric kinds.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.kind = match self.kind {
            OptionKind::Int { .. } => OptionKind::Int {
                min: Some(min as i64),
                max: Some(max as i64),
            },
            OptionKind::Float { .. } => OptionKind::Float {
                min: Some(min),
                max: Some(max),
            },
            other => other,
        };
        self
    }

    /// Constrain a numeric option from below only.
    pub fn min(mut self, min: f64) -> Self {
        self.kind = match self.kind {
            OptionKind::Int { max, .. } => OptionKind::Int {
                min: Some(min as i64),
                max,
            },
            OptionKind::Float { max, .. } => OptionKind::Float {
                min: Some(min),
                max,
            },
            other => other,
        };
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Human-readable type summary, e.g. `integer in [1, 64]`.
    pub fn type_summary(&self) -> String {
        self.kind.describe()
    }
}

/// The set of options a pass type accepts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigSchema {
    options: Vec<OptionSpec>,
}

/// A single schema violation, with the dotted path of the offending option.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "option '{}': {}", self.path, self.message)
    }
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option. Later declarations with the same name replace earlier ones.
    pub fn option(mut self, spec: OptionSpec) -> Self {
        self.options.retain(|o| o.name != spec.name);
        self.options.push(spec);
        self
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    pub fn get(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.name == name)
    }

    /// A record holding every option's default.
    pub fn defaults(&self) -> ConfigRecord {
        self.options
            .iter()
            .map(|o| (o.name.clone(), o.default.clone()))
            .collect()
    }

    /// Check that every default conforms to its own option kind.
    pub fn check_defaults(&self) -> Result<(), SchemaViolation> {
        self.check_defaults_at("")
    }

    fn check_defaults_at(&self, prefix: &str) -> Result<(), SchemaViolation> {
        for spec in &self.options {
            let path = join_path(prefix, &spec.name);
            if let OptionKind::Record(nested) = &spec.kind {
                nested.check_defaults_at(&path)?;
            } else {
                let mut clamped = Vec::new();
                resolve_value(spec, &spec.default, &path, RangePolicy::Reject, &mut clamped)?;
            }
        }
        Ok(())
    }

    /// Validate `record` and return it with defaults filled in.
    ///
    /// Options clamped under [`RangePolicy::Clamp`] are reported through
    /// `clamped` so the caller can log them.
    pub fn resolve(
        &self,
        record: &ConfigRecord,
        policy: RangePolicy,
        clamped: &mut Vec<SchemaViolation>,
    ) -> Result<ConfigRecord, SchemaViolation> {
        self.resolve_at(record, "", policy, clamped)
    }

    fn resolve_at(
        &self,
        record: &ConfigRecord,
        prefix: &str,
        policy: RangePolicy,
        clamped: &mut Vec<SchemaViolation>,
    ) -> Result<ConfigRecord, SchemaViolation> {
        for (key, _) in record.iter() {
            if self.get(key).is_none() {
                return Err(SchemaViolation {
                    path: join_path(prefix, key),
                    message: "unknown option".to_string(),
                });
            }
        }

        let mut resolved = Vec::with_capacity(self.options.len());
        for spec in &self.options {
            let path = join_path(prefix, &spec.name);
            let value = match (record.get(&spec.name), &spec.kind) {
                (None, _) => spec.default.clone(),
                (Some(ConfigValue::Record(given)), OptionKind::Record(nested)) => {
                    ConfigValue::Record(nested.resolve_at(given, &path, policy, clamped)?)
                }
                (Some(given), _) => resolve_value(spec, given, &path, policy, clamped)?,
            };
            resolved.push((spec.name.clone(), value));
        }
        Ok(resolved.into_iter().collect())
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn resolve_value(
    spec: &OptionSpec,
    given: &ConfigValue,
    path: &str,
    policy: RangePolicy,
    clamped: &mut Vec<SchemaViolation>,
) -> Result<ConfigValue, SchemaViolation> {
    let violation = |message: String| SchemaViolation {
        path: path.to_string(),
        message,
    };
    let mismatch = || {
        violation(format!(
            "expected {}, got {} ({})",
            spec.kind.describe(),
            given.type_name(),
            given
        ))
    };

    match &spec.kind {
        OptionKind::Bool => given.as_bool().map(ConfigValue::Bool).ok_or_else(mismatch),
        OptionKind::Int { min, max } => {
            let v = given.as_int().ok_or_else(mismatch)?;
            let lo = min.unwrap_or(i64::MIN);
            let hi = max.unwrap_or(i64::MAX);
            if v < lo || v > hi {
                let message = format!("{} is outside{}", v, range_text(min, max));
                match policy {
                    RangePolicy::Reject => return Err(violation(message)),
                    RangePolicy::Clamp => {
                        clamped.push(violation(message));
                        return Ok(ConfigValue::Int(v.clamp(lo, hi)));
                    }
                }
            }
            Ok(ConfigValue::Int(v))
        }
        OptionKind::Float { min, max } => {
            let v = given.as_float().ok_or_else(mismatch)?;
            if !v.is_finite() {
                return Err(violation(format!("{} is not a finite number", v)));
            }
            let lo = min.unwrap_or(f64::MIN);
            let hi = max.unwrap_or(f64::MAX);
            if v < lo || v > hi {
                let message = format!("{} is outside{}", v, range_text(min, max));
                match policy {
                    RangePolicy::Reject => return Err(violation(message)),
                    RangePolicy::Clamp => {
                        clamped.push(violation(message));
                        return Ok(ConfigValue::Float(v.clamp(lo, hi)));
                    }
                }
            }
            Ok(ConfigValue::Float(v))
        }
        OptionKind::Symbol { variants } => {
            let s = given.as_symbol().ok_or_else(mismatch)?;
            if variants.iter().any(|v| v == s) {
                Ok(ConfigValue::Symbol(s.to_string()))
            } else {
                Err(violation(format!(
                    "unknown symbol '{}' (expected one of {})",
                    s,
                    variants.join("|")
                )))
            }
        }
        OptionKind::Record(_) => Err(mismatch()),
    }
}
