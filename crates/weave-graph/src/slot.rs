use serde::{Deserialize, Serialize};

use weave_core::{ResourceKind, WeaveError, WeaveResult};

/// A fully-qualified `<stage>.<slot>` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotRef {
    pub stage: String,
    pub slot: String,
}

impl SlotRef {
    pub fn new(stage: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            slot: slot.into(),
        }
    }

    /// Parse `<stage>.<slot>`, splitting at the first `.`. Both parts must be non-empty.
    pub fn parse(path: &str) -> WeaveResult<Self> {
        match path.split_once('.') {
            Some((stage, slot)) if !stage.is_empty() && !slot.is_empty() => {
                Ok(Self::new(stage, slot))
            }
            _ => Err(WeaveError::InvalidSlotPath(path.to_string())),
        }
    }
}

impl std::fmt::Display for SlotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.stage, self.slot)
    }
}

impl std::str::FromStr for SlotRef {
    type Err = WeaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SlotRef::parse(s)
    }
}

impl TryFrom<String> for SlotRef {
    type Error = WeaveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SlotRef::parse(&value)
    }
}

impl From<SlotRef> for String {
    fn from(value: SlotRef) -> Self {
        value.to_string()
    }
}

/// Whether a slot consumes or produces a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotDirection {
    Input,
    Output,
}

impl SlotDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotDirection::Input => "input",
            SlotDirection::Output => "output",
        }
    }
}

/// Declaration of one named, typed slot on a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDesc {
    pub name: String,
    pub kind: ResourceKind,
    /// Optional inputs may stay unbound; optional outputs may be left unproduced.
    pub optional: bool,
    pub description: String,
}

impl SlotDesc {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            optional: false,
            description: String::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The static slot layout a pass exposes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PassReflection {
    inputs: Vec<SlotDesc>,
    outputs: Vec<SlotDesc>,
    publishes: bool,
}

impl PassReflection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, slot: SlotDesc) -> Self {
        self.inputs.retain(|s| s.name != slot.name);
        self.inputs.push(slot);
        self
    }

    pub fn output(mut self, slot: SlotDesc) -> Self {
        self.outputs.retain(|s| s.name != slot.name);
        self.outputs.push(slot);
        self
    }

    /// Declare that the pass writes to the frame dictionary.
    ///
    /// Undeclared writes fail the stage.
    pub fn publishing(mut self) -> Self {
        self.publishes = true;
        self
    }

    pub fn publishes(&self) -> bool {
        self.publishes
    }

    pub fn inputs(&self) -> &[SlotDesc] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[SlotDesc] {
        &self.outputs
    }

    pub fn find(&self, name: &str, direction: SlotDirection) -> Option<&SlotDesc> {
        let slots = match direction {
            SlotDirection::Input => &self.inputs,
            SlotDirection::Output => &self.outputs,
        };
        slots.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slot_ref() {
        let r = SlotRef::parse("GBufferRT.posW").unwrap();
        assert_eq!(r.stage, "GBufferRT");
        assert_eq!(r.slot, "posW");
        assert_eq!(r.to_string(), "GBufferRT.posW");
    }

    #[test]
    fn test_parse_splits_at_first_dot() {
        let r: SlotRef = "a.b.c".parse().unwrap();
        assert_eq!(r.stage, "a");
        assert_eq!(r.slot, "b.c");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "noslot", ".slot", "stage.", "."] {
            assert!(
                matches!(SlotRef::parse(bad), Err(WeaveError::InvalidSlotPath(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_slot_ref_serde_as_string() {
        let r = SlotRef::new("ToneMapper", "dst");
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"ToneMapper.dst\"");
        let back: SlotRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert!(serde_json::from_str::<SlotRef>("\"nodot\"").is_err());
    }

    #[test]
    fn test_reflection_lookup() {
        let refl = PassReflection::new()
            .input(SlotDesc::new("src", ResourceKind::Color))
            .output(SlotDesc::new("dst", ResourceKind::Color).optional());
        assert!(refl.find("src", SlotDirection::Input).is_some());
        assert!(refl.find("src", SlotDirection::Output).is_none());
        assert!(refl.find("dst", SlotDirection::Output).unwrap().optional);
    }

    #[test]
    fn test_redeclared_slot_replaces() {
        let refl = PassReflection::new()
            .input(SlotDesc::new("src", ResourceKind::Color))
            .input(SlotDesc::new("src", ResourceKind::Depth));
        assert_eq!(refl.inputs().len(), 1);
        assert_eq!(refl.inputs()[0].kind, ResourceKind::Depth);
    }
}
