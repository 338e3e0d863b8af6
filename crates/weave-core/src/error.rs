/// Core error types for the Weave runtime.
use crate::resource::ResourceKind;

/// A specialized Result type for Weave operations.
pub type WeaveResult<T> = Result<T, WeaveError>;

/// Top-level error type encompassing registry, assembly, scheduling and execution.
#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    #[error("unknown pass type '{0}'")]
    UnknownPassType(String),

    #[error("pass type '{0}' is already registered")]
    DuplicatePassType(String),

    #[error("invalid configuration for pass type '{pass_type}': {message}")]
    InvalidConfiguration { pass_type: String, message: String },

    #[error("a stage named '{0}' already exists")]
    DuplicateName(String),

    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("stage '{stage}' has no {direction} slot named '{slot}'")]
    UnknownSlot {
        stage: String,
        slot: String,
        direction: &'static str,
    },

    #[error("invalid slot path '{0}' (expected '<stage>.<slot>')")]
    InvalidSlotPath(String),

    #[error("cannot connect {source_slot} ({source_kind}) to {dest_slot} ({dest_kind})")]
    IncompatibleResourceKind {
        source_slot: String,
        source_kind: ResourceKind,
        dest_slot: String,
        dest_kind: ResourceKind,
    },

    #[error("input slot {0} is already bound")]
    SlotAlreadyBound(String),

    #[error("no edge from {from} to {to}")]
    UnknownEdge { from: String, to: String },

    #[error("cyclic dependency between stages: {}", .stages.join(", "))]
    CyclicDependency { stages: Vec<String> },

    #[error("input {stage}.{slot} is bound to missing producer {producer}")]
    UnsatisfiedInput {
        stage: String,
        slot: String,
        producer: String,
    },

    #[error("required input {stage}.{slot} has no producer and no external resource")]
    MissingInput { stage: String, slot: String },

    #[error("stage '{stage}' failed (bound inputs: [{}]): {source}", .bound_inputs.join(", "))]
    StageFailed {
        stage: String,
        bound_inputs: Vec<String>,
        source: Box<WeaveError>,
    },

    #[error("pass error: {0}")]
    Pass(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl WeaveError {
    /// Create an invalid-configuration error for a pass type.
    pub fn invalid_config(pass_type: impl Into<String>, message: impl Into<String>) -> Self {
        WeaveError::InvalidConfiguration {
            pass_type: pass_type.into(),
            message: message.into(),
        }
    }

    /// Create an unknown-slot error.
    pub fn unknown_slot(
        stage: impl Into<String>,
        slot: impl Into<String>,
        direction: &'static str,
    ) -> Self {
        WeaveError::UnknownSlot {
            stage: stage.into(),
            slot: slot.into(),
            direction,
        }
    }

    /// Create a pass-level failure.
    pub fn pass(message: impl Into<String>) -> Self {
        WeaveError::Pass(message.into())
    }

    /// True for errors raised while assembling a graph (as opposed to scheduling or running it).
    pub fn is_assembly_error(&self) -> bool {
        matches!(
            self,
            WeaveError::UnknownPassType(_)
                | WeaveError::InvalidConfiguration { .. }
                | WeaveError::DuplicateName(_)
                | WeaveError::UnknownStage(_)
                | WeaveError::UnknownSlot { .. }
                | WeaveError::InvalidSlotPath(_)
                | WeaveError::IncompatibleResourceKind { .. }
                | WeaveError::SlotAlreadyBound(_)
                | WeaveError::UnknownEdge { .. }
        )
    }
}
