use std::collections::HashMap;
use std::sync::Arc;

use weave_core::{
    ConfigRecord, ConfigValue, FrameDictionary, FrameInfo, Resource, WeaveError, WeaveResult,
};

use crate::slot::PassReflection;

/// A unit of per-frame computation.
///
/// Implementations are created by a registered factory and never see the
/// graph they live in: everything a pass needs for a frame arrives through
/// the [`PassContext`]. State carried between frames (accumulation buffers,
/// counters) lives in `self`.
pub trait Pass: Send {
    /// The slots this pass exposes. Called once when the stage is created.
    fn reflect(&self) -> PassReflection;

    /// Run the per-frame step.
    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()>;
}

/// Everything a pass sees while executing one frame.
pub struct PassContext<'a> {
    stage: &'a str,
    frame: FrameInfo,
    inputs: &'a HashMap<String, Arc<Resource>>,
    outputs: HashMap<String, Arc<Resource>>,
    dictionary: &'a FrameDictionary,
    published: Vec<(String, ConfigValue)>,
}

impl<'a> PassContext<'a> {
    pub fn new(
        stage: &'a str,
        frame: FrameInfo,
        inputs: &'a HashMap<String, Arc<Resource>>,
        dictionary: &'a FrameDictionary,
    ) -> Self {
        Self {
            stage,
            frame,
            inputs,
            outputs: HashMap::new(),
            dictionary,
            published: Vec::new(),
        }
    }

    /// Name of the stage being executed.
    pub fn stage(&self) -> &str {
        self.stage
    }

    pub fn frame(&self) -> FrameInfo {
        self.frame
    }

    /// Default texture dimensions for this frame.
    pub fn default_size(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    /// A bound input, if any.
    pub fn input(&self, slot: &str) -> Option<&Resource> {
        self.inputs.get(slot).map(|r| r.as_ref())
    }

    /// A bound input as a shared handle, for forwarding without a copy.
    pub fn input_handle(&self, slot: &str) -> Option<Arc<Resource>> {
        self.inputs.get(slot).cloned()
    }

    /// A bound input that the pass cannot work without.
    pub fn require_input(&self, slot: &str) -> WeaveResult<&Resource> {
        self.input(slot)
            .ok_or_else(|| WeaveError::pass(format!("input '{}' is not bound", slot)))
    }

    /// Names of all bound input slots.
    pub fn bound_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(|k| k.as_str())
    }

    /// Produce an output resource.
    pub fn set_output(&mut self, slot: impl Into<String>, resource: Resource) {
        self.outputs.insert(slot.into(), Arc::new(resource));
    }

    /// Produce an output by sharing an existing handle.
    pub fn forward_output(&mut self, slot: impl Into<String>, resource: Arc<Resource>) {
        self.outputs.insert(slot.into(), resource);
    }

    /// Read from the graph's frame dictionary, including values this pass
    /// published earlier in the same step.
    pub fn dictionary_get(&self, key: &str) -> Option<&ConfigValue> {
        self.published
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .or_else(|| self.dictionary.get(key))
    }

    /// Boolean dictionary lookup; absent or non-bool entries read as false.
    pub fn dictionary_flag(&self, key: &str) -> bool {
        self.dictionary_get(key)
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false)
    }

    /// Write to the frame dictionary. Applied once the step returns.
    pub fn publish(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.published.push((key.into(), value.into()));
    }

    /// Consume the context, yielding produced outputs and dictionary writes.
    pub fn finish(self) -> (HashMap<String, Arc<Resource>>, Vec<(String, ConfigValue)>) {
        (self.outputs, self.published)
    }
}

/// An instantiated pass: pass type, resolved configuration, slot layout.
pub struct Stage {
    pass_type: String,
    config: ConfigRecord,
    reflection: PassReflection,
    pass: Box<dyn Pass>,
}

impl Stage {
    pub fn new(pass_type: impl Into<String>, config: ConfigRecord, pass: Box<dyn Pass>) -> Self {
        let reflection = pass.reflect();
        Self {
            pass_type: pass_type.into(),
            config,
            reflection,
            pass,
        }
    }

    pub fn pass_type(&self) -> &str {
        &self.pass_type
    }

    /// The configuration the stage was created with, defaults filled in.
    pub fn config(&self) -> &ConfigRecord {
        &self.config
    }

    pub fn reflection(&self) -> &PassReflection {
        &self.reflection
    }

    pub(crate) fn pass_mut(&mut self) -> &mut dyn Pass {
        self.pass.as_mut()
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("pass_type", &self.pass_type)
            .field("config", &self.config)
            .field("reflection", &self.reflection)
            .finish_non_exhaustive()
    }
}
