use std::collections::HashMap;
use std::sync::OnceLock;

use weave_core::{ConfigRecord, ConfigSchema, RangePolicy, WeaveError, WeaveResult};

use crate::pass::{Pass, Stage};
use crate::slot::PassReflection;

type Factory = Box<dyn Fn(&ConfigRecord) -> WeaveResult<Box<dyn Pass>> + Send + Sync>;
type LoadHook = Box<dyn Fn() -> WeaveResult<()> + Send + Sync>;

/// Everything the registry knows about one pass type.
pub struct PassDescriptor {
    name: String,
    description: String,
    schema: ConfigSchema,
    factory: Factory,
    load: Option<LoadHook>,
}

impl PassDescriptor {
    /// A descriptor with an empty option schema.
    ///
    /// The factory receives the resolved configuration record (every declared
    /// option present, defaults filled in).
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConfigRecord) -> WeaveResult<Box<dyn Pass>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: ConfigSchema::new(),
            factory: Box::new(factory),
            load: None,
        }
    }

    pub fn with_schema(mut self, schema: ConfigSchema) -> Self {
        self.schema = schema;
        self
    }

    /// One-time capability acquisition, run before the first instance is created.
    pub fn on_load<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> WeaveResult<()> + Send + Sync + 'static,
    {
        self.load = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &ConfigSchema {
        &self.schema
    }
}

impl std::fmt::Debug for PassDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("options", &self.schema.options().len())
            .finish_non_exhaustive()
    }
}

struct Entry {
    descriptor: PassDescriptor,
    loaded: OnceLock<Result<(), String>>,
}

/// Catalog of available pass types.
///
/// Registration is static: callers register descriptors up front (see
/// `weave_passes::register_builtin`) and then create stages by type name.
pub struct PassRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    range_policy: RangePolicy,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            range_policy: RangePolicy::default(),
        }
    }

    pub fn with_range_policy(mut self, policy: RangePolicy) -> Self {
        self.range_policy = policy;
        self
    }

    pub fn set_range_policy(&mut self, policy: RangePolicy) {
        self.range_policy = policy;
    }

    pub fn range_policy(&self) -> RangePolicy {
        self.range_policy
    }

    /// Register a pass type. Fails if the name is taken or a schema default
    /// does not satisfy its own option declaration.
    pub fn register(&mut self, descriptor: PassDescriptor) -> WeaveResult<()> {
        if self.index.contains_key(descriptor.name()) {
            return Err(WeaveError::DuplicatePassType(descriptor.name));
        }
        descriptor
            .schema
            .check_defaults()
            .map_err(|v| WeaveError::invalid_config(&descriptor.name, format!("default {}", v)))?;

        tracing::debug!(
            "Registered pass type '{}' ({} options)",
            descriptor.name,
            descriptor.schema.options().len()
        );
        self.index
            .insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Entry {
            descriptor,
            loaded: OnceLock::new(),
        });
        Ok(())
    }

    pub fn contains(&self, pass_type: &str) -> bool {
        self.index.contains_key(pass_type)
    }

    pub fn get(&self, pass_type: &str) -> Option<&PassDescriptor> {
        self.entry(pass_type).map(|e| &e.descriptor)
    }

    /// Registered descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &PassDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the type's load hook has already run (successfully or not).
    pub fn is_loaded(&self, pass_type: &str) -> bool {
        self.entry(pass_type)
            .map(|e| e.loaded.get().is_some())
            .unwrap_or(false)
    }

    /// Instantiate a stage of `pass_type` from a configuration record.
    pub fn create(&self, pass_type: &str, record: &ConfigRecord) -> WeaveResult<Stage> {
        let entry = self
            .entry(pass_type)
            .ok_or_else(|| WeaveError::UnknownPassType(pass_type.to_string()))?;
        self.ensure_loaded(entry)?;

        let descriptor = &entry.descriptor;
        let mut clamped = Vec::new();
        let resolved = descriptor
            .schema
            .resolve(record, self.range_policy, &mut clamped)
            .map_err(|v| WeaveError::invalid_config(pass_type, v.to_string()))?;
        for violation in &clamped {
            tracing::warn!("{}: {}, clamped into range", pass_type, violation);
        }

        let pass = (descriptor.factory)(&resolved).map_err(|e| match e {
            WeaveError::InvalidConfiguration { .. } => e,
            other => WeaveError::invalid_config(pass_type, other.to_string()),
        })?;
        Ok(Stage::new(pass_type, resolved, pass))
    }

    /// Slot layout of a type, taken from an instance with default options.
    pub fn reflect(&self, pass_type: &str) -> WeaveResult<PassReflection> {
        Ok(self
            .create(pass_type, &ConfigRecord::new())?
            .reflection()
            .clone())
    }

    fn entry(&self, pass_type: &str) -> Option<&Entry> {
        self.index.get(pass_type).map(|&i| &self.entries[i])
    }

    fn ensure_loaded(&self, entry: &Entry) -> WeaveResult<()> {
        let name = &entry.descriptor.name;
        let outcome = entry.loaded.get_or_init(|| match &entry.descriptor.load {
            Some(hook) => {
                tracing::debug!("Loading pass type '{}'", name);
                hook().map_err(|e| e.to_string())
            }
            None => Ok(()),
        });
        outcome
            .clone()
            .map_err(|message| WeaveError::invalid_config(name, format!("load failed: {}", message)))
    }
}

impl Default for PassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
