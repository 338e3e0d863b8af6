use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use weave_core::hash::hash_textures;
use weave_core::{
    ConfigValue, ContentHash, ExecutionMode, FrameDictionary, FrameInfo, Resource, WeaveConfig,
    WeaveError, WeaveResult,
};

use crate::graph::{RenderGraph, StageEntry};
use crate::pass::PassContext;
use crate::slot::{PassReflection, SlotRef};

type SlotMap = HashMap<String, Arc<Resource>>;

/// Resources injected from outside the graph, keyed by `<stage>.<slot>`.
///
/// Used for inputs that no edge feeds.
#[derive(Debug, Clone, Default)]
pub struct ExternalInputs {
    resources: BTreeMap<SlotRef, Arc<Resource>>,
}

impl ExternalInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, resource: Resource) -> WeaveResult<()> {
        self.insert_shared(path, Arc::new(resource))
    }

    pub fn insert_shared(&mut self, path: &str, resource: Arc<Resource>) -> WeaveResult<()> {
        self.resources.insert(SlotRef::parse(path)?, resource);
        Ok(())
    }

    pub fn get(&self, slot: &SlotRef) -> Option<&Arc<Resource>> {
        self.resources.get(slot)
    }

    pub fn contains(&self, slot: &SlotRef) -> bool {
        self.resources.contains_key(slot)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// The marked outputs of one executed frame, in marking order.
#[derive(Debug, Clone)]
pub struct FrameOutputs {
    pub frame: FrameInfo,
    outputs: Vec<(SlotRef, Arc<Resource>)>,
}

impl FrameOutputs {
    /// Look up an output by `<stage>.<slot>`.
    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.outputs
            .iter()
            .find(|(slot, _)| slot.to_string() == path)
            .map(|(_, r)| r.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotRef, &Resource)> {
        self.outputs.iter().map(|(s, r)| (s, r.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// SHA-256 over every output's name, dimensions and texels.
    ///
    /// Two runs of the same graph with the same configuration produce the
    /// same digest.
    pub fn digest(&self) -> ContentHash {
        let names: Vec<String> = self.outputs.iter().map(|(s, _)| s.to_string()).collect();
        hash_textures(
            names
                .iter()
                .zip(&self.outputs)
                .map(|(name, (_, res))| (name.as_str(), &res.texture)),
        )
    }
}

/// Runs a compiled graph frame by frame.
///
/// The executor owns everything that persists between frames but is not
/// pass state: the frame counter and the frame dictionary.
pub struct Executor {
    width: u32,
    height: u32,
    mode: ExecutionMode,
    frame_index: u64,
    dictionary: FrameDictionary,
}

impl Executor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: ExecutionMode::Sequential,
            frame_index: 0,
            dictionary: FrameDictionary::new(),
        }
    }

    pub fn from_config(config: &WeaveConfig) -> Self {
        Self::new(config.frame.width, config.frame.height).with_mode(config.execution.mode)
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Index the next frame will run with.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn dictionary(&self) -> &FrameDictionary {
        &self.dictionary
    }

    pub fn dictionary_mut(&mut self) -> &mut FrameDictionary {
        &mut self.dictionary
    }

    /// Execute every stage once, in schedule order, and collect the marked outputs.
    ///
    /// A failing stage aborts the frame; the frame counter only advances on success.
    pub fn execute_frame(
        &mut self,
        graph: &mut RenderGraph,
        external: &ExternalInputs,
    ) -> WeaveResult<FrameOutputs> {
        let schedule = graph.compile()?.clone();
        let frame = FrameInfo::new(self.frame_index, self.width, self.height);
        let mut produced: HashMap<SlotRef, Arc<Resource>> = HashMap::new();

        let batches: Vec<Vec<usize>> = match self.mode {
            ExecutionMode::Sequential => schedule.order().iter().map(|&i| vec![i]).collect(),
            ExecutionMode::Parallel => schedule
                .levels()
                .iter()
                .flat_map(|level| concurrent_batches(graph, level))
                .collect(),
        };

        for batch in batches {
            if let [index] = *batch.as_slice() {
                let inputs = gather_inputs(graph, index, &produced, external)?;
                let entry = &mut graph.entries_mut()[index];
                let (outputs, published) = run_stage(entry, frame, &inputs, &self.dictionary)?;
                record(&mut produced, &entry.name, outputs);
                apply(&mut self.dictionary, published);
                continue;
            }

            // Stages ahead of an unbindable one still run, as they would in order.
            let mut bound = HashMap::with_capacity(batch.len());
            let mut unbound = None;
            for (position, &index) in batch.iter().enumerate() {
                match gather_inputs(graph, index, &produced, external) {
                    Ok(inputs) => {
                        bound.insert(index, (position, inputs));
                    }
                    Err(e) => {
                        unbound = Some(e);
                        break;
                    }
                }
            }
            for (name, result) in run_concurrent(graph, bound, frame, &self.dictionary) {
                let (outputs, published) = result?;
                record(&mut produced, &name, outputs);
                apply(&mut self.dictionary, published);
            }
            if let Some(e) = unbound {
                return Err(e);
            }
        }

        let mut outputs = Vec::with_capacity(graph.outputs().len());
        for slot in graph.outputs() {
            match produced.get(slot) {
                Some(resource) => outputs.push((slot.clone(), resource.clone())),
                None => tracing::debug!("Marked output {} was not produced", slot),
            }
        }

        tracing::debug!(
            "Frame {} of '{}' done: {} stages, {} outputs",
            frame.index,
            graph.name(),
            schedule.len(),
            outputs.len()
        );
        self.frame_index += 1;
        Ok(FrameOutputs { frame, outputs })
    }

    /// Execute `frames` consecutive frames.
    pub fn run(
        &mut self,
        graph: &mut RenderGraph,
        external: &ExternalInputs,
        frames: u64,
    ) -> WeaveResult<Vec<FrameOutputs>> {
        let start = std::time::Instant::now();
        let mut results = Vec::with_capacity(frames as usize);
        for _ in 0..frames {
            results.push(self.execute_frame(graph, external)?);
        }
        tracing::info!(
            "Executed {} frame(s) of '{}' at {}x{} in {:.2?}",
            frames,
            graph.name(),
            self.width,
            self.height,
            start.elapsed()
        );
        Ok(results)
    }
}

type StepOutput = (SlotMap, Vec<(String, ConfigValue)>);

/// Split one dependency level into runs of stages that may execute side by side.
///
/// Stages of a level never feed each other, but they can talk through the
/// frame dictionary. A publishing stage therefore runs alone: stages before
/// it in schedule order do not see its writes, stages after it do, exactly
/// as in sequential mode.
fn concurrent_batches(graph: &RenderGraph, level: &[usize]) -> Vec<Vec<usize>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    for &index in level {
        if graph.entries()[index].stage.reflection().publishes() {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            batches.push(vec![index]);
        } else {
            current.push(index);
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Run a batch of independent stages on the rayon pool.
///
/// `bound` maps stage index to (position in schedule order, inputs). Results
/// come back in schedule order and stop at the first failure. Once a stage
/// fails, stages after it that have not started yet are skipped; a later
/// stage that was already running finishes its step, but its outputs and
/// dictionary writes are dropped with the rest of the frame.
fn run_concurrent(
    graph: &mut RenderGraph,
    mut bound: HashMap<usize, (usize, SlotMap)>,
    frame: FrameInfo,
    dictionary: &FrameDictionary,
) -> Vec<(String, WeaveResult<StepOutput>)> {
    let mut jobs: Vec<(usize, &mut StageEntry, SlotMap)> = graph
        .entries_mut()
        .iter_mut()
        .enumerate()
        .filter_map(|(i, entry)| {
            bound
                .remove(&i)
                .map(|(position, inputs)| (position, entry, inputs))
        })
        .collect();
    jobs.sort_by_key(|(position, _, _)| *position);

    let first_failure = AtomicUsize::new(usize::MAX);
    let results: Vec<(usize, String, Option<WeaveResult<StepOutput>>)> = jobs
        .into_par_iter()
        .map(|(position, entry, inputs)| {
            if first_failure.load(Ordering::Acquire) < position {
                return (position, entry.name.clone(), None);
            }
            let result = run_stage(entry, frame, &inputs, dictionary);
            if result.is_err() {
                first_failure.fetch_min(position, Ordering::AcqRel);
            }
            (position, entry.name.clone(), Some(result))
        })
        .collect();

    let mut ordered = Vec::with_capacity(results.len());
    for (_, name, result) in results {
        match result {
            Some(Err(e)) => {
                ordered.push((name, Err(e)));
                break;
            }
            Some(ok) => ordered.push((name, ok)),
            None => break,
        }
    }
    ordered
}

fn gather_inputs(
    graph: &RenderGraph,
    index: usize,
    produced: &HashMap<SlotRef, Arc<Resource>>,
    external: &ExternalInputs,
) -> WeaveResult<SlotMap> {
    let entry = &graph.entries()[index];
    let mut inputs = SlotMap::new();

    for slot in entry.stage.reflection().inputs() {
        let slot_ref = SlotRef::new(&entry.name, &slot.name);
        let from_edge = graph
            .incoming(&slot_ref)
            .and_then(|edge| produced.get(&edge.from));

        let resource = match from_edge.or_else(|| external.get(&slot_ref)) {
            Some(resource) => resource,
            None if slot.optional => continue,
            None => {
                return Err(WeaveError::MissingInput {
                    stage: entry.name.clone(),
                    slot: slot.name.clone(),
                })
            }
        };
        if !slot.kind.accepts(resource.kind) {
            return Err(WeaveError::IncompatibleResourceKind {
                source_slot: graph
                    .incoming(&slot_ref)
                    .map(|e| e.from.to_string())
                    .unwrap_or_else(|| "external".to_string()),
                source_kind: resource.kind,
                dest_slot: slot_ref.to_string(),
                dest_kind: slot.kind,
            });
        }
        inputs.insert(slot.name.clone(), resource.clone());
    }
    Ok(inputs)
}

fn run_stage(
    entry: &mut StageEntry,
    frame: FrameInfo,
    inputs: &SlotMap,
    dictionary: &FrameDictionary,
) -> WeaveResult<StepOutput> {
    let span = tracing::debug_span!("stage", name = %entry.name);
    let _guard = span.enter();

    let mut ctx = PassContext::new(&entry.name, frame, inputs, dictionary);
    let result = entry.stage.pass_mut().execute(&mut ctx);
    let (outputs, published) = ctx.finish();

    result
        .and_then(|_| check_outputs(entry.stage.reflection(), &outputs))
        .and_then(|_| check_published(entry.stage.reflection(), &published))
        .map_err(|source| {
            let mut bound_inputs: Vec<String> = inputs.keys().cloned().collect();
            bound_inputs.sort();
            WeaveError::StageFailed {
                stage: entry.name.clone(),
                bound_inputs,
                source: Box::new(source),
            }
        })?;
    Ok((outputs, published))
}

fn check_outputs(reflection: &PassReflection, outputs: &SlotMap) -> WeaveResult<()> {
    for (name, resource) in outputs {
        let declared = reflection
            .outputs()
            .iter()
            .find(|s| s.name == *name)
            .ok_or_else(|| WeaveError::pass(format!("produced undeclared output '{}'", name)))?;
        if declared.kind != resource.kind {
            return Err(WeaveError::pass(format!(
                "output '{}' is declared {} but a {} resource was produced",
                name, declared.kind, resource.kind
            )));
        }
    }
    for slot in reflection.outputs().iter().filter(|s| !s.optional) {
        if !outputs.contains_key(&slot.name) {
            return Err(WeaveError::pass(format!(
                "required output '{}' was not produced",
                slot.name
            )));
        }
    }
    Ok(())
}

fn check_published(
    reflection: &PassReflection,
    published: &[(String, ConfigValue)],
) -> WeaveResult<()> {
    match published.first() {
        Some((key, _)) if !reflection.publishes() => Err(WeaveError::pass(format!(
            "wrote '{}' to the frame dictionary without declaring it",
            key
        ))),
        _ => Ok(()),
    }
}

fn record(produced: &mut HashMap<SlotRef, Arc<Resource>>, stage: &str, outputs: SlotMap) {
    for (slot, resource) in outputs {
        produced.insert(SlotRef::new(stage, slot), resource);
    }
}

fn apply(dictionary: &mut FrameDictionary, published: Vec<(String, ConfigValue)>) {
    for (key, value) in published {
        dictionary.insert(key, value);
    }
}
