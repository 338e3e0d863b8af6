//! Render graph assembly.
//!
//! A [`RenderGraph`] owns its stages (in insertion order), the edges between
//! their slots and the list of marked outputs. Every mutating operation is
//! fail-fast: it either succeeds completely or returns an error and leaves
//! the graph exactly as it was.

use weave_core::{ResourceKind, WeaveError, WeaveResult};

use crate::pass::Stage;
use crate::schedule::Schedule;
use crate::slot::{PassReflection, SlotDirection, SlotRef};

/// A directed binding from an output slot to an input slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: SlotRef,
    pub to: SlotRef,
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

pub(crate) struct StageEntry {
    pub(crate) name: String,
    pub(crate) stage: Stage,
}

pub struct RenderGraph {
    name: String,
    stages: Vec<StageEntry>,
    edges: Vec<Edge>,
    outputs: Vec<SlotRef>,
    version: u64,
    compiled: Option<Schedule>,
}

impl RenderGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            edges: Vec::new(),
            outputs: Vec::new(),
            version: 0,
            compiled: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topology version; bumped by every successful stage or edge change.
    pub fn version(&self) -> u64 {
        self.version
    }

    // ── Assembly ─────────────────────────────────────────────────────

    /// Insert a stage under a unique name.
    pub fn add_stage(&mut self, stage: Stage, name: impl Into<String>) -> WeaveResult<()> {
        let name = name.into();
        if self.stage_index(&name).is_some() {
            return Err(WeaveError::DuplicateName(name));
        }
        tracing::debug!("Added stage '{}' ({})", name, stage.pass_type());
        self.stages.push(StageEntry { name, stage });
        self.touch();
        Ok(())
    }

    /// Connect `<stage>.<output>` to `<stage>.<input>`.
    pub fn add_edge(&mut self, src: &str, dst: &str) -> WeaveResult<()> {
        let from = SlotRef::parse(src)?;
        let to = SlotRef::parse(dst)?;
        let from_refl = self.reflection_of(&from.stage)?;
        let to_refl = self.reflection_of(&to.stage)?;
        check_edge(&from, from_refl, &to, to_refl)?;
        if self.incoming(&to).is_some() {
            return Err(WeaveError::SlotAlreadyBound(to.to_string()));
        }

        tracing::debug!("Added edge {} -> {}", from, to);
        self.edges.push(Edge { from, to });
        self.touch();
        Ok(())
    }

    /// Remove the edge `src -> dst`.
    pub fn remove_edge(&mut self, src: &str, dst: &str) -> WeaveResult<()> {
        let from = SlotRef::parse(src)?;
        let to = SlotRef::parse(dst)?;
        let pos = self
            .edges
            .iter()
            .position(|e| e.from == from && e.to == to)
            .ok_or_else(|| WeaveError::UnknownEdge {
                from: from.to_string(),
                to: to.to_string(),
            })?;
        self.edges.remove(pos);
        self.touch();
        Ok(())
    }

    /// Mark an output slot as a graph output. Marking twice is a no-op.
    pub fn mark_output(&mut self, path: &str) -> WeaveResult<()> {
        let slot = SlotRef::parse(path)?;
        let refl = self.reflection_of(&slot.stage)?;
        if refl.find(&slot.slot, SlotDirection::Output).is_none() {
            return Err(WeaveError::unknown_slot(&slot.stage, &slot.slot, "output"));
        }
        if !self.outputs.contains(&slot) {
            self.outputs.push(slot);
        }
        Ok(())
    }

    pub fn unmark_output(&mut self, path: &str) -> WeaveResult<()> {
        let slot = SlotRef::parse(path)?;
        let pos = self
            .outputs
            .iter()
            .position(|o| *o == slot)
            .ok_or_else(|| WeaveError::unknown_slot(&slot.stage, &slot.slot, "marked output"))?;
        self.outputs.remove(pos);
        Ok(())
    }

    /// Remove a stage together with its edges and output marks.
    pub fn remove_stage(&mut self, name: &str) -> WeaveResult<Stage> {
        let index = self
            .stage_index(name)
            .ok_or_else(|| WeaveError::UnknownStage(name.to_string()))?;
        self.edges
            .retain(|e| e.from.stage != name && e.to.stage != name);
        self.outputs.retain(|o| o.stage != name);
        let entry = self.stages.remove(index);
        self.touch();
        Ok(entry.stage)
    }

    /// Swap in a new instance for an existing stage, keeping its edges and marks.
    ///
    /// Fails if any existing edge or mark does not fit the new stage's slots.
    /// Returns the previous instance.
    pub fn replace_stage(&mut self, name: &str, stage: Stage) -> WeaveResult<Stage> {
        let index = self
            .stage_index(name)
            .ok_or_else(|| WeaveError::UnknownStage(name.to_string()))?;
        let new_refl = stage.reflection();

        for edge in self
            .edges
            .iter()
            .filter(|e| e.from.stage == name || e.to.stage == name)
        {
            let from_refl = if edge.from.stage == name {
                new_refl
            } else {
                self.reflection_of(&edge.from.stage)?
            };
            let to_refl = if edge.to.stage == name {
                new_refl
            } else {
                self.reflection_of(&edge.to.stage)?
            };
            check_edge(&edge.from, from_refl, &edge.to, to_refl)?;
        }
        for mark in self.outputs.iter().filter(|o| o.stage == name) {
            if new_refl.find(&mark.slot, SlotDirection::Output).is_none() {
                return Err(WeaveError::unknown_slot(name, &mark.slot, "output"));
            }
        }

        tracing::debug!("Replaced stage '{}' ({})", name, stage.pass_type());
        let old = std::mem::replace(&mut self.stages[index].stage, stage);
        self.touch();
        Ok(old)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stage_index(name).map(|i| &self.stages[i].stage)
    }

    /// Stages with their names, in insertion order.
    pub fn stages(&self) -> impl Iterator<Item = (&str, &Stage)> {
        self.stages.iter().map(|e| (e.name.as_str(), &e.stage))
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|e| e.name.as_str())
    }

    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|e| e.name == name)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Marked outputs, in marking order.
    pub fn outputs(&self) -> &[SlotRef] {
        &self.outputs
    }

    /// The edge feeding an input slot, if any.
    pub fn incoming(&self, input: &SlotRef) -> Option<&Edge> {
        self.edges.iter().find(|e| e.to == *input)
    }

    /// Edges leaving an output slot, in insertion order.
    pub fn outgoing<'a>(&'a self, output: &'a SlotRef) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == *output)
    }

    // ── Scheduling ───────────────────────────────────────────────────

    /// Derive an execution order without touching the cache.
    pub fn schedule(&self) -> WeaveResult<Schedule> {
        Schedule::build(self)
    }

    /// The cached schedule, rebuilt only when the topology version moved.
    pub fn compile(&mut self) -> WeaveResult<&Schedule> {
        let stale = self
            .compiled
            .as_ref()
            .map_or(true, |s| s.version() != self.version);
        if stale {
            let schedule = Schedule::build(self)?;
            tracing::debug!(
                "Scheduled graph '{}' v{}: {}",
                self.name,
                self.version,
                schedule.names().join(" -> ")
            );
            self.compiled = Some(schedule);
        }
        self.compiled
            .as_ref()
            .ok_or_else(|| WeaveError::pass("schedule cache is empty"))
    }

    pub(crate) fn entries(&self) -> &[StageEntry] {
        &self.stages
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [StageEntry] {
        &mut self.stages
    }

    #[cfg(test)]
    pub(crate) fn push_edge_unchecked(&mut self, from: SlotRef, to: SlotRef) {
        self.edges.push(Edge { from, to });
        self.touch();
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    fn reflection_of(&self, stage: &str) -> WeaveResult<&PassReflection> {
        self.stage(stage)
            .map(Stage::reflection)
            .ok_or_else(|| WeaveError::UnknownStage(stage.to_string()))
    }
}

impl std::fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraph")
            .field("name", &self.name)
            .field("stages", &self.stage_names().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("outputs", &self.outputs)
            .field("version", &self.version)
            .finish()
    }
}

fn slot_kind(
    refl: &PassReflection,
    slot: &SlotRef,
    direction: SlotDirection,
) -> WeaveResult<ResourceKind> {
    refl.find(&slot.slot, direction)
        .map(|s| s.kind)
        .ok_or_else(|| WeaveError::unknown_slot(&slot.stage, &slot.slot, direction.as_str()))
}

fn check_edge(
    from: &SlotRef,
    from_refl: &PassReflection,
    to: &SlotRef,
    to_refl: &PassReflection,
) -> WeaveResult<()> {
    let source_kind = slot_kind(from_refl, from, SlotDirection::Output)?;
    let dest_kind = slot_kind(to_refl, to, SlotDirection::Input)?;
    if !dest_kind.accepts(source_kind) {
        return Err(WeaveError::IncompatibleResourceKind {
            source_slot: from.to_string(),
            source_kind,
            dest_slot: to.to_string(),
            dest_kind,
        });
    }
    Ok(())
}
