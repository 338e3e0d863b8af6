use weave_core::WeaveError;

use crate::executor::ExternalInputs;
use crate::graph::RenderGraph;
use crate::schedule::Schedule;
use crate::slot::SlotRef;

/// Validate a graph for execution, collecting every problem instead of
/// stopping at the first.
///
/// Reports scheduling failures (cycles, edges from missing producers) and
/// required inputs that have neither an edge nor an external resource.
pub fn validate_graph(
    graph: &RenderGraph,
    external: &ExternalInputs,
) -> Result<Schedule, Vec<WeaveError>> {
    let mut errors = Vec::new();

    let schedule = match graph.schedule() {
        Ok(schedule) => Some(schedule),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    for (name, stage) in graph.stages() {
        for slot in stage.reflection().inputs() {
            let slot_ref = SlotRef::new(name, &slot.name);
            if slot.optional || graph.incoming(&slot_ref).is_some() || external.contains(&slot_ref)
            {
                continue;
            }
            errors.push(WeaveError::MissingInput {
                stage: name.to_string(),
                slot: slot.name.clone(),
            });
        }
    }

    if graph.outputs().is_empty() {
        tracing::warn!("Graph '{}' has no marked outputs", graph.name());
    }

    match schedule {
        Some(schedule) if errors.is_empty() => Ok(schedule),
        _ => Err(errors),
    }
}
