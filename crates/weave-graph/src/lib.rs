//! # weave-graph
//!
//! Assembly and execution of render graphs: a registry of pass types, a
//! graph builder that validates every edge as it is added, a deterministic
//! scheduler, and a frame executor.

pub mod description;
pub mod executor;
pub mod graph;
pub mod pass;
pub mod registry;
pub mod schedule;
pub mod slot;
pub mod validate;

#[cfg(test)]
mod testing;

pub use description::{EdgeEntry, GraphDescription, PassEntry};
pub use executor::{Executor, ExternalInputs, FrameOutputs};
pub use graph::{Edge, RenderGraph};
pub use pass::{Pass, PassContext, Stage};
pub use registry::{PassDescriptor, PassRegistry};
pub use schedule::Schedule;
pub use slot::{PassReflection, SlotDesc, SlotDirection, SlotRef};
pub use validate::validate_graph;
