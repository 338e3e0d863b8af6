//! # weave-passes
//!
//! The built-in pass library: a ray-traced G-buffer, a tiled path tracer,
//! temporal accumulation, tone mapping and a scripted interaction pass,
//! plus small utility passes. All of them render a fixed procedural scene
//! on the CPU.

pub mod math;
pub mod passes;
pub mod scene;

use weave_core::{RangePolicy, WeaveResult};
use weave_graph::PassRegistry;

pub use passes::{CHANGE_OCCURRED, POINT_OF_CHANGE};

/// Register every built-in pass type.
pub fn register_builtin(registry: &mut PassRegistry) -> WeaveResult<()> {
    registry.register(passes::gbuffer::descriptor())?;
    registry.register(passes::path_tracer::descriptor())?;
    registry.register(passes::accumulate::descriptor())?;
    registry.register(passes::tone_mapper::descriptor())?;
    registry.register(passes::interaction::descriptor())?;
    registry.register(passes::Constant::descriptor())?;
    registry.register(passes::Scale::descriptor())?;
    registry.register(passes::Bias::descriptor())?;
    registry.register(passes::Blit::descriptor())?;
    tracing::debug!("Registered {} built-in pass types", registry.len());
    Ok(())
}

/// A registry holding the built-in pass types.
pub fn builtin_registry(policy: RangePolicy) -> WeaveResult<PassRegistry> {
    let mut registry = PassRegistry::new().with_range_policy(policy);
    register_builtin(&mut registry)?;
    Ok(registry)
}
