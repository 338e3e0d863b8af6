//! Built-in pass types.

pub mod accumulate;
pub mod gbuffer;
pub mod interaction;
pub mod path_tracer;
pub mod tone_mapper;
pub mod utility;

pub use accumulate::AccumulatePass;
pub use gbuffer::{GBufferRt, SamplePattern};
pub use interaction::InteractionPass;
pub use path_tracer::{MegakernelPathTracer, PathTracerParams};
pub use tone_mapper::{ToneMapOp, ToneMapper};
pub use utility::{Bias, Blit, Constant, Scale};

/// Frame dictionary key: pixel `{x, y}` record where the user's attention is.
pub const POINT_OF_CHANGE: &str = "point_of_change";
/// Frame dictionary key: whether a point of change is currently active.
pub const CHANGE_OCCURRED: &str = "change_occurred";
