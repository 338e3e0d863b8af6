//! # weave-core
//!
//! Core types for the Weave render graph runtime.
//! This crate contains foundational types shared across all Weave crates:
//! configuration values and schemas, resource kinds, float textures,
//! frame bookkeeping, content hashing, and error types.

pub mod config;
pub mod error;
pub mod frame;
pub mod hash;
pub mod resource;
pub mod schema;
pub mod texture;
pub mod value;

pub use config::*;

pub use error::{WeaveError, WeaveResult};
pub use frame::{FrameDictionary, FrameInfo};
pub use hash::ContentHash;
pub use resource::{Resource, ResourceKind};
pub use schema::{ConfigSchema, OptionKind, OptionSpec, RangePolicy, SchemaViolation};
pub use texture::{Texture, TextureFormat};
pub use value::{ConfigRecord, ConfigValue};
