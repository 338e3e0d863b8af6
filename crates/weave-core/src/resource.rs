use serde::{Deserialize, Serialize};

use crate::texture::Texture;

/// The kind of resource a slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Color buffer (radiance, albedo, material channels).
    Color,
    /// Depth buffer.
    Depth,
    /// Single-channel scalar buffer.
    Scalar,
    /// Per-pixel vectors (positions, normals, directions).
    Vector,
    /// Packed visibility / hit information.
    Visibility,
}

impl ResourceKind {
    /// Whether an input slot of this kind can be fed from an output of `source` kind.
    ///
    /// Identical kinds always connect. A scalar input also accepts depth.
    pub fn accepts(self, source: ResourceKind) -> bool {
        self == source || (self == ResourceKind::Scalar && source == ResourceKind::Depth)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Color => write!(f, "color"),
            ResourceKind::Depth => write!(f, "depth"),
            ResourceKind::Scalar => write!(f, "scalar"),
            ResourceKind::Vector => write!(f, "vector"),
            ResourceKind::Visibility => write!(f, "visibility"),
        }
    }
}

/// A resource produced by a stage during a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// What the texture holds.
    pub kind: ResourceKind,
    /// The backing texture.
    pub texture: Texture,
}

impl Resource {
    pub fn new(kind: ResourceKind, texture: Texture) -> Self {
        Self { kind, texture }
    }

    pub fn color(texture: Texture) -> Self {
        Self::new(ResourceKind::Color, texture)
    }

    pub fn width(&self) -> u32 {
        self.texture.width
    }

    pub fn height(&self) -> u32 {
        self.texture.height
    }
}
