use serde::{Deserialize, Serialize};

/// Channel layout of a texture. All channels are 32-bit floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    /// Four channels (RGBA).
    Rgba32Float,
    /// Two channels.
    Rg32Float,
    /// One channel.
    R32Float,
}

impl TextureFormat {
    /// Number of channels per texel.
    pub fn channel_count(&self) -> usize {
        match self {
            TextureFormat::Rgba32Float => 4,
            TextureFormat::Rg32Float => 2,
            TextureFormat::R32Float => 1,
        }
    }
}

/// A CPU-side float texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    /// Texel data, row-major, `channel_count` floats per texel.
    pub data: Vec<f32>,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Channel layout.
    pub format: TextureFormat,
}

impl Texture {
    /// Create a texture filled with zeros.
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        let size = (width as usize) * (height as usize) * format.channel_count();
        Self {
            data: vec![0.0; size],
            width,
            height,
            format,
        }
    }

    /// Create an RGBA texture where every texel has the same value.
    pub fn solid(width: u32, height: u32, rgba: [f32; 4]) -> Self {
        let texel_count = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(texel_count * 4);
        for _ in 0..texel_count {
            data.extend_from_slice(&rgba);
        }
        Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba32Float,
        }
    }

    /// Create a single-channel texture filled with `value`.
    pub fn scalar(width: u32, height: u32, value: f32) -> Self {
        let texel_count = (width as usize) * (height as usize);
        Self {
            data: vec![value; texel_count],
            width,
            height,
            format: TextureFormat::R32Float,
        }
    }

    /// Total number of texels.
    pub fn texel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Whether `other` has the same dimensions and format.
    pub fn same_shape(&self, other: &Texture) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }

    /// Read a texel widened to RGBA. Missing channels read as 0, missing alpha as 1.
    /// Returns None if out of bounds.
    pub fn get_texel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let cc = self.format.channel_count();
        let offset = ((y as usize) * (self.width as usize) + (x as usize)) * cc;
        let t = &self.data[offset..offset + cc];
        Some(match self.format {
            TextureFormat::Rgba32Float => [t[0], t[1], t[2], t[3]],
            TextureFormat::Rg32Float => [t[0], t[1], 0.0, 1.0],
            TextureFormat::R32Float => [t[0], 0.0, 0.0, 1.0],
        })
    }

    /// Write a texel, keeping only the channels the format stores. No-op if out of bounds.
    pub fn set_texel(&mut self, x: u32, y: u32, rgba: [f32; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let cc = self.format.channel_count();
        let offset = ((y as usize) * (self.width as usize) + (x as usize)) * cc;
        self.data[offset..offset + cc].copy_from_slice(&rgba[..cc]);
    }

    /// Apply `f` to every stored channel value.
    pub fn map_values(&self, f: impl Fn(f32) -> f32) -> Texture {
        Texture {
            data: self.data.iter().map(|v| f(*v)).collect(),
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }

    /// Mean of each RGBA channel over the whole texture.
    pub fn average(&self) -> [f32; 4] {
        let count = self.texel_count();
        if count == 0 {
            return [0.0; 4];
        }
        let mut sum = [0.0f64; 4];
        for y in 0..self.height {
            for x in 0..self.width {
                if let Some(t) = self.get_texel(x, y) {
                    for c in 0..4 {
                        sum[c] += t[c] as f64;
                    }
                }
            }
        }
        sum.map(|s| (s / count as f64) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_new() {
        let tex = Texture::new(16, 8, TextureFormat::Rgba32Float);
        assert_eq!(tex.texel_count(), 128);
        assert_eq!(tex.data.len(), 128 * 4);
    }

    #[test]
    fn test_solid_texel() {
        let tex = Texture::solid(2, 2, [0.5, 0.25, 1.0, 1.0]);
        assert_eq!(tex.get_texel(1, 1), Some([0.5, 0.25, 1.0, 1.0]));
    }

    #[test]
    fn test_scalar_widening() {
        let tex = Texture::scalar(2, 1, 3.0);
        assert_eq!(tex.get_texel(0, 0), Some([3.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_set_texel_respects_format() {
        let mut tex = Texture::new(2, 2, TextureFormat::Rg32Float);
        tex.set_texel(1, 0, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(tex.get_texel(1, 0), Some([1.0, 2.0, 0.0, 1.0]));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut tex = Texture::new(2, 2, TextureFormat::R32Float);
        assert_eq!(tex.get_texel(2, 0), None);
        tex.set_texel(0, 5, [1.0; 4]);
        assert!(tex.data.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_map_and_average() {
        let tex = Texture::solid(4, 4, [1.0, 2.0, 3.0, 1.0]).map_values(|v| v * 2.0);
        assert_eq!(tex.average(), [2.0, 4.0, 6.0, 2.0]);
    }
}
