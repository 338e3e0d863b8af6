//! PNG dumps of frame outputs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba};
use weave_core::{Texture, TextureFormat};

fn encode_srgb(linear: f32) -> u8 {
    let v = linear.clamp(0.0, 1.0);
    let s = if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (s * 255.0).round() as u8
}

/// Convert a float texture into 8-bit sRGB RGBA.
///
/// One-channel textures become grey; two-channel textures fill red and green.
pub fn to_rgba8(texture: &Texture) -> Vec<u8> {
    let cc = texture.format.channel_count();
    let mut out = Vec::with_capacity(texture.texel_count() * 4);
    for texel in texture.data.chunks(cc) {
        let rgba = match texture.format {
            TextureFormat::Rgba32Float => [texel[0], texel[1], texel[2], texel[3]],
            TextureFormat::Rg32Float => [texel[0], texel[1], 0.0, 1.0],
            TextureFormat::R32Float => [texel[0], texel[0], texel[0], 1.0],
        };
        out.extend_from_slice(&[
            encode_srgb(rgba[0]),
            encode_srgb(rgba[1]),
            encode_srgb(rgba[2]),
            (rgba[3].clamp(0.0, 1.0) * 255.0).round() as u8,
        ]);
    }
    out
}

/// File name for one output of one frame, e.g. `InteractionPass_dst_0003.png`.
pub fn frame_path(dir: &Path, slot: &str, frame: u64) -> PathBuf {
    dir.join(format!("{}_{:04}.png", slot.replace('.', "_"), frame))
}

pub fn save_png(texture: &Texture, path: &Path) -> Result<()> {
    let img = ImageBuffer::<Rgba<u8>, _>::from_raw(texture.width, texture.height, to_rgba8(texture))
        .ok_or_else(|| anyhow::anyhow!("Failed to convert texture to image buffer (size mismatch)"))?;
    img.save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
