use rayon::prelude::*;
use weave_core::{
    ConfigRecord, ConfigSchema, OptionSpec, Resource, ResourceKind, Texture, TextureFormat,
    WeaveError, WeaveResult,
};
use weave_graph::{Pass, PassContext, PassDescriptor, PassReflection, SlotDesc};

use crate::math::Vec3;
use crate::scene::{self, CullMode, Hit, Scene, FAR_PLANE};

/// Sub-pixel camera jitter sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePattern {
    Center,
    DirectX,
    Halton,
    Stratified,
}

const DIRECTX_8X: [(f32, f32); 8] = [
    (1.0, -3.0),
    (-1.0, 3.0),
    (5.0, 1.0),
    (-3.0, -5.0),
    (-5.0, 5.0),
    (-7.0, -1.0),
    (3.0, 7.0),
    (7.0, -7.0),
];

impl SamplePattern {
    fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "Center" => Some(SamplePattern::Center),
            "DirectX" => Some(SamplePattern::DirectX),
            "Halton" => Some(SamplePattern::Halton),
            "Stratified" => Some(SamplePattern::Stratified),
            _ => None,
        }
    }

    /// Offset inside the pixel, in `[0, 1)^2`, for the given frame.
    pub fn offset(self, frame: u64, sample_count: u32) -> (f32, f32) {
        let count = sample_count.max(1) as u64;
        let i = (frame % count) as u32;
        match self {
            SamplePattern::Center => (0.5, 0.5),
            SamplePattern::DirectX => {
                let (x, y) = DIRECTX_8X[(frame % 8) as usize];
                (0.5 + x / 16.0, 0.5 + y / 16.0)
            }
            SamplePattern::Halton => (radical_inverse(i + 1, 2), radical_inverse(i + 1, 3)),
            SamplePattern::Stratified => {
                let cols = (count as f32).sqrt().ceil() as u32;
                let rows = (count as u32).div_ceil(cols);
                (
                    ((i % cols) as f32 + 0.5) / cols as f32,
                    ((i / cols) as f32 + 0.5) / rows as f32,
                )
            }
        }
    }
}

fn radical_inverse(mut n: u32, base: u32) -> f32 {
    let mut inv = 1.0 / base as f32;
    let mut result = 0.0;
    while n > 0 {
        result += (n % base) as f32 * inv;
        n /= base;
        inv /= base as f32;
    }
    result
}

/// Ray-traced G-buffer over the procedural scene.
pub struct GBufferRt {
    scene: &'static Scene,
    pattern: SamplePattern,
    sample_count: u32,
    cull: CullMode,
    adjust_shading_normals: bool,
}

pub fn schema() -> ConfigSchema {
    ConfigSchema::new()
        .option(OptionSpec::symbol(
            "samplePattern",
            &["Center", "DirectX", "Halton", "Stratified"],
            "Center",
        ))
        .option(
            OptionSpec::int("sampleCount", 16)
                .range(1.0, 1024.0)
                .describe("Length of the jitter sequence"),
        )
        .option(OptionSpec::bool("disableAlphaTest", false))
        .option(OptionSpec::bool("adjustShadingNormals", true))
        .option(
            OptionSpec::bool("forceCullMode", false)
                .describe("Use 'cull' instead of the scene's back-face culling"),
        )
        .option(OptionSpec::symbol(
            "cull",
            &["None", "CullFront", "CullBack"],
            "CullBack",
        ))
        .option(OptionSpec::symbol(
            "texLOD",
            &["UseMip0", "RayCones", "RayDiffsIsotropic", "RayDiffsAnisotropic"],
            "UseMip0",
        ))
}

pub fn descriptor() -> PassDescriptor {
    PassDescriptor::new("GBufferRT", "Ray traced G-buffer generation pass", |cfg| {
        Ok(Box::new(GBufferRt::from_config(cfg)?))
    })
    .with_schema(schema())
    .on_load(|| {
        scene::shared();
        Ok(())
    })
}

impl GBufferRt {
    pub(crate) fn from_config(cfg: &ConfigRecord) -> WeaveResult<Self> {
        let pattern = cfg
            .get_symbol("samplePattern")
            .and_then(SamplePattern::parse)
            .ok_or_else(|| WeaveError::invalid_config("GBufferRT", "bad samplePattern"))?;
        let cull = if cfg.get_bool("forceCullMode").unwrap_or(false) {
            match cfg.get_symbol("cull") {
                Some("None") => CullMode::None,
                Some("CullFront") => CullMode::Front,
                _ => CullMode::Back,
            }
        } else {
            CullMode::Back
        };
        Ok(Self {
            scene: scene::shared(),
            pattern,
            sample_count: cfg.get_int("sampleCount").unwrap_or(16) as u32,
            cull,
            adjust_shading_normals: cfg.get_bool("adjustShadingNormals").unwrap_or(true),
        })
    }
}

struct Sample {
    view: Vec3,
    hit: Option<Hit>,
}

const VECTOR_OUTPUTS: [&str; 5] = ["posW", "normW", "tangentW", "faceNormalW", "viewW"];
const MATERIAL_OUTPUTS: [&str; 4] = ["diffuseOpacity", "specRough", "emissive", "matlExtra"];

impl Pass for GBufferRt {
    fn reflect(&self) -> PassReflection {
        let mut r = PassReflection::new()
            .output(
                SlotDesc::new("vbuffer", ResourceKind::Visibility)
                    .describe("Packed hit: instance id and distance"),
            )
            .output(SlotDesc::new("depth", ResourceKind::Depth).describe("Normalized hit distance"));
        for name in VECTOR_OUTPUTS {
            r = r.output(SlotDesc::new(name, ResourceKind::Vector));
        }
        for name in MATERIAL_OUTPUTS {
            r = r.output(SlotDesc::new(name, ResourceKind::Color));
        }
        r
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let (w, h) = ctx.default_size();
        let (jx, jy) = self.pattern.offset(ctx.frame().index, self.sample_count);
        let scene = self.scene;
        let cull = self.cull;

        let samples: Vec<Sample> = (0..h)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..w).map(move |x| {
                    let dir = scene.camera.ray_dir(x as f32 + jx, y as f32 + jy, w, h);
                    Sample {
                        view: -dir,
                        hit: scene.intersect(scene.camera.position, dir, cull),
                    }
                })
            })
            .collect();

        let rgba = || Texture::new(w, h, TextureFormat::Rgba32Float);
        let mut vbuffer = Texture::new(w, h, TextureFormat::Rg32Float);
        let mut depth = Texture::new(w, h, TextureFormat::R32Float);
        let mut vectors: Vec<Texture> = VECTOR_OUTPUTS.iter().map(|_| rgba()).collect();
        let mut materials: Vec<Texture> = MATERIAL_OUTPUTS.iter().map(|_| rgba()).collect();

        for (i, sample) in samples.iter().enumerate() {
            let (x, y) = ((i as u32) % w.max(1), (i as u32) / w.max(1));
            vectors[4].set_texel(x, y, sample.view.to_rgba(0.0));
            let Some(hit) = sample.hit else {
                depth.set_texel(x, y, [1.0; 4]);
                continue;
            };

            let mut normal = hit.normal;
            if self.adjust_shading_normals && normal.dot(sample.view) < 0.0 {
                normal = -normal;
            }
            let m = &hit.material;
            vbuffer.set_texel(x, y, [hit.instance as f32, hit.t, 0.0, 0.0]);
            depth.set_texel(x, y, [(hit.t / FAR_PLANE).min(1.0); 4]);
            vectors[0].set_texel(x, y, hit.position.to_rgba(1.0));
            vectors[1].set_texel(x, y, normal.to_rgba(0.0));
            vectors[2].set_texel(x, y, hit.tangent.to_rgba(1.0));
            vectors[3].set_texel(x, y, hit.face_normal.to_rgba(0.0));
            materials[0].set_texel(x, y, m.diffuse.to_rgba(m.opacity));
            materials[1].set_texel(x, y, m.specular.to_rgba(m.roughness));
            materials[2].set_texel(x, y, m.emissive.to_rgba(1.0));
            materials[3].set_texel(x, y, [m.ior, 0.0, 0.0, 1.0]);
        }

        ctx.set_output("vbuffer", Resource::new(ResourceKind::Visibility, vbuffer));
        ctx.set_output("depth", Resource::new(ResourceKind::Depth, depth));
        for (name, texture) in VECTOR_OUTPUTS.iter().zip(vectors) {
            ctx.set_output(*name, Resource::new(ResourceKind::Vector, texture));
        }
        for (name, texture) in MATERIAL_OUTPUTS.iter().zip(materials) {
            ctx.set_output(*name, Resource::color(texture));
        }
        Ok(())
    }
}
