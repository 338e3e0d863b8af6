//! Tiled CPU path tracer fed by a G-buffer.
//!
//! The frame is split into square tiles. Each frame the tracer serves a
//! fixed budget of work from a tile queue: in steady state every tile gets
//! `samplesPerPixel` paths per pixel. When an upstream pass reports a point
//! of interest through the frame dictionary, the queue switches to a spiral
//! around that point and the budget is spent on fewer tiles with many more
//! samples each. Pixels outside the served tiles keep their last value.

use std::collections::VecDeque;

use rayon::prelude::*;
use weave_core::{
    ConfigRecord, ConfigSchema, OptionSpec, Resource, ResourceKind, Texture, TextureFormat,
    WeaveError, WeaveResult,
};
use weave_graph::{Pass, PassContext, PassDescriptor, PassReflection, SlotDesc};

use super::{CHANGE_OCCURRED, POINT_OF_CHANGE};
use crate::math::{cosine_hemisphere, SampleRng, Vec3};
use crate::scene::{self, CullMode, Scene};

const STEADY_SAMPLES: u32 = 16;
const FOCUSED_SAMPLES: u32 = 512;
const RAY_OFFSET: f32 = 1e-3;

type Tile = (u32, u32);

/// Per-path parameters, read from the `mSharedParams` record.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTracerParams {
    pub samples_per_pixel: u32,
    pub light_samples_per_vertex: u32,
    pub max_bounces: u32,
    pub force_alpha_one: bool,
    pub use_nee: bool,
    pub use_russian_roulette: bool,
    pub probability_absorption: f32,
    pub clamp_samples: bool,
    pub clamp_threshold: f32,
    pub use_fixed_seed: bool,
    pub use_vbuffer: bool,
}

impl PathTracerParams {
    fn from_record(rec: &ConfigRecord) -> Self {
        let int = |key: &str, default: i64| rec.get_int(key).unwrap_or(default);
        let flag = |key: &str, default: i64| int(key, default) != 0;
        let float = |key: &str, default: f64| rec.get_float(key).unwrap_or(default) as f32;
        // Every surface is diffuse, so the non-specular limit is the one that binds.
        let max_bounces = int("maxBounces", 3).min(int("maxNonSpecularBounces", 3));
        Self {
            samples_per_pixel: int("samplesPerPixel", 1) as u32,
            light_samples_per_vertex: int("lightSamplesPerVertex", 1) as u32,
            max_bounces: max_bounces.max(0) as u32,
            force_alpha_one: flag("forceAlphaOne", 1),
            use_nee: flag("useNEE", 1),
            use_russian_roulette: flag("useRussianRoulette", 0),
            probability_absorption: float("probabilityAbsorption", 0.2),
            clamp_samples: flag("clampSamples", 0),
            clamp_threshold: float("clampThreshold", 10.0),
            use_fixed_seed: flag("useFixedSeed", 0),
            use_vbuffer: flag("useVBuffer", 0),
        }
    }
}

fn flag(name: &str, default: i64) -> OptionSpec {
    OptionSpec::int(name, default).range(0.0, 1.0)
}

fn shared_params_schema() -> ConfigSchema {
    ConfigSchema::new()
        .option(OptionSpec::int("samplesPerPixel", 1).range(1.0, 64.0))
        .option(OptionSpec::int("lightSamplesPerVertex", 1).range(1.0, 16.0))
        .option(OptionSpec::int("maxNonSpecularBounces", 3).range(0.0, 10.0))
        .option(OptionSpec::int("maxBounces", 3).range(0.0, 10.0))
        .option(flag("adjustShadingNormals", 0))
        .option(flag("useVBuffer", 0))
        .option(flag("forceAlphaOne", 1))
        .option(flag("useAlphaTest", 1))
        .option(flag("clampSamples", 0))
        .option(flag("useMIS", 1))
        .option(OptionSpec::float("clampThreshold", 10.0).min(0.0))
        .option(flag("useLightsInDielectricVolumes", 0))
        .option(OptionSpec::float("specularRoughnessThreshold", 0.25).range(0.0, 1.0))
        .option(flag("useBRDFSampling", 1))
        .option(flag("useNestedDielectrics", 1))
        .option(flag("useNEE", 1))
        .option(OptionSpec::int("misHeuristic", 1).range(0.0, 2.0))
        .option(OptionSpec::float("misPowerExponent", 2.0).min(0.0))
        .option(OptionSpec::float("probabilityAbsorption", 0.2).range(0.0, 1.0))
        .option(flag("useRussianRoulette", 0))
        .option(flag("useFixedSeed", 0))
        .option(flag("useLegacyBSDF", 0))
        .option(flag("disableCaustics", 0))
        .option(OptionSpec::int("rayFootprintMode", 0).range(0.0, 3.0))
        .option(OptionSpec::int("rayConeMode", 2).range(0.0, 2.0))
        .option(flag("rayFootprintUseRoughness", 0))
}

fn light_bvh_schema() -> ConfigSchema {
    let build = ConfigSchema::new()
        .option(OptionSpec::symbol(
            "splitHeuristicSelection",
            &["Equal", "BinnedSAH", "BinnedSAOH"],
            "BinnedSAOH",
        ))
        .option(OptionSpec::int("maxTriangleCountPerLeaf", 10).min(1.0))
        .option(OptionSpec::int("binCount", 16).min(2.0))
        .option(OptionSpec::float("volumeEpsilon", 0.001).min(0.0))
        .option(OptionSpec::bool("useLeafCreationCost", true))
        .option(OptionSpec::bool("createLeavesASAP", true))
        .option(OptionSpec::bool("useLightingCones", true))
        .option(OptionSpec::bool("splitAlongLargest", false))
        .option(OptionSpec::bool("useVolumeOverSA", false))
        .option(OptionSpec::bool("allowRefitting", true))
        .option(OptionSpec::bool("usePreintegration", true));
    ConfigSchema::new()
        .option(OptionSpec::bool("useBoundingCone", true))
        .option(OptionSpec::record("buildOptions", build))
        .option(OptionSpec::bool("useLightingCone", true))
        .option(OptionSpec::bool("disableNodeFlux", false))
        .option(OptionSpec::bool("useUniformTriangleSampling", true))
        .option(OptionSpec::symbol(
            "solidAngleBoundMethod",
            &["BoxToAverage", "BoxToCenter", "Sphere"],
            "Sphere",
        ))
}

pub fn schema() -> ConfigSchema {
    ConfigSchema::new()
        .option(OptionSpec::record("mSharedParams", shared_params_schema()))
        .option(OptionSpec::int("mSelectedSampleGenerator", 1).range(0.0, 3.0))
        .option(OptionSpec::symbol(
            "mSelectedEmissiveSampler",
            &["Uniform", "LightBVH", "Power"],
            "LightBVH",
        ))
        .option(OptionSpec::record("mUniformSamplerOptions", ConfigSchema::new()))
        .option(OptionSpec::record("mLightBVHSamplerOptions", light_bvh_schema()))
        .option(
            OptionSpec::int("tileSize", 16)
                .range(1.0, 256.0)
                .describe("Edge length of a scheduling tile in pixels"),
        )
}

pub fn descriptor() -> PassDescriptor {
    PassDescriptor::new("MegakernelPathTracer", "Megakernel path tracer", |cfg| {
        Ok(Box::new(MegakernelPathTracer::from_config(cfg)?))
    })
    .with_schema(schema())
    .on_load(|| {
        scene::shared();
        Ok(())
    })
}

/// Visit order of a `grid` of tiles, spiralling out from `center`.
///
/// Steps go right, down, left, up; the run length grows after every second
/// turn. Positions outside the grid are skipped, so every tile appears
/// exactly once.
pub fn spiral_order(center: Tile, grid: (u32, u32)) -> Vec<Tile> {
    let total = (grid.0 * grid.1) as usize;
    if total == 0 {
        return Vec::new();
    }
    let center = (center.0.min(grid.0 - 1), center.1.min(grid.1 - 1));
    let mut order = Vec::with_capacity(total);
    order.push(center);

    let (mut x, mut y) = (center.0 as i64, center.1 as i64);
    let mut steps = 1;
    let mut direction = 0;
    while order.len() < total {
        for _ in 0..steps {
            match direction {
                0 => x += 1,
                1 => y += 1,
                2 => x -= 1,
                _ => y -= 1,
            }
            if x >= 0 && y >= 0 && x < grid.0 as i64 && y < grid.1 as i64 {
                order.push((x as u32, y as u32));
            }
        }
        direction = (direction + 1) % 4;
        if direction % 2 == 0 {
            steps += 1;
        }
    }
    order
}

fn row_major_order(grid: (u32, u32)) -> Vec<Tile> {
    (0..grid.1)
        .flat_map(|y| (0..grid.0).map(move |x| (x, y)))
        .collect()
}

pub struct MegakernelPathTracer {
    scene: &'static Scene,
    params: PathTracerParams,
    tile_size: u32,
    grid: (u32, u32),
    base_queue: Vec<Tile>,
    spiral: Option<(Tile, Vec<Tile>)>,
    tile_queue: VecDeque<Tile>,
    color: Option<Texture>,
}

impl MegakernelPathTracer {
    fn from_config(cfg: &ConfigRecord) -> WeaveResult<Self> {
        let params = cfg
            .get_record("mSharedParams")
            .map(PathTracerParams::from_record)
            .ok_or_else(|| {
                WeaveError::invalid_config("MegakernelPathTracer", "missing mSharedParams")
            })?;
        tracing::debug!(
            emissive_sampler = cfg.get_symbol("mSelectedEmissiveSampler").unwrap_or("LightBVH"),
            "Path tracer configured: {:?}",
            params
        );
        Ok(Self {
            scene: scene::shared(),
            params,
            tile_size: cfg.get_int("tileSize").unwrap_or(16).max(1) as u32,
            grid: (0, 0),
            base_queue: Vec::new(),
            spiral: None,
            tile_queue: VecDeque::new(),
            color: None,
        })
    }

    /// Reset per-resolution state when the frame size changes.
    fn prepare_grid(&mut self, width: u32, height: u32) {
        let grid = (width.div_ceil(self.tile_size), height.div_ceil(self.tile_size));
        let stale = self
            .color
            .as_ref()
            .map_or(true, |c| c.width != width || c.height != height);
        if grid != self.grid || stale {
            self.grid = grid;
            self.base_queue = row_major_order(grid);
            self.spiral = None;
            self.tile_queue.clear();
            self.color = Some(Texture::new(width, height, TextureFormat::Rgba32Float));
        }
    }

    /// The tile containing the reported point of change, if a change is active.
    fn focus_tile(&self, ctx: &PassContext<'_>) -> Option<Tile> {
        if !ctx.dictionary_flag(CHANGE_OCCURRED) {
            return None;
        }
        let point = ctx.dictionary_get(POINT_OF_CHANGE)?.as_record()?;
        let x = point.get_int("x")?.max(0) as u32;
        let y = point.get_int("y")?.max(0) as u32;
        Some((x / self.tile_size, y / self.tile_size))
    }

    /// Pick the tiles served this frame and the sample multiplier for them.
    fn plan_tiles(&mut self, focus: Option<Tile>) -> (Vec<Tile>, u32) {
        let render_samples = match focus {
            Some(tile) => {
                let rebuilt = self.spiral.as_ref().map_or(true, |(c, _)| *c != tile);
                if rebuilt {
                    self.spiral = Some((tile, spiral_order(tile, self.grid)));
                    self.tile_queue.clear();
                }
                FOCUSED_SAMPLES
            }
            None => {
                if self.spiral.take().is_some() {
                    self.tile_queue.clear();
                }
                STEADY_SAMPLES
            }
        };

        let total = self.base_queue.len();
        let budget = (total * STEADY_SAMPLES as usize / render_samples as usize).clamp(1, total.max(1));
        let mut served = Vec::with_capacity(budget);
        while served.len() < budget && total > 0 {
            if self.tile_queue.is_empty() {
                let source = match &self.spiral {
                    Some((_, order)) => order,
                    None => &self.base_queue,
                };
                self.tile_queue.extend(source.iter().copied());
            }
            match self.tile_queue.pop_front() {
                Some(tile) => served.push(tile),
                None => break,
            }
        }
        (served, render_samples / STEADY_SAMPLES)
    }

    fn radiance(&self, surface: &Surface, x: u32, y: u32, seed: u32, samples: u32) -> Vec3 {
        if !surface.hit {
            return self.scene.sky(-surface.view);
        }
        let mut sum = Vec3::ZERO;
        for s in 0..samples {
            let mut rng = SampleRng::for_sample(x, y, seed, s);
            let mut l = surface.emissive + self.trace_path(surface, &mut rng);
            if self.params.clamp_samples {
                let lum = l.luminance();
                if lum > self.params.clamp_threshold {
                    l = l * (self.params.clamp_threshold / lum);
                }
            }
            sum = sum + l;
        }
        sum * (1.0 / samples.max(1) as f32)
    }

    /// Indirect and direct light leaving the primary hit toward the camera.
    fn trace_path(&self, surface: &Surface, rng: &mut SampleRng) -> Vec3 {
        let p = &self.params;
        let scene = self.scene;
        let mut throughput = surface.diffuse;
        let mut radiance = Vec3::ZERO;
        let mut position = surface.position;
        let mut normal = surface.normal;

        for bounce in 0..=p.max_bounces {
            let origin = position + normal * RAY_OFFSET;
            if p.use_nee {
                let cos = normal.dot(scene.sun_direction);
                if cos > 0.0 {
                    let mut visible = 0;
                    for _ in 0..p.light_samples_per_vertex {
                        if !scene.occluded(origin, scene.sun_direction) {
                            visible += 1;
                        }
                    }
                    let fraction = visible as f32 / p.light_samples_per_vertex.max(1) as f32;
                    radiance = radiance + throughput.mul_elem(scene.sun_radiance) * (cos * fraction);
                }
            }
            if bounce == p.max_bounces {
                break;
            }

            let dir = cosine_hemisphere(normal, rng);
            match scene.intersect(origin, dir, CullMode::None) {
                None => {
                    radiance = radiance + throughput.mul_elem(scene.sky(dir));
                    break;
                }
                Some(hit) => {
                    radiance = radiance + throughput.mul_elem(hit.material.emissive);
                    throughput = throughput.mul_elem(hit.material.diffuse);
                    position = hit.position;
                    normal = if hit.normal.dot(dir) > 0.0 { -hit.normal } else { hit.normal };
                }
            }

            if p.use_russian_roulette {
                if rng.next_f32() < p.probability_absorption {
                    break;
                }
                throughput = throughput * (1.0 / (1.0 - p.probability_absorption).max(1e-3));
            }
            if throughput.max_elem() <= 0.0 {
                break;
            }
        }
        radiance
    }
}

/// G-buffer data for one pixel.
struct Surface {
    hit: bool,
    position: Vec3,
    normal: Vec3,
    view: Vec3,
    diffuse: Vec3,
    opacity: f32,
    emissive: Vec3,
}

/// Borrowed G-buffer channels for one frame.
struct GBufferView<'a> {
    vbuffer: Option<&'a Texture>,
    position: &'a Texture,
    normal: &'a Texture,
    view: Option<&'a Texture>,
    diffuse: &'a Texture,
    emissive: &'a Texture,
}

impl GBufferView<'_> {
    fn surface(&self, scene: &Scene, x: u32, y: u32) -> Surface {
        let texel = |t: &Texture| t.get_texel(x, y).unwrap_or([0.0; 4]);
        let pos = texel(self.position);
        let hit = match self.vbuffer {
            Some(v) => texel(v)[0] > 0.0,
            None => pos[3] > 0.0,
        };
        let position = Vec3::from_slice(&pos);
        let view = match self.view {
            Some(v) => Vec3::from_slice(&texel(v)),
            None if hit => (scene.camera.position - position).normalize(),
            None => {
                let (w, h) = (self.position.width, self.position.height);
                -scene.camera.ray_dir(x as f32 + 0.5, y as f32 + 0.5, w, h)
            }
        };
        let diffuse = texel(self.diffuse);
        Surface {
            hit,
            position,
            normal: Vec3::from_slice(&texel(self.normal)).normalize(),
            view,
            diffuse: Vec3::from_slice(&diffuse),
            opacity: diffuse[3],
            emissive: Vec3::from_slice(&texel(self.emissive)),
        }
    }
}

fn sized_input<'a>(
    ctx: &'a PassContext<'_>,
    slot: &str,
    size: (u32, u32),
) -> WeaveResult<Option<&'a Texture>> {
    match ctx.input(slot) {
        None => Ok(None),
        Some(r) if (r.width(), r.height()) == size => Ok(Some(&r.texture)),
        Some(r) => Err(WeaveError::pass(format!(
            "input '{}' is {}x{}, expected {}x{}",
            slot,
            r.width(),
            r.height(),
            size.0,
            size.1
        ))),
    }
}

fn required_input<'a>(
    ctx: &'a PassContext<'_>,
    slot: &str,
    size: (u32, u32),
) -> WeaveResult<&'a Texture> {
    sized_input(ctx, slot, size)?
        .ok_or_else(|| WeaveError::pass(format!("input '{}' is not bound", slot)))
}

impl Pass for MegakernelPathTracer {
    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(SlotDesc::new("vbuffer", ResourceKind::Visibility).optional())
            .input(SlotDesc::new("posW", ResourceKind::Vector))
            .input(SlotDesc::new("normalW", ResourceKind::Vector))
            .input(SlotDesc::new("tangentW", ResourceKind::Vector).optional())
            .input(SlotDesc::new("faceNormalW", ResourceKind::Vector))
            .input(SlotDesc::new("viewW", ResourceKind::Vector).optional())
            .input(SlotDesc::new("mtlDiffOpacity", ResourceKind::Color))
            .input(SlotDesc::new("mtlSpecRough", ResourceKind::Color))
            .input(SlotDesc::new("mtlEmissive", ResourceKind::Color))
            .input(SlotDesc::new("mtlParams", ResourceKind::Color))
            .output(
                SlotDesc::new("color", ResourceKind::Color)
                    .optional()
                    .describe("Output color (sum of direct and indirect)"),
            )
            .output(
                SlotDesc::new("albedo", ResourceKind::Color)
                    .optional()
                    .describe("Surface albedo (base color) or background color"),
            )
            .output(
                SlotDesc::new("time", ResourceKind::Scalar)
                    .optional()
                    .describe("Per-pixel sample count this frame"),
            )
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let (w, h) = ctx.default_size();
        self.prepare_grid(w, h);
        let focus = self.focus_tile(ctx);
        let (tiles, multiplier) = self.plan_tiles(focus);
        let samples = self.params.samples_per_pixel * multiplier;
        let seed = if self.params.use_fixed_seed {
            0
        } else {
            ctx.frame().index as u32
        };

        let size = (w, h);
        let gbuffer = GBufferView {
            vbuffer: if self.params.use_vbuffer {
                sized_input(ctx, "vbuffer", size)?
            } else {
                None
            },
            position: required_input(ctx, "posW", size)?,
            normal: required_input(ctx, "normalW", size)?,
            view: sized_input(ctx, "viewW", size)?,
            diffuse: required_input(ctx, "mtlDiffOpacity", size)?,
            emissive: required_input(ctx, "mtlEmissive", size)?,
        };
        for slot in ["faceNormalW", "mtlSpecRough", "mtlParams"] {
            required_input(ctx, slot, size)?;
        }

        let tile = self.tile_size;
        let this = &*self;
        let shaded: Vec<(u32, u32, [f32; 4])> = tiles
            .par_iter()
            .flat_map_iter(|&(tx, ty)| {
                let xs = tx * tile..((tx + 1) * tile).min(w);
                (ty * tile..((ty + 1) * tile).min(h))
                    .flat_map(move |y| xs.clone().map(move |x| (x, y)))
            })
            .map(|(x, y)| {
                let surface = gbuffer.surface(this.scene, x, y);
                let alpha = if this.params.force_alpha_one || !surface.hit {
                    1.0
                } else {
                    surface.opacity
                };
                let l = this.radiance(&surface, x, y, seed, samples);
                (x, y, l.to_rgba(alpha))
            })
            .collect();

        let mut albedo = Texture::new(w, h, TextureFormat::Rgba32Float);
        for y in 0..h {
            for x in 0..w {
                let s = gbuffer.surface(self.scene, x, y);
                let base = if s.hit { s.diffuse } else { self.scene.sky(-s.view) };
                albedo.set_texel(x, y, base.to_rgba(1.0));
            }
        }

        let mut time = Texture::new(w, h, TextureFormat::R32Float);
        let color = self
            .color
            .get_or_insert_with(|| Texture::new(w, h, TextureFormat::Rgba32Float));
        for &(x, y, rgba) in &shaded {
            color.set_texel(x, y, rgba);
            time.set_texel(x, y, [samples as f32; 4]);
        }

        tracing::debug!(
            stage = ctx.stage(),
            tiles = tiles.len(),
            samples,
            focused = focus.is_some(),
            "Path traced frame {}",
            ctx.frame().index
        );

        let color = color.clone();
        ctx.set_output("color", Resource::color(color));
        ctx.set_output("albedo", Resource::color(albedo));
        ctx.set_output("time", Resource::new(ResourceKind::Scalar, time));
        Ok(())
    }
}
