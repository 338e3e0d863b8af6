//! Small general-purpose color passes.

use weave_core::{
    ConfigRecord, ConfigSchema, OptionSpec, Resource, ResourceKind, Texture, WeaveResult,
};
use weave_graph::{Pass, PassContext, PassDescriptor, PassReflection, SlotDesc};

/// Fills a color texture with one value.
pub struct Constant {
    rgba: [f32; 4],
    size: Option<(u32, u32)>,
}

impl Constant {
    pub fn descriptor() -> PassDescriptor {
        PassDescriptor::new("Constant", "Fill a color texture with a constant value", |cfg| {
            Ok(Box::new(Constant::from_config(cfg)))
        })
        .with_schema(
            ConfigSchema::new()
                .option(OptionSpec::float("r", 0.0))
                .option(OptionSpec::float("g", 0.0))
                .option(OptionSpec::float("b", 0.0))
                .option(OptionSpec::float("a", 1.0))
                .option(
                    OptionSpec::int("width", 0)
                        .range(0.0, 16384.0)
                        .describe("0 uses the frame width"),
                )
                .option(
                    OptionSpec::int("height", 0)
                        .range(0.0, 16384.0)
                        .describe("0 uses the frame height"),
                ),
        )
    }

    fn from_config(cfg: &ConfigRecord) -> Self {
        let channel = |key: &str, default: f64| cfg.get_float(key).unwrap_or(default) as f32;
        let width = cfg.get_int("width").unwrap_or(0) as u32;
        let height = cfg.get_int("height").unwrap_or(0) as u32;
        Self {
            rgba: [
                channel("r", 0.0),
                channel("g", 0.0),
                channel("b", 0.0),
                channel("a", 1.0),
            ],
            size: (width > 0 && height > 0).then_some((width, height)),
        }
    }
}

impl Pass for Constant {
    fn reflect(&self) -> PassReflection {
        PassReflection::new().output(SlotDesc::new("out", ResourceKind::Color))
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let (w, h) = self.size.unwrap_or_else(|| ctx.default_size());
        ctx.set_output("out", Resource::color(Texture::solid(w, h, self.rgba)));
        Ok(())
    }
}

/// Multiplies the RGB channels by a factor.
pub struct Scale {
    factor: f32,
}

impl Scale {
    pub fn descriptor() -> PassDescriptor {
        PassDescriptor::new("Scale", "Multiply color channels by a factor", |cfg| {
            Ok(Box::new(Scale {
                factor: cfg.get_float("factor").unwrap_or(1.0) as f32,
            }))
        })
        .with_schema(ConfigSchema::new().option(OptionSpec::float("factor", 1.0)))
    }
}

impl Pass for Scale {
    fn reflect(&self) -> PassReflection {
        color_filter_reflection()
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let factor = self.factor;
        let out = map_rgb(&ctx.require_input("in")?.texture, |v| v * factor);
        ctx.set_output("out", Resource::color(out));
        Ok(())
    }
}

/// Adds an offset to the RGB channels.
pub struct Bias {
    offset: f32,
}

impl Bias {
    pub fn descriptor() -> PassDescriptor {
        PassDescriptor::new("Bias", "Add an offset to color channels", |cfg| {
            Ok(Box::new(Bias {
                offset: cfg.get_float("offset").unwrap_or(0.0) as f32,
            }))
        })
        .with_schema(ConfigSchema::new().option(OptionSpec::float("offset", 0.0)))
    }
}

impl Pass for Bias {
    fn reflect(&self) -> PassReflection {
        color_filter_reflection()
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let offset = self.offset;
        let out = map_rgb(&ctx.require_input("in")?.texture, |v| v + offset);
        ctx.set_output("out", Resource::color(out));
        Ok(())
    }
}

/// Copies `src` to `dst` without touching the data.
pub struct Blit;

impl Blit {
    pub fn descriptor() -> PassDescriptor {
        PassDescriptor::new("Blit", "Copy a color texture", |_| Ok(Box::new(Blit)))
    }
}

impl Pass for Blit {
    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(SlotDesc::new("src", ResourceKind::Color).describe("The source texture"))
            .output(SlotDesc::new("dst", ResourceKind::Color).describe("The destination texture"))
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let src = ctx
            .input_handle("src")
            .ok_or_else(|| weave_core::WeaveError::pass("input 'src' is not bound"))?;
        ctx.forward_output("dst", src);
        Ok(())
    }
}

fn color_filter_reflection() -> PassReflection {
    PassReflection::new()
        .input(SlotDesc::new("in", ResourceKind::Color))
        .output(SlotDesc::new("out", ResourceKind::Color))
}

/// Apply `f` to the color channels, leaving alpha alone.
pub(crate) fn map_rgb(texture: &Texture, f: impl Fn(f32) -> f32) -> Texture {
    let mut out = texture.clone();
    let cc = texture.format.channel_count();
    for (i, v) in out.data.iter_mut().enumerate() {
        if cc < 4 || i % 4 != 3 {
            *v = f(*v);
        }
    }
    out
}
