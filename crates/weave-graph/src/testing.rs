//! Small scalar passes shared by the unit tests of this crate.

use weave_core::{
    ConfigRecord, ConfigSchema, OptionSpec, Resource, ResourceKind, Texture, WeaveResult,
};

use crate::pass::{Pass, PassContext, Stage};
use crate::registry::{PassDescriptor, PassRegistry};
use crate::slot::{PassReflection, SlotDesc};

fn value_of(res: &Resource) -> f32 {
    res.texture.data[0]
}

/// Emits a 1x1 scalar texture holding `value`.
pub struct ValueSource {
    value: f32,
}

impl Pass for ValueSource {
    fn reflect(&self) -> PassReflection {
        PassReflection::new().output(SlotDesc::new("out", ResourceKind::Scalar))
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        ctx.set_output(
            "out",
            Resource::new(ResourceKind::Scalar, Texture::scalar(1, 1, self.value)),
        );
        Ok(())
    }
}

/// out = in * scale + bias
pub struct Affine {
    scale: f32,
    bias: f32,
}

impl Pass for Affine {
    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(SlotDesc::new("in", ResourceKind::Scalar))
            .output(SlotDesc::new("out", ResourceKind::Scalar))
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let v = value_of(ctx.require_input("in")?);
        ctx.set_output(
            "out",
            Resource::new(
                ResourceKind::Scalar,
                Texture::scalar(1, 1, v * self.scale + self.bias),
            ),
        );
        Ok(())
    }
}

/// out = a + b, where b is optional.
pub struct Sum;

impl Pass for Sum {
    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(SlotDesc::new("a", ResourceKind::Scalar))
            .input(SlotDesc::new("b", ResourceKind::Scalar).optional())
            .output(SlotDesc::new("out", ResourceKind::Scalar))
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let a = value_of(ctx.require_input("a")?);
        let b = ctx.input("b").map(value_of).unwrap_or(0.0);
        ctx.set_output(
            "out",
            Resource::new(ResourceKind::Scalar, Texture::scalar(1, 1, a + b)),
        );
        Ok(())
    }
}

/// Produces a color output, for kind-mismatch tests.
pub struct ColorSource;

impl Pass for ColorSource {
    fn reflect(&self) -> PassReflection {
        PassReflection::new().output(SlotDesc::new("color", ResourceKind::Color))
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        ctx.set_output("color", Resource::color(Texture::solid(1, 1, [1.0; 4])));
        Ok(())
    }
}

pub fn registry() -> PassRegistry {
    let mut registry = PassRegistry::new();
    registry
        .register(
            PassDescriptor::new("Value", "constant scalar", |cfg| {
                Ok(Box::new(ValueSource {
                    value: cfg.get_float("value").unwrap_or(0.0) as f32,
                }))
            })
            .with_schema(ConfigSchema::new().option(OptionSpec::float("value", 0.0))),
        )
        .expect("register Value");
    registry
        .register(
            PassDescriptor::new("Affine", "scale and bias", |cfg| {
                Ok(Box::new(Affine {
                    scale: cfg.get_float("scale").unwrap_or(1.0) as f32,
                    bias: cfg.get_float("bias").unwrap_or(0.0) as f32,
                }))
            })
            .with_schema(
                ConfigSchema::new()
                    .option(OptionSpec::float("scale", 1.0).range(-100.0, 100.0))
                    .option(OptionSpec::float("bias", 0.0)),
            ),
        )
        .expect("register Affine");
    registry
        .register(PassDescriptor::new("Sum", "a + b", |_| Ok(Box::new(Sum))))
        .expect("register Sum");
    registry
        .register(PassDescriptor::new("ColorSource", "color", |_| {
            Ok(Box::new(ColorSource))
        }))
        .expect("register ColorSource");
    registry
}

pub fn value(v: f32) -> Stage {
    registry()
        .create("Value", &ConfigRecord::new().with("value", v as f64))
        .expect("create Value")
}

pub fn affine(scale: f64, bias: f64) -> Stage {
    registry()
        .create(
            "Affine",
            &ConfigRecord::new().with("scale", scale).with("bias", bias),
        )
        .expect("create Affine")
}

pub fn stage(pass_type: &str) -> Stage {
    registry()
        .create(pass_type, &ConfigRecord::new())
        .expect("create stage")
}
