//! Exposure and tone mapping of HDR color into display range.

use weave_core::{
    ConfigRecord, ConfigSchema, OptionSpec, Resource, ResourceKind, WeaveError, WeaveResult,
};
use weave_graph::{Pass, PassContext, PassDescriptor, PassReflection, SlotDesc};

use crate::math::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneMapOp {
    Linear,
    Reinhard,
    ReinhardModified,
    HejiHableAlu,
    HableUc2,
    Aces,
}

impl ToneMapOp {
    fn parse(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "Linear" => ToneMapOp::Linear,
            "Reinhard" => ToneMapOp::Reinhard,
            "ReinhardModified" => ToneMapOp::ReinhardModified,
            "HejiHableAlu" => ToneMapOp::HejiHableAlu,
            "HableUc2" => ToneMapOp::HableUc2,
            "Aces" => ToneMapOp::Aces,
            _ => return None,
        })
    }
}

pub struct ToneMapper {
    operator: ToneMapOp,
    exposure_compensation: f32,
    auto_exposure: bool,
    film_speed: f32,
    f_number: f32,
    shutter: f32,
    white_balance: Option<Vec3>,
    clamp: bool,
    white_max_luminance: f32,
    white_scale: f32,
}

pub fn schema() -> ConfigSchema {
    ConfigSchema::new()
        .option(OptionSpec::float("exposureCompensation", 0.0).range(-12.0, 12.0))
        .option(OptionSpec::bool("autoExposure", false))
        .option(
            OptionSpec::float("filmSpeed", 100.0)
                .range(1.0, 6400.0)
                .describe("ISO film speed"),
        )
        .option(OptionSpec::bool("whiteBalance", false))
        .option(
            OptionSpec::float("whitePoint", 6500.0)
                .range(1905.0, 25000.0)
                .describe("White point in Kelvin"),
        )
        .option(OptionSpec::symbol(
            "operator",
            &[
                "Linear",
                "Reinhard",
                "ReinhardModified",
                "HejiHableAlu",
                "HableUc2",
                "Aces",
            ],
            "Aces",
        ))
        .option(OptionSpec::bool("clamp", true))
        .option(OptionSpec::float("whiteMaxLuminance", 1.0).range(0.1, 100.0))
        .option(OptionSpec::float("whiteScale", 11.2).range(0.01, 100.0))
        .option(OptionSpec::float("fNumber", 1.0).range(0.1, 100.0))
        .option(
            OptionSpec::float("shutter", 1.0)
                .range(0.0001, 100.0)
                .describe("Exposure time in seconds"),
        )
        .option(OptionSpec::symbol(
            "exposureMode",
            &["AperturePriority", "ShutterPriority"],
            "AperturePriority",
        ))
}

pub fn descriptor() -> PassDescriptor {
    PassDescriptor::new("ToneMapper", "Tone-map a color-buffer", |cfg| {
        Ok(Box::new(ToneMapper::from_config(cfg)?))
    })
    .with_schema(schema())
}

/// Approximate linear RGB of a black body at `kelvin`.
fn blackbody_rgb(kelvin: f32) -> Vec3 {
    let t = kelvin / 100.0;
    let r = if t <= 66.0 {
        1.0
    } else {
        (1.292_936_2 * (t - 60.0).powf(-0.133_204_76)).clamp(0.0, 1.0)
    };
    let g = if t <= 66.0 {
        (0.390_081_58 * t.ln() - 0.631_841_4).clamp(0.0, 1.0)
    } else {
        (1.129_890_9 * (t - 60.0).powf(-0.075_514_85)).clamp(0.0, 1.0)
    };
    let b = if t >= 66.0 {
        1.0
    } else if t <= 19.0 {
        0.0
    } else {
        (0.543_206_8 * (t - 10.0).ln() - 1.196_254_1).clamp(0.0, 1.0)
    };
    Vec3::new(r, g, b)
}

/// Per-channel gains mapping `kelvin` white to the D65 white.
fn white_balance_gains(kelvin: f32) -> Vec3 {
    let source = blackbody_rgb(kelvin);
    let target = blackbody_rgb(6500.0);
    let gain = |t: f32, s: f32| if s > 1e-4 { t / s } else { 1.0 };
    Vec3::new(
        gain(target.x, source.x),
        gain(target.y, source.y),
        gain(target.z, source.z),
    )
}

fn hable(x: Vec3) -> Vec3 {
    let (a, b, c, d, e, f) = (0.15, 0.50, 0.10, 0.20, 0.02, 0.30);
    let curve = |x: f32| ((x * (a * x + c * b) + d * e) / (x * (a * x + b) + d * f)) - e / f;
    Vec3::new(curve(x.x), curve(x.y), curve(x.z))
}

impl ToneMapper {
    pub(crate) fn from_config(cfg: &ConfigRecord) -> WeaveResult<Self> {
        let float = |key: &str, default: f64| cfg.get_float(key).unwrap_or(default) as f32;
        let operator = cfg
            .get_symbol("operator")
            .and_then(ToneMapOp::parse)
            .ok_or_else(|| WeaveError::invalid_config("ToneMapper", "bad operator"))?;
        let white_balance = cfg
            .get_bool("whiteBalance")
            .unwrap_or(false)
            .then(|| white_balance_gains(float("whitePoint", 6500.0)));
        Ok(Self {
            operator,
            exposure_compensation: float("exposureCompensation", 0.0),
            auto_exposure: cfg.get_bool("autoExposure").unwrap_or(false),
            film_speed: float("filmSpeed", 100.0),
            f_number: float("fNumber", 1.0),
            shutter: float("shutter", 1.0),
            white_balance,
            clamp: cfg.get_bool("clamp").unwrap_or(true),
            white_max_luminance: float("whiteMaxLuminance", 1.0),
            white_scale: float("whiteScale", 11.2),
        })
    }

    /// Photometric exposure scale from the camera settings.
    pub fn manual_exposure(&self) -> f32 {
        let ev100 = (self.f_number * self.f_number / self.shutter * 100.0 / self.film_speed).log2();
        2f32.powf(self.exposure_compensation) / (1.2 * 2f32.powf(ev100))
    }

    pub fn map(&self, c: Vec3) -> Vec3 {
        match self.operator {
            ToneMapOp::Linear => c,
            ToneMapOp::Reinhard => c * (1.0 / (1.0 + c.luminance())),
            ToneMapOp::ReinhardModified => {
                let l = c.luminance();
                let w2 = self.white_max_luminance * self.white_max_luminance;
                c * ((1.0 + l / w2) / (1.0 + l))
            }
            ToneMapOp::HejiHableAlu => {
                let curve = |v: f32| {
                    let x = (v - 0.004).max(0.0);
                    // The fit bakes in a 2.2 gamma; undo it to stay linear.
                    ((x * (6.2 * x + 0.5)) / (x * (6.2 * x + 1.7) + 0.06)).powf(2.2)
                };
                Vec3::new(curve(c.x), curve(c.y), curve(c.z))
            }
            ToneMapOp::HableUc2 => {
                let white = hable(Vec3::splat(self.white_scale));
                let mapped = hable(c * 2.0);
                Vec3::new(mapped.x / white.x, mapped.y / white.y, mapped.z / white.z)
            }
            ToneMapOp::Aces => {
                let curve = |x: f32| {
                    ((x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14)).clamp(0.0, 1.0)
                };
                Vec3::new(curve(c.x), curve(c.y), curve(c.z))
            }
        }
    }
}

impl Pass for ToneMapper {
    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(SlotDesc::new("src", ResourceKind::Color).describe("Source texture"))
            .output(
                SlotDesc::new("dst", ResourceKind::Color).describe("Tone-mapped output texture"),
            )
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let src = &ctx.require_input("src")?.texture;
        let mut exposure = self.manual_exposure();
        if self.auto_exposure {
            // Key the log-average luminance to middle grey.
            let texels = src.texel_count().max(1) as f32;
            let log_sum: f32 = src
                .data
                .chunks(src.format.channel_count())
                .filter(|t| t.len() >= 3)
                .map(|t| (Vec3::from_slice(t).luminance() + 1e-4).ln())
                .sum();
            let average = (log_sum / texels).exp();
            exposure *= 0.18 / average.max(1e-4);
        }

        let mut out = src.clone();
        let cc = out.format.channel_count();
        if cc >= 3 {
            for texel in out.data.chunks_mut(cc) {
                let mut c = Vec3::from_slice(texel) * exposure;
                if let Some(gains) = self.white_balance {
                    c = c.mul_elem(gains);
                }
                let mut m = self.map(c);
                if self.clamp {
                    m = Vec3::new(m.x.clamp(0.0, 1.0), m.y.clamp(0.0, 1.0), m.z.clamp(0.0, 1.0));
                }
                texel[..3].copy_from_slice(&[m.x, m.y, m.z]);
            }
        }
        ctx.set_output("dst", Resource::color(out));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use weave_core::{FrameDictionary, FrameInfo, RangePolicy, Texture};

    fn mapper(record: ConfigRecord) -> ToneMapper {
        let cfg = schema()
            .resolve(&record, RangePolicy::Reject, &mut Vec::new())
            .unwrap();
        ToneMapper::from_config(&cfg).unwrap()
    }

    fn run(pass: &mut ToneMapper, rgba: [f32; 4]) -> [f32; 4] {
        let mut inputs = HashMap::new();
        inputs.insert(
            "src".to_string(),
            Arc::new(Resource::color(Texture::solid(1, 1, rgba))),
        );
        let dict = FrameDictionary::new();
        let mut ctx = PassContext::new("tm", FrameInfo::new(0, 1, 1), &inputs, &dict);
        pass.execute(&mut ctx).unwrap();
        ctx.finish().0["dst"].texture.get_texel(0, 0).unwrap()
    }

    #[test]
    fn test_default_exposure() {
        let tm = mapper(ConfigRecord::new());
        assert!((tm.manual_exposure() - 1.0 / 1.2).abs() < 1e-6);
        let brighter = mapper(ConfigRecord::new().with("exposureCompensation", 1.0));
        assert!((brighter.manual_exposure() - 2.0 / 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_aces_is_bounded_and_monotonic() {
        let tm = mapper(ConfigRecord::new());
        let mut last = -1.0;
        for i in 0..50 {
            let v = tm.map(Vec3::splat(i as f32 * 0.5)).x;
            assert!((0.0..=1.0).contains(&v));
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn test_linear_keeps_alpha_and_clamps() {
        let mut tm = mapper(
            ConfigRecord::new()
                .with("operator", "Linear")
                .with("exposureCompensation", 0.0),
        );
        let out = run(&mut tm, [1.2, 0.6, 0.0, 0.25]);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert_eq!(out[3], 0.25);
    }

    #[test]
    fn test_auto_exposure_keys_to_middle_grey() {
        let mut tm = mapper(
            ConfigRecord::new()
                .with("operator", "Linear")
                .with("autoExposure", true)
                .with("clamp", false),
        );
        let dim = run(&mut tm, [0.01, 0.01, 0.01, 1.0]);
        let bright = run(&mut tm, [4.0, 4.0, 4.0, 1.0]);
        assert!((dim[0] - bright[0]).abs() < 1e-2);
    }

    #[test]
    fn test_white_balance_neutral_at_d65() {
        let gains = white_balance_gains(6500.0);
        assert!((gains.x - 1.0).abs() < 1e-6 && (gains.z - 1.0).abs() < 1e-6);
        let warm = white_balance_gains(3000.0);
        assert!(warm.z > warm.x);
    }
}
