use weave_core::{
    ConfigRecord, ConfigSchema, OptionSpec, Resource, ResourceKind, Texture, WeaveError,
    WeaveResult,
};
use weave_graph::{Pass, PassContext, PassDescriptor, PassReflection, SlotDesc};

use super::CHANGE_OCCURRED;

/// Running sum storage, one entry per float in the input texture.
#[derive(Debug)]
enum Accumulator {
    Double(Vec<f64>),
    Single(Vec<f32>),
    /// Kahan summation: running sum plus the lost low-order bits.
    SingleCompensated { sum: Vec<f32>, carry: Vec<f32> },
}

impl Accumulator {
    fn new(precision: &str, len: usize) -> Self {
        match precision {
            "Double" => Accumulator::Double(vec![0.0; len]),
            "SingleCompensated" => Accumulator::SingleCompensated {
                sum: vec![0.0; len],
                carry: vec![0.0; len],
            },
            _ => Accumulator::Single(vec![0.0; len]),
        }
    }

    fn add(&mut self, values: &[f32]) {
        match self {
            Accumulator::Double(sum) => {
                for (s, v) in sum.iter_mut().zip(values) {
                    *s += *v as f64;
                }
            }
            Accumulator::Single(sum) => {
                for (s, v) in sum.iter_mut().zip(values) {
                    *s += v;
                }
            }
            Accumulator::SingleCompensated { sum, carry } => {
                for ((s, c), v) in sum.iter_mut().zip(carry.iter_mut()).zip(values) {
                    let y = v - *c;
                    let t = *s + y;
                    *c = (t - *s) - y;
                    *s = t;
                }
            }
        }
    }

    fn mean(&self, count: u32) -> Vec<f32> {
        let n = count.max(1) as f64;
        match self {
            Accumulator::Double(sum) => sum.iter().map(|s| (s / n) as f32).collect(),
            Accumulator::Single(sum) | Accumulator::SingleCompensated { sum, .. } => {
                sum.iter().map(|s| (*s as f64 / n) as f32).collect()
            }
        }
    }
}

/// Temporal accumulation of the input color into a running average.
pub struct AccumulatePass {
    enabled: bool,
    auto_reset: bool,
    precision: String,
    sub_frame_count: u32,
    frame_count: u32,
    template: Option<Texture>,
    accumulator: Option<Accumulator>,
}

pub fn schema() -> ConfigSchema {
    ConfigSchema::new()
        .option(OptionSpec::bool("enableAccumulation", true))
        .option(
            OptionSpec::bool("autoReset", true)
                .describe("Restart when an upstream pass reports a change"),
        )
        .option(OptionSpec::symbol(
            "precisionMode",
            &["Double", "Single", "SingleCompensated"],
            "Single",
        ))
        .option(
            OptionSpec::int("subFrameCount", 0)
                .min(0.0)
                .describe("Stop accumulating after this many frames (0 = never)"),
        )
}

pub fn descriptor() -> PassDescriptor {
    PassDescriptor::new("AccumulatePass", "Temporal accumulation", |cfg| {
        Ok(Box::new(AccumulatePass::from_config(cfg)))
    })
    .with_schema(schema())
}

impl AccumulatePass {
    pub(crate) fn from_config(cfg: &ConfigRecord) -> Self {
        Self {
            enabled: cfg.get_bool("enableAccumulation").unwrap_or(true),
            auto_reset: cfg.get_bool("autoReset").unwrap_or(true),
            precision: cfg.get_symbol("precisionMode").unwrap_or("Single").to_string(),
            sub_frame_count: cfg.get_int("subFrameCount").unwrap_or(0).max(0) as u32,
            frame_count: 0,
            template: None,
            accumulator: None,
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    fn reset(&mut self, input: &Texture) {
        self.frame_count = 0;
        self.accumulator = Some(Accumulator::new(&self.precision, input.data.len()));
        self.template = Some(Texture::new(input.width, input.height, input.format));
    }
}

impl Pass for AccumulatePass {
    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(
                SlotDesc::new("input", ResourceKind::Color)
                    .describe("Input data to be temporally accumulated"),
            )
            .output(
                SlotDesc::new("output", ResourceKind::Color)
                    .describe("Output data that is temporally accumulated"),
            )
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        if !self.enabled {
            let input = ctx
                .input_handle("input")
                .ok_or_else(|| WeaveError::pass("input 'input' is not bound"))?;
            self.frame_count = 0;
            ctx.forward_output("output", input);
            return Ok(());
        }

        let input = ctx.require_input("input")?.texture.clone();
        let reshaped = self.template.as_ref().map_or(true, |t| !t.same_shape(&input));
        let changed = self.auto_reset && ctx.dictionary_flag(CHANGE_OCCURRED);
        if reshaped || changed {
            tracing::debug!(stage = ctx.stage(), reshaped, changed, "Resetting accumulation");
            self.reset(&input);
        }

        let capped = self.sub_frame_count > 0 && self.frame_count >= self.sub_frame_count;
        let Some(accumulator) = self.accumulator.as_mut() else {
            return Err(WeaveError::pass("accumulation buffer missing after reset"));
        };
        if !capped {
            accumulator.add(&input.data);
            self.frame_count += 1;
        }

        let mut output = input;
        output.data = accumulator.mean(self.frame_count);
        ctx.set_output("output", Resource::color(output));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use weave_core::{FrameDictionary, FrameInfo};

    fn step(pass: &mut AccumulatePass, value: f32, dict: &FrameDictionary) -> Arc<Resource> {
        let mut inputs = HashMap::new();
        inputs.insert(
            "input".to_string(),
            Arc::new(Resource::color(Texture::solid(2, 1, [value; 4]))),
        );
        let mut ctx = PassContext::new("acc", FrameInfo::new(0, 2, 1), &inputs, dict);
        pass.execute(&mut ctx).unwrap();
        ctx.finish().0.remove("output").unwrap()
    }

    fn pass(cfg: ConfigRecord) -> AccumulatePass {
        AccumulatePass::from_config(&cfg)
    }

    #[test]
    fn test_running_average() {
        let dict = FrameDictionary::new();
        let mut acc = pass(ConfigRecord::new());
        step(&mut acc, 1.0, &dict);
        step(&mut acc, 2.0, &dict);
        let out = step(&mut acc, 6.0, &dict);
        assert_eq!(acc.frame_count(), 3);
        assert_eq!(out.texture.get_texel(1, 0), Some([3.0; 4]));
    }

    #[test]
    fn test_change_flag_resets() {
        let mut dict = FrameDictionary::new();
        let mut acc = pass(ConfigRecord::new());
        step(&mut acc, 4.0, &dict);
        dict.insert(CHANGE_OCCURRED, true);
        let out = step(&mut acc, 1.0, &dict);
        assert_eq!(acc.frame_count(), 1);
        assert_eq!(out.texture.get_texel(0, 0), Some([1.0; 4]));

        let mut acc = pass(ConfigRecord::new().with("autoReset", false));
        step(&mut acc, 4.0, &dict);
        step(&mut acc, 2.0, &dict);
        assert_eq!(acc.frame_count(), 2);
    }

    #[test]
    fn test_sub_frame_count_caps() {
        let dict = FrameDictionary::new();
        let mut acc = pass(ConfigRecord::new().with("subFrameCount", 2));
        step(&mut acc, 1.0, &dict);
        step(&mut acc, 3.0, &dict);
        let out = step(&mut acc, 100.0, &dict);
        assert_eq!(acc.frame_count(), 2);
        assert_eq!(out.texture.get_texel(0, 0), Some([2.0; 4]));
    }

    #[test]
    fn test_disabled_forwards_input() {
        let dict = FrameDictionary::new();
        let mut acc = pass(ConfigRecord::new().with("enableAccumulation", false));
        step(&mut acc, 1.0, &dict);
        let out = step(&mut acc, 5.0, &dict);
        assert_eq!(out.texture.get_texel(0, 0), Some([5.0; 4]));
        assert_eq!(acc.frame_count(), 0);
    }

    #[test]
    fn test_precision_modes_agree() {
        let dict = FrameDictionary::new();
        let results: Vec<_> = ["Double", "Single", "SingleCompensated"]
            .iter()
            .map(|mode| {
                let mut acc = pass(ConfigRecord::new().with("precisionMode", *mode));
                let mut last = None;
                for i in 0..8 {
                    last = Some(step(&mut acc, i as f32 * 0.5, &dict));
                }
                last.unwrap().texture.get_texel(0, 0).unwrap()[0]
            })
            .collect();
        for r in results {
            assert!((r - 1.75).abs() < 1e-6);
        }
    }
}
