use weave_core::{ConfigRecord, ConfigSchema, OptionSpec, ResourceKind, WeaveError, WeaveResult};
use weave_graph::{Pass, PassContext, PassDescriptor, PassReflection, SlotDesc};

use super::{CHANGE_OCCURRED, POINT_OF_CHANGE};

/// Pixel selection at a scripted frame.
///
/// Copies `src` to `dst` unchanged. On frame `selectAtFrame` it reports the
/// selected pixel as the point of change and raises the change flag; the
/// flag drops again `focusFrames` frames later.
pub struct InteractionPass {
    select_at_frame: Option<u64>,
    selected: (i64, i64),
    focus_frames: u64,
    frame_count: u64,
    focus_until: Option<u64>,
}

pub fn schema() -> ConfigSchema {
    ConfigSchema::new()
        .option(
            OptionSpec::int("selectAtFrame", -1)
                .min(-1.0)
                .describe("Frame at which the pixel is selected (-1 = never)"),
        )
        .option(OptionSpec::int("selectedPixelX", 0).min(0.0))
        .option(OptionSpec::int("selectedPixelY", 0).min(0.0))
        .option(
            OptionSpec::int("focusFrames", 8)
                .min(1.0)
                .describe("Frames the change flag stays raised"),
        )
}

pub fn descriptor() -> PassDescriptor {
    PassDescriptor::new("InteractionPass", "Enables per frame user Interaction.", |cfg| {
        Ok(Box::new(InteractionPass::from_config(cfg)))
    })
    .with_schema(schema())
}

impl InteractionPass {
    pub(crate) fn from_config(cfg: &ConfigRecord) -> Self {
        let select = cfg.get_int("selectAtFrame").unwrap_or(-1);
        Self {
            select_at_frame: (select >= 0).then_some(select as u64),
            selected: (
                cfg.get_int("selectedPixelX").unwrap_or(0),
                cfg.get_int("selectedPixelY").unwrap_or(0),
            ),
            focus_frames: cfg.get_int("focusFrames").unwrap_or(8).max(1) as u64,
            frame_count: 0,
            focus_until: None,
        }
    }
}

impl Pass for InteractionPass {
    fn reflect(&self) -> PassReflection {
        PassReflection::new()
            .input(SlotDesc::new("src", ResourceKind::Color).describe("The source texture"))
            .output(SlotDesc::new("dst", ResourceKind::Color).describe("The destination texture"))
            .publishing()
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> WeaveResult<()> {
        let src = ctx
            .input_handle("src")
            .ok_or_else(|| WeaveError::pass("input 'src' is not bound"))?;

        if self.select_at_frame == Some(self.frame_count) {
            let (w, h) = (src.width(), src.height());
            let x = self.selected.0.clamp(0, w.saturating_sub(1) as i64);
            let y = self.selected.1.clamp(0, h.saturating_sub(1) as i64);
            let texel = src.texture.get_texel(x as u32, y as u32);
            tracing::info!(stage = ctx.stage(), x, y, "Selected pixel {:?}", texel);

            ctx.publish(POINT_OF_CHANGE, ConfigRecord::new().with("x", x).with("y", y));
            ctx.publish(CHANGE_OCCURRED, true);
            self.focus_until = Some(self.frame_count + self.focus_frames);
        } else if self.focus_until == Some(self.frame_count) {
            tracing::debug!(stage = ctx.stage(), "Selection focus ended");
            ctx.publish(CHANGE_OCCURRED, false);
            self.focus_until = None;
        }

        self.frame_count += 1;
        ctx.forward_output("dst", src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use weave_core::{ConfigValue, FrameDictionary, FrameInfo, Resource, Texture};

    fn step(pass: &mut InteractionPass) -> Vec<(String, ConfigValue)> {
        let mut inputs = HashMap::new();
        inputs.insert(
            "src".to_string(),
            Arc::new(Resource::color(Texture::solid(4, 3, [0.5; 4]))),
        );
        let dict = FrameDictionary::new();
        let mut ctx = PassContext::new("ui", FrameInfo::new(0, 4, 3), &inputs, &dict);
        pass.execute(&mut ctx).unwrap();
        let (outputs, published) = ctx.finish();
        assert!(Arc::ptr_eq(&outputs["dst"], &inputs["src"]));
        published
    }

    #[test]
    fn test_never_selects_by_default() {
        let mut pass = InteractionPass::from_config(&ConfigRecord::new());
        for _ in 0..4 {
            assert!(step(&mut pass).is_empty());
        }
    }

    #[test]
    fn test_selection_raises_then_drops_flag() {
        let cfg = ConfigRecord::new()
            .with("selectAtFrame", 1)
            .with("selectedPixelX", 10)
            .with("selectedPixelY", 1)
            .with("focusFrames", 2);
        let mut pass = InteractionPass::from_config(&cfg);

        assert!(step(&mut pass).is_empty());
        let published = step(&mut pass);
        assert_eq!(published.len(), 2);
        let point = published[0].1.as_record().unwrap();
        // Clamped to the last column.
        assert_eq!(point.get_int("x"), Some(3));
        assert_eq!(point.get_int("y"), Some(1));
        assert_eq!(published[1], (CHANGE_OCCURRED.to_string(), ConfigValue::Bool(true)));

        assert!(step(&mut pass).is_empty());
        assert_eq!(
            step(&mut pass),
            vec![(CHANGE_OCCURRED.to_string(), ConfigValue::Bool(false))]
        );
        assert!(step(&mut pass).is_empty());
    }
}
