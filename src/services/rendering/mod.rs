// Translated-text layout and rendering

pub mod cosmic;
pub mod engine;
pub mod fonts;
pub mod layout;
pub mod shaping;

pub use cosmic::CosmicTextEngine;
pub use engine::{DrawPass, TextBlock, TextEngine};
pub use fonts::{FontAsset, FontRegistry};
pub use layout::{plan_layout, LayoutParams, PlacedLine, RenderPlan, LINE_HEIGHT_RATIO};
pub use shaping::{analyze, BidiAnalysis, Direction, VisualRun};

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::core::config::RenderingConfig;
use crate::core::errors::RenderingResult;
use crate::core::types::{Script, TextRegion};
use crate::utils::image_ops::mean_luminance;

const DARK_TEXT: Rgba<u8> = Rgba([0, 0, 0, 255]);
const LIGHT_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Rendered image plus the plan used for each drawn region, in region order.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub image: RgbaImage,
    pub plans: Vec<RenderPlan>,
}

/// Text colour with the most contrast against a background luminance.
pub fn contrast_color(background_luminance: f32) -> Rgba<u8> {
    if background_luminance >= 128.0 {
        DARK_TEXT
    } else {
        LIGHT_TEXT
    }
}

/// Opposite of the fill, for outlines.
fn stroke_color(fill: Rgba<u8>) -> Rgba<u8> {
    let brightness = fill[0] as u32 + fill[1] as u32 + fill[2] as u32;
    if brightness < 382 {
        LIGHT_TEXT
    } else {
        DARK_TEXT
    }
}

/// Offset passes for an outline of `width` px under the fill pass.
fn draw_passes(fill: Rgba<u8>, stroke_width: Option<i32>) -> Vec<DrawPass> {
    let mut passes = Vec::new();
    if let Some(width) = stroke_width.filter(|w| *w > 0) {
        let stroke = stroke_color(fill);
        let radius_sq = (width * width) as f32;
        for dy in -width..=width {
            for dx in -width..=width {
                if (dx, dy) == (0, 0) {
                    continue;
                }
                if ((dx * dx + dy * dy) as f32) <= radius_sq * 1.2 {
                    passes.push(DrawPass { color: stroke, dx, dy });
                }
            }
        }
    }
    passes.push(DrawPass { color: fill, dx: 0, dy: 0 });
    passes
}

/// Draws each region's translation into its original, unexpanded box.
///
/// The target script is fixed at construction; its font must exist or the
/// whole render fails with `FontMissing`.
pub struct TextLayoutRenderer {
    engine: Arc<dyn TextEngine>,
    fonts: Arc<FontRegistry>,
    params: LayoutParams,
    stroke_width: Option<i32>,
    script: Script,
}

impl TextLayoutRenderer {
    pub fn new(
        engine: Arc<dyn TextEngine>,
        fonts: Arc<FontRegistry>,
        config: &RenderingConfig,
        script: Script,
    ) -> Self {
        Self {
            engine,
            fonts,
            params: LayoutParams::from(config),
            stroke_width: config.text_stroke_enabled.then_some(config.text_stroke_width),
            script,
        }
    }

    pub fn script(&self) -> Script {
        self.script
    }

    pub fn direction(&self) -> Direction {
        Direction::for_script(self.script)
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn font_available(&self) -> bool {
        self.fonts.is_available(self.script)
    }

    /// Plan one region without drawing.
    pub fn plan(&self, region: &TextRegion, text: &str) -> RenderingResult<RenderPlan> {
        let font = self.fonts.font_for(self.script)?;
        self.plan_with(&font, region, text)
    }

    fn plan_with(&self, font: &FontAsset, region: &TextRegion, text: &str) -> RenderingResult<RenderPlan> {
        plan_layout(
            self.engine.as_ref(),
            font,
            region.index,
            region.geometry.bbox(),
            text,
            self.direction(),
            &self.params,
        )
    }

    fn draw_plan(&self, canvas: &mut RgbaImage, font: &FontAsset, plan: &RenderPlan) -> RenderingResult<()> {
        let background = mean_luminance(canvas, plan.region).unwrap_or(255.0);
        let passes = draw_passes(contrast_color(background), self.stroke_width);
        self.engine.draw(canvas, font, plan, &passes)
    }

    /// Draw `translated_text` into `region` on a copy of `image`.
    pub fn render(&self, image: &RgbaImage, region: &TextRegion, translated_text: &str) -> RenderingResult<RgbaImage> {
        let font = self.fonts.font_for(self.script)?;
        let mut canvas = image.clone();
        if translated_text.trim().is_empty() {
            return Ok(canvas);
        }
        let plan = self.plan_with(&font, region, translated_text)?;
        self.draw_plan(&mut canvas, &font, &plan)?;
        Ok(canvas)
    }

    /// Draw every region's display text onto a copy of `image`.
    ///
    /// Plans are computed in parallel and drawn in region order, so where
    /// boxes overlap the later region is on top.
    #[instrument(skip_all, fields(regions = regions.len(), script = %self.script))]
    pub fn render_all(&self, image: &RgbaImage, regions: &[TextRegion]) -> RenderingResult<RenderedImage> {
        let font = self.fonts.font_for(self.script)?;

        let plans: Vec<RenderPlan> = regions
            .par_iter()
            .filter(|r| !r.display_text().trim().is_empty())
            .map(|r| self.plan_with(&font, r, r.display_text()))
            .collect::<RenderingResult<Vec<_>>>()?;

        let mut canvas = image.clone();
        for plan in &plans {
            self.draw_plan(&mut canvas, &font, plan)?;
        }

        debug!(
            drawn = plans.len(),
            overflowed = plans.iter().filter(|p| p.overflow).count(),
            "Rendering complete"
        );
        Ok(RenderedImage { image: canvas, plans })
    }
}
