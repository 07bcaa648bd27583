use cosmic_text::{
    fontdb, Align, Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping, SwashCache, Wrap,
};
use image::RgbaImage;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::engine::{blend_pixel, DrawPass, TextBlock, TextEngine};
use super::fonts::FontAsset;
use super::layout::RenderPlan;
use super::shaping::Direction;
use crate::core::errors::{RenderingError, RenderingResult};

/// Text engine backed by cosmic-text.
///
/// Shaping is `Shaping::Advanced`, which performs contextual joining for
/// scripts such as Arabic and runs bidi reordering per line. Only fonts
/// handed in as `FontAsset`s are known to it; system fonts are never scanned.
pub struct CosmicTextEngine {
    font_system: Mutex<FontSystem>,
    swash_cache: Mutex<SwashCache>,
    // asset name -> family name inside the font database
    families: Mutex<HashMap<String, String>>,
}

impl CosmicTextEngine {
    pub fn new() -> Self {
        info!("Initializing CosmicTextEngine (no system font scan)");
        Self {
            font_system: Mutex::new(FontSystem::new_with_locale_and_db(
                "en-US".to_string(),
                fontdb::Database::new(),
            )),
            swash_cache: Mutex::new(SwashCache::new()),
            families: Mutex::new(HashMap::new()),
        }
    }

    /// Family name for `font`, loading it into the database on first use.
    fn family_for(&self, font_system: &mut FontSystem, font: &FontAsset) -> RenderingResult<String> {
        if let Some(family) = self.families.lock().get(&font.name) {
            return Ok(family.clone());
        }

        let before: HashSet<fontdb::ID> = font_system.db().faces().map(|face| face.id).collect();
        font_system.db_mut().load_font_data(font.data.as_ref().clone());

        let family = font_system
            .db()
            .faces()
            .filter(|face| !before.contains(&face.id))
            .find_map(|face| face.families.first().map(|(name, _)| name.clone()))
            .ok_or_else(|| RenderingError::FontLoadError(format!("no usable face in {}", font.name)))?;

        debug!("✓ Font: {} from {}", family, font.name);
        self.families.lock().insert(font.name.clone(), family.clone());
        Ok(family)
    }

    #[allow(clippy::too_many_arguments)]
    fn shaped_buffer(
        font_system: &mut FontSystem,
        family: &str,
        text: &str,
        font_size: f32,
        line_height: f32,
        max_width: f32,
        align: Option<Align>,
    ) -> Buffer {
        let mut buffer = Buffer::new(font_system, Metrics::new(font_size, line_height));
        buffer.set_size(font_system, Some(max_width), None);
        buffer.set_wrap(font_system, Wrap::Word);

        let attrs = Attrs::new().family(Family::Name(family));
        buffer.set_text(font_system, text, &attrs, Shaping::Advanced);
        if align.is_some() {
            for line in buffer.lines.iter_mut() {
                line.set_align(align);
            }
        }
        buffer.shape_until_scroll(font_system, false);
        buffer
    }
}

impl Default for CosmicTextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEngine for CosmicTextEngine {
    fn name(&self) -> &str {
        "cosmic-text"
    }

    fn measure(
        &self,
        font: &FontAsset,
        text: &str,
        font_size: f32,
        line_height: f32,
        max_width: f32,
    ) -> RenderingResult<TextBlock> {
        if text.trim().is_empty() {
            return Ok(TextBlock::empty(line_height));
        }

        let mut font_system = self.font_system.lock();
        let family = self.family_for(&mut font_system, font)?;
        let buffer = Self::shaped_buffer(&mut font_system, &family, text, font_size, line_height, max_width, None);

        // Visual extent per line: glyph boxes can overhang the logical advance
        let line_widths = buffer
            .layout_runs()
            .map(|run| {
                let (min_x, max_x) = run
                    .glyphs
                    .iter()
                    .map(|g| (g.x, g.x + g.w))
                    .fold((f32::MAX, f32::MIN), |(lo, hi), (a, b)| (lo.min(a), hi.max(b)));
                if min_x == f32::MAX {
                    run.line_w
                } else {
                    (max_x - min_x).max(run.line_w)
                }
            })
            .collect();

        Ok(TextBlock::from_lines(line_widths, line_height))
    }

    fn draw(
        &self,
        canvas: &mut RgbaImage,
        font: &FontAsset,
        plan: &RenderPlan,
        passes: &[DrawPass],
    ) -> RenderingResult<()> {
        let align = match plan.direction {
            Direction::RightToLeft => Align::Right,
            Direction::LeftToRight => Align::Left,
        };

        let mut font_system = self.font_system.lock();
        let family = self.family_for(&mut font_system, font)?;
        let buffer = Self::shaped_buffer(
            &mut font_system,
            &family,
            &plan.text,
            plan.font_size,
            plan.line_height,
            plan.wrap_width,
            Some(align),
        );

        let mut swash_cache = self.swash_cache.lock();
        let (ox, oy) = (plan.origin.0.round() as i32, plan.origin.1.round() as i32);

        for pass in passes {
            let color = CosmicColor::rgba(pass.color[0], pass.color[1], pass.color[2], pass.color[3]);
            buffer.draw(&mut font_system, &mut swash_cache, color, |x, y, w, h, pixel| {
                let rgba = image::Rgba([pixel.r(), pixel.g(), pixel.b(), pixel.a()]);
                for py in 0..h as i32 {
                    for px in 0..w as i32 {
                        blend_pixel(canvas, plan.clip, ox + pass.dx + x + px, oy + pass.dy + y + py, rgba);
                    }
                }
            });
        }

        Ok(())
    }
}
