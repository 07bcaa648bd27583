// Shaping/rasterisation capability used by the layout renderer

use image::{Rgba, RgbaImage};

use super::fonts::FontAsset;
use super::layout::RenderPlan;
use crate::core::errors::RenderingResult;

/// Measured extent of a wrapped text block.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    /// Advance width of each wrapped line, top to bottom
    pub line_widths: Vec<f32>,
    pub line_height: f32,
    pub width: f32,
    pub height: f32,
}

impl TextBlock {
    pub fn empty(line_height: f32) -> Self {
        Self {
            line_widths: Vec::new(),
            line_height,
            width: 0.0,
            height: 0.0,
        }
    }

    pub fn from_lines(line_widths: Vec<f32>, line_height: f32) -> Self {
        let width = line_widths.iter().copied().fold(0.0f32, f32::max);
        let height = line_widths.len() as f32 * line_height;
        Self {
            line_widths,
            line_height,
            width,
            height,
        }
    }
}

/// One colour pass of a draw, shifted by `(dx, dy)`. Outline strokes are
/// several offset passes under the fill pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawPass {
    pub color: Rgba<u8>,
    pub dx: i32,
    pub dy: i32,
}

/// A text shaping and rasterisation capability.
///
/// `measure` and `draw` must agree: drawing a plan built from `measure`
/// places glyphs inside the measured block. Engines are called from
/// blocking worker threads and must be safe to share.
pub trait TextEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Shape `text` with `font` and word-wrap it at `max_width`.
    fn measure(
        &self,
        font: &FontAsset,
        text: &str,
        font_size: f32,
        line_height: f32,
        max_width: f32,
    ) -> RenderingResult<TextBlock>;

    /// Rasterise `plan` onto `canvas`, alpha blending, never writing
    /// outside `plan.clip`.
    fn draw(
        &self,
        canvas: &mut RgbaImage,
        font: &FontAsset,
        plan: &RenderPlan,
        passes: &[DrawPass],
    ) -> RenderingResult<()>;
}

/// Alpha-blend `color` over the canvas pixel at `(x, y)` if it lies inside
/// both the canvas and `clip`.
pub(crate) fn blend_pixel(canvas: &mut RgbaImage, clip: [i32; 4], x: i32, y: i32, color: Rgba<u8>) {
    let within_canvas = x >= 0 && y >= 0 && x < canvas.width() as i32 && y < canvas.height() as i32;
    let within_clip = x >= clip[0] && x < clip[2] && y >= clip[1] && y < clip[3];
    if !within_canvas || !within_clip || color[3] == 0 {
        return;
    }

    let existing = canvas.get_pixel(x as u32, y as u32);
    let alpha = color[3] as f32 / 255.0;
    let inv_alpha = 1.0 - alpha;
    let blended = Rgba([
        (color[0] as f32 * alpha + existing[0] as f32 * inv_alpha) as u8,
        (color[1] as f32 * alpha + existing[1] as f32 * inv_alpha) as u8,
        (color[2] as f32 * alpha + existing[2] as f32 * inv_alpha) as u8,
        existing[3].max(color[3]),
    ]);
    canvas.put_pixel(x as u32, y as u32, blended);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_from_lines() {
        let block = TextBlock::from_lines(vec![10.0, 30.0, 20.0], 12.0);
        assert_eq!(block.width, 30.0);
        assert_eq!(block.height, 36.0);
    }

    #[test]
    fn test_blend_respects_clip() {
        let mut canvas = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        blend_pixel(&mut canvas, [2, 2, 5, 5], 1, 1, Rgba([0, 0, 0, 255]));
        blend_pixel(&mut canvas, [2, 2, 5, 5], 3, 3, Rgba([0, 0, 0, 255]));
        blend_pixel(&mut canvas, [2, 2, 5, 5], 3, 4, Rgba([0, 0, 0, 128]));

        assert_eq!(*canvas.get_pixel(1, 1), Rgba([255, 255, 255, 255]));
        assert_eq!(*canvas.get_pixel(3, 3), Rgba([0, 0, 0, 255]));
        assert!(canvas.get_pixel(3, 4)[0] > 100 && canvas.get_pixel(3, 4)[0] < 150);
    }
}
