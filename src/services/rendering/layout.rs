// Font sizing and placement of translated text inside a region
//
// Wrap first: every candidate size is word-wrapped to the padded region
// width, and the size only shrinks when the wrapped block is too tall or a
// single word is too wide.

use serde::Serialize;

use super::engine::{TextBlock, TextEngine};
use super::fonts::FontAsset;
use super::shaping::{self, Direction, VisualRun};
use crate::core::config::RenderingConfig;
use crate::core::errors::{RenderingError, RenderingResult};

pub const LINE_HEIGHT_RATIO: f32 = 1.35;

const SEARCH_ITERATIONS: usize = 25;
const FIT_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub min_font_size: f32,
    pub max_font_size: f32,
    /// Fraction of the region kept free inside it; also the tolerance
    /// clipped text may spill outside it
    pub padding: f32,
}

impl From<&RenderingConfig> for LayoutParams {
    fn from(config: &RenderingConfig) -> Self {
        Self {
            min_font_size: config.min_font_size,
            max_font_size: config.max_font_size,
            padding: config.padding,
        }
    }
}

/// A positioned line of the wrapped block, in image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLine {
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

/// Layout decision for one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPlan {
    pub region_index: usize,
    pub region: [i32; 4],
    /// Text handed to the engine
    pub text: String,
    pub font_size: f32,
    pub line_height: f32,
    pub direction: Direction,
    /// Visual run order from the bidi pass
    pub runs: Vec<VisualRun>,
    pub wrap_width: f32,
    /// Top-left of the wrap box
    pub origin: (f32, f32),
    pub lines: Vec<PlacedLine>,
    pub width: f32,
    pub height: f32,
    /// Pixels outside this box are never drawn
    pub clip: [i32; 4],
    /// Even the minimum font size did not fit; drawing is clipped
    pub overflow: bool,
}

impl RenderPlan {
    /// Where reading starts: top-right for RTL, top-left otherwise.
    pub fn anchor(&self) -> (f32, f32) {
        match self.direction {
            Direction::RightToLeft => (self.origin.0 + self.wrap_width, self.origin.1),
            Direction::LeftToRight => self.origin,
        }
    }

    /// Union of the placed lines, `[x1, y1, x2, y2]`.
    pub fn text_bounds(&self) -> [f32; 4] {
        let mut bounds = [f32::MAX, f32::MAX, f32::MIN, f32::MIN];
        for line in &self.lines {
            bounds[0] = bounds[0].min(line.x);
            bounds[1] = bounds[1].min(line.y);
            bounds[2] = bounds[2].max(line.x + line.width);
            bounds[3] = bounds[3].max(line.y + self.line_height);
        }
        if self.lines.is_empty() {
            let (x, y) = self.origin;
            return [x, y, x, y];
        }
        bounds
    }
}

/// Choose the largest font size at which `text` fits `region` and place it.
pub fn plan_layout(
    engine: &dyn TextEngine,
    font: &FontAsset,
    region_index: usize,
    region: [i32; 4],
    text: &str,
    direction: Direction,
    params: &LayoutParams,
) -> RenderingResult<RenderPlan> {
    let [x1, y1, x2, y2] = region;
    let (rw, rh) = ((x2 - x1) as f32, (y2 - y1) as f32);
    if rw < 1.0 || rh < 1.0 {
        return Err(RenderingError::InvalidRegion(format!(
            "region {} is {}x{}",
            region_index, rw, rh
        )));
    }

    let analysis = shaping::analyze(text, direction);
    let inner_w = rw * (1.0 - params.padding);
    let inner_h = rh * (1.0 - params.padding);

    let measure = |size: f32| -> RenderingResult<TextBlock> {
        engine.measure(font, &analysis.engine_text, size, size * LINE_HEIGHT_RATIO, inner_w)
    };
    let fits = |block: &TextBlock| block.width <= inner_w + FIT_EPSILON && block.height <= inner_h + FIT_EPSILON;

    let min = params.min_font_size;
    let upper = params.max_font_size.min(rh).max(min);

    let (font_size, block, overflow) = {
        let top = measure(upper)?;
        if fits(&top) {
            (upper, top, false)
        } else {
            let floor = measure(min)?;
            if !fits(&floor) {
                (min, floor, true)
            } else {
                let (mut low, mut high) = (min, upper);
                let (mut best, mut best_block) = (min, floor);
                for _ in 0..SEARCH_ITERATIONS {
                    if high - low < 0.05 {
                        break;
                    }
                    let mid = (low + high) / 2.0;
                    let block = measure(mid)?;
                    if fits(&block) {
                        best = mid;
                        best_block = block;
                        low = mid;
                    } else {
                        high = mid;
                    }
                }
                (best, best_block, false)
            }
        }
    };

    let pad_x = rw * params.padding / 2.0;
    let pad_y = rh * params.padding / 2.0;
    let inner_left = x1 as f32 + pad_x;
    let top = if block.height <= inner_h + FIT_EPSILON {
        y1 as f32 + (rh - block.height) / 2.0
    } else {
        y1 as f32 + pad_y
    };

    let lines = block
        .line_widths
        .iter()
        .enumerate()
        .map(|(i, &width)| PlacedLine {
            x: match direction {
                Direction::RightToLeft => inner_left + inner_w - width,
                Direction::LeftToRight => inner_left,
            },
            y: top + i as f32 * block.line_height,
            width,
        })
        .collect();

    let (tol_x, tol_y) = (pad_x.floor() as i32, pad_y.floor() as i32);

    Ok(RenderPlan {
        region_index,
        region,
        text: analysis.engine_text,
        font_size,
        line_height: block.line_height,
        direction,
        runs: analysis.runs,
        wrap_width: inner_w,
        origin: (inner_left, top),
        lines,
        width: block.width,
        height: block.height,
        clip: [x1 - tol_x, y1 - tol_y, x2 + tol_x, y2 + tol_y],
        overflow,
    })
}
