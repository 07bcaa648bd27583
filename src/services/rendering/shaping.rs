// Bidirectional analysis for the text handed to the shaping engine.
//
// Glyph shaping itself (contextual joining) happens in the engine; this
// module decides base direction and visual run order.

use serde::Serialize;
use std::ops::Range;
use unicode_bidi::{bidi_class, BidiClass, BidiInfo, Level};

use crate::core::types::Script;

const RLM: char = '\u{200F}';
const LRM: char = '\u{200E}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    LeftToRight,
    RightToLeft,
}

impl Direction {
    pub fn for_script(script: Script) -> Self {
        if script.is_right_to_left() {
            Direction::RightToLeft
        } else {
            Direction::LeftToRight
        }
    }

    pub fn is_rtl(self) -> bool {
        self == Direction::RightToLeft
    }

    fn level(self) -> Level {
        match self {
            Direction::LeftToRight => Level::ltr(),
            Direction::RightToLeft => Level::rtl(),
        }
    }

    fn mark(self) -> char {
        match self {
            Direction::LeftToRight => LRM,
            Direction::RightToLeft => RLM,
        }
    }
}

/// A maximal same-level run, in display order (left to right on screen).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisualRun {
    pub text: String,
    pub rtl: bool,
    /// Byte range in the logical text
    pub range: Range<usize>,
}

/// Result of running the bidi algorithm over one string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidiAnalysis {
    pub base: Direction,
    pub runs: Vec<VisualRun>,
    /// Text as the engine should receive it: direction mark prepended when
    /// the first strong character disagrees with `base` (or there is none).
    pub engine_text: String,
}

impl BidiAnalysis {
    /// Visual-order concatenation of the runs, with RTL runs reversed.
    pub fn visual_text(&self) -> String {
        self.runs
            .iter()
            .map(|run| {
                if run.rtl {
                    run.text.chars().rev().collect::<String>()
                } else {
                    run.text.clone()
                }
            })
            .collect()
    }
}

fn strong_direction(c: char) -> Option<Direction> {
    match bidi_class(c) {
        BidiClass::L => Some(Direction::LeftToRight),
        BidiClass::R | BidiClass::AL => Some(Direction::RightToLeft),
        _ => None,
    }
}

/// Direction of the first strong character, if any.
pub fn first_strong(text: &str) -> Option<Direction> {
    text.chars().find_map(strong_direction)
}

/// Run the bidi algorithm with `base` as the paragraph direction.
///
/// Always runs, including for empty and neutral-only strings, which then
/// take `base` as their direction.
pub fn analyze(text: &str, base: Direction) -> BidiAnalysis {
    let info = BidiInfo::new(text, Some(base.level()));
    let mut runs = Vec::new();

    for para in &info.paragraphs {
        let (levels, level_runs) = info.visual_runs(para, para.range.clone());
        for range in level_runs {
            if range.is_empty() {
                continue;
            }
            let slice = &text[range.clone()];
            // paragraph separators carry no glyphs
            if slice.chars().all(|c| c == '\n' || c == '\r') {
                continue;
            }
            runs.push(VisualRun {
                text: slice.to_string(),
                rtl: levels[range.start].is_rtl(),
                range,
            });
        }
    }

    let engine_text = if first_strong(text) == Some(base) {
        text.to_string()
    } else {
        format!("{}{}", base.mark(), text)
    };

    BidiAnalysis {
        base,
        runs,
        engine_text,
    }
}
