// Stage contracts exercised through the public API

mod common;

use common::*;
use image::{Rgba, RgbaImage};
use std::sync::Arc;

use image_translator::core::config::InpaintMethod;
use image_translator::services::erasure::expand_box;
use image_translator::{
    CosmicTextEngine, EntryOutcome, FontRegistry, OcrEngine, RegionDetector, RegionEraser, RegionGeometry, Script,
    TextLayoutRenderer, TextRegion, Translator,
};

fn region(index: usize, bbox: [i32; 4], text: &str) -> TextRegion {
    TextRegion {
        index,
        geometry: RegionGeometry::Rect(bbox),
        source_text: text.to_string(),
        confidence: 0.9,
        translated_text: None,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_translation_keeps_length_for_any_batch_size() {
    let config = test_config("ar");
    let translator = Translator::new(
        Some(Arc::new(MapBackend::new(&[]))),
        None,
        &config.translation,
        None,
    );

    for n in [0usize, 1, 7] {
        let texts: Vec<String> = (0..n).map(|i| format!("line {}", i)).collect();
        let out = translator.translate_strings(&texts, "ar").await;
        assert_eq!(out.len(), n);
    }
}

#[tokio::test]
async fn test_failed_entry_falls_back_to_its_source() {
    let config = test_config("ar");
    let backend = MapBackend::new(&[("a", "t0"), ("c", "t2")]).failing_on("b");
    let translator = Translator::new(Some(Arc::new(backend)), None, &config.translation, None);

    let batch = translator.translate_to(&strings(&["a", "b", "c"]), "ar").await;
    assert!(matches!(batch.outcomes[1], EntryOutcome::FellBack { .. }));
    assert_eq!(batch.fallback_count(), 1);
    assert_eq!(batch.into_strings(), strings(&["t0", "b", "t2"]));
}

#[tokio::test]
async fn test_unreachable_backend_returns_input_unchanged() {
    let config = test_config("ar");
    let translator = Translator::new(Some(Arc::new(UnreachableBackend)), None, &config.translation, None);

    let input = strings(&["one", "two", "three"]);
    let batch = translator.translate(&input).await;
    assert!(batch.all_fell_back());
    assert_eq!(batch.into_strings(), input);
}

#[tokio::test]
async fn test_detector_never_returns_low_confidence_regions() {
    let ocr: Arc<dyn OcrEngine> = Arc::new(ScriptedOcr::new(vec![
        ([0, 0, 20, 10], "a", 0.05),
        ([0, 10, 20, 20], "b", 0.3),
        ([0, 20, 20, 30], "c", 0.55),
        ([0, 30, 20, 40], "d", 0.95),
        ([0, 40, 20, 50], "   ", 0.99),
    ]));
    let image = Arc::new(RgbaImage::from_pixel(40, 60, BACKGROUND));

    for threshold in [0.0f32, 0.3, 0.5, 0.9, 1.0] {
        let mut config = test_config("ar").detection;
        config.confidence_threshold = threshold;
        let detector = RegionDetector::new(Some(ocr.clone()), config);

        let regions = detector.detect(image.clone()).await.unwrap();
        assert!(regions.iter().all(|r| r.confidence >= threshold));
        assert!(regions.iter().all(|r| !r.source_text.trim().is_empty()));
        for (i, r) in regions.iter().enumerate() {
            assert_eq!(r.index, i);
        }
    }
}

#[tokio::test]
async fn test_detector_clamps_out_of_bounds_geometry() {
    let ocr: Arc<dyn OcrEngine> = Arc::new(ScriptedOcr::new(vec![([-10, 5, 70, 25], "edge", 0.9)]));
    let detector = RegionDetector::new(Some(ocr), test_config("ar").detection);

    let regions = detector
        .detect(Arc::new(RgbaImage::from_pixel(50, 30, BACKGROUND)))
        .await
        .unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].geometry.bbox(), [0, 5, 50, 25]);
}

#[test]
fn test_erasure_only_touches_the_expanded_mask() {
    let image = page_with_ink(120, 80, &[[20, 20, 60, 30], [55, 50, 100, 62]]).to_rgba8();
    let regions = vec![region(0, [18, 18, 62, 32], "x"), region(1, [52, 48, 102, 64], "y")];

    for method in [InpaintMethod::FastMarching, InpaintMethod::Diffusion, InpaintMethod::Disabled] {
        let mut config = test_config("ar").erasure;
        config.method = method;
        let margin = config.margin;
        let outcome = RegionEraser::new(config).erase(&image, &regions);

        assert_eq!(outcome.image.dimensions(), image.dimensions());
        let masks: Vec<[i32; 4]> = regions
            .iter()
            .filter_map(|r| expand_box(r.geometry.bbox(), margin, 120, 80))
            .collect();
        for (x, y, p) in outcome.image.enumerate_pixels() {
            let (x, y) = (x as i32, y as i32);
            let masked = masks.iter().any(|[x1, y1, x2, y2]| x >= *x1 && x < *x2 && y >= *y1 && y < *y2);
            if masked {
                assert!(!is_ink(p), "{:?}: ink left at ({}, {})", method, x, y);
            } else {
                assert_eq!(p, image.get_pixel(x as u32, y as u32), "{:?}: pixel changed at ({}, {})", method, x, y);
            }
        }
        assert_eq!(outcome.used_fallback, method == InpaintMethod::Disabled);
    }
}

#[test]
fn test_rendered_text_stays_inside_region_tolerance() {
    let config = test_config("ar");
    let renderer = TextLayoutRenderer::new(
        Arc::new(RecordingEngine::default()),
        fonts_for(&[Script::Arabic]),
        &config.rendering,
        Script::Arabic,
    );
    let padding = config.rendering.padding;

    let cases = [
        ([0, 0, 300, 40], "مرحبا"),
        ([10, 10, 60, 30], "نص طويل جدا لا يمكن أن يتسع داخل هذا المربع الصغير أبدا"),
        ([0, 0, 200, 200], "سلام 2024 OK"),
        ([5, 5, 40, 400], "كلمة كلمة كلمة كلمة كلمة"),
    ];
    for (bbox, text) in cases {
        let plan = renderer.plan(&region(0, bbox, "src"), text).unwrap();
        let region_w = (bbox[2] - bbox[0]) as f32;

        assert!(plan.font_size >= config.rendering.min_font_size);
        assert!(plan.font_size <= config.rendering.max_font_size);
        if !plan.overflow {
            let [x1, _, x2, _] = plan.text_bounds();
            assert!(x2 - x1 <= region_w + region_w * padding, "{:?} too wide", bbox);
        }
    }
}

#[test]
fn test_render_with_missing_font_is_reported_distinctly() {
    let config = test_config("he");
    let renderer = TextLayoutRenderer::new(
        Arc::new(RecordingEngine::default()),
        fonts_for(&[Script::Arabic, Script::Latin]),
        &config.rendering,
        Script::Hebrew,
    );
    let canvas = RgbaImage::from_pixel(50, 20, BACKGROUND);

    let result = renderer.render(&canvas, &region(0, [0, 0, 50, 20], "x"), "שלום");
    assert!(matches!(
        result,
        Err(image_translator::RenderingError::FontMissing { script: Script::Hebrew, .. })
    ));
}

#[test]
fn test_real_arabic_font_renders_inside_box() {
    let config = test_config("ar");
    let Some(path) = config.rendering.fonts.get(&Script::Arabic).cloned() else {
        return;
    };
    let fonts = Arc::new(FontRegistry::from_config(&config.rendering));
    if !fonts.is_available(Script::Arabic) {
        eprintln!("skipping: no Arabic font at {}", path.display());
        return;
    }
    let renderer = TextLayoutRenderer::new(
        Arc::new(CosmicTextEngine::new()),
        fonts,
        &config.rendering,
        Script::Arabic,
    );
    let canvas = RgbaImage::from_pixel(200, 60, Rgba([255, 255, 255, 255]));
    let target = region(0, [10, 10, 100, 30], "HELLO");

    let plan = renderer.plan(&target, "مرحبا").unwrap();
    let output = renderer.render(&canvas, &target, "مرحبا").unwrap();

    let mut dark = 0;
    for (x, y, p) in output.enumerate_pixels() {
        if p[0] < 128 {
            dark += 1;
            let (x, y) = (x as i32, y as i32);
            assert!(x >= plan.clip[0] && x < plan.clip[2] && y >= plan.clip[1] && y < plan.clip[3]);
        }
    }
    assert!(dark > 0);
    // Right-anchored: ink sits in the right part of the box
    let (sum_x, n) = output
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] < 128)
        .fold((0u64, 0u64), |(s, n), (x, _, _)| (s + x as u64, n + 1));
    assert!(sum_x as f32 / n as f32 > 40.0);
}
