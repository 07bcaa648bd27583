// End-to-end pipeline behaviour with fake capabilities

mod common;

use common::*;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;

use image_translator::services::rendering::Direction;
use image_translator::{
    CancellationHandle, DegradedReason, FailureReason, PipelineState, ProcessStatus, Script, TranslationBackend,
};

fn arabic_map() -> Arc<dyn TranslationBackend> {
    Arc::new(MapBackend::new(&[
        ("HELLO", "مرحبا"),
        ("WORLD", "عالم"),
        ("PEACE", "سلام"),
    ]))
}

#[tokio::test]
async fn test_hello_is_replaced_by_arabic_in_the_same_box() {
    let h = harness(
        test_config("ar"),
        Some(ScriptedOcr::new(vec![([10, 10, 100, 30], "HELLO", 0.9)])),
        Some(arabic_map()),
        fonts_for(&[Script::Arabic]),
    );
    let input = page_with_ink(200, 60, &[[14, 14, 96, 26]]);

    let outcome = h.pipeline.process(input.clone()).await;
    assert_eq!(*outcome.status(), ProcessStatus::Success);

    let output = outcome.image.to_rgba8();
    assert_eq!(output.dimensions(), (200, 60));
    assert!(output.pixels().all(|p| !is_ink(p)), "original glyph pixels survived");

    let plans = h.engine.plans();
    assert_eq!(plans.len(), 1);
    let plan = &plans[0];
    assert_eq!(plan.region, [10, 10, 100, 30]);
    assert!(plan.text.contains("مرحبا"));
    assert_eq!(plan.direction, Direction::RightToLeft);
    assert!(plan.runs.iter().all(|run| run.rtl));

    // Reading starts at the right edge of the box
    let (anchor_x, _) = plan.anchor();
    assert!(anchor_x > 55.0 && anchor_x <= 100.0);
    for line in &plan.lines {
        assert!((line.x + line.width - anchor_x).abs() < 0.01);
    }

    // New text is drawn only inside the box and its padding
    let [cx1, cy1, cx2, cy2] = plan.clip;
    let mut drawn = 0;
    for (x, y, p) in output.enumerate_pixels() {
        if p[0] < 30 && p[1] < 30 && p[2] < 30 {
            drawn += 1;
            assert!((x as i32) >= cx1 && (x as i32) < cx2 && (y as i32) >= cy1 && (y as i32) < cy2);
        }
    }
    assert!(drawn > 0, "no translated text was drawn");
}

#[tokio::test]
async fn test_missing_ocr_returns_original_degraded() {
    let h = harness(test_config("ar"), None, Some(arabic_map()), fonts_for(&[Script::Arabic]));
    let input = page_with_ink(120, 40, &[[10, 10, 60, 20]]);

    let (image, status) = h.pipeline.process(input.clone()).await.into_parts();

    assert_eq!(status, ProcessStatus::Degraded(DegradedReason::DetectionUnavailable));
    assert_eq!(image, input);
    assert!(h.engine.plans().is_empty());
}

#[tokio::test]
async fn test_blank_image_is_idempotent() {
    let h = harness(
        test_config("ar"),
        Some(ScriptedOcr::new(Vec::new())),
        Some(arabic_map()),
        fonts_for(&[Script::Arabic]),
    );
    let blank = page_with_ink(64, 64, &[]);

    let first = h.pipeline.process(blank.clone()).await;
    let second = h.pipeline.process(first.image.clone()).await;

    assert_eq!(*first.status(), ProcessStatus::Degraded(DegradedReason::NoTextDetected));
    assert_eq!(*second.status(), ProcessStatus::Degraded(DegradedReason::NoTextDetected));
    assert_eq!(first.image, blank);
    assert_eq!(second.image, first.image);
}

#[tokio::test]
async fn test_missing_target_font_fails_the_image() {
    let h = harness(
        test_config("ar"),
        Some(ScriptedOcr::new(vec![([10, 10, 100, 30], "HELLO", 0.9)])),
        Some(arabic_map()),
        fonts_for(&[Script::Latin]),
    );
    let input = page_with_ink(200, 60, &[[14, 14, 96, 26]]);

    let outcome = h.pipeline.process(input.clone()).await;

    assert_eq!(
        *outcome.status(),
        ProcessStatus::Failed(FailureReason::RenderFontMissing { script: Script::Arabic })
    );
    assert_eq!(outcome.image, input);
    assert_eq!(outcome.report.stages.last(), Some(&PipelineState::Rendering));
}

#[tokio::test]
async fn test_unreachable_translation_degrades_with_original_image() {
    let h = harness(
        test_config("ar"),
        Some(ScriptedOcr::new(vec![([10, 10, 100, 30], "HELLO", 0.9)])),
        Some(Arc::new(UnreachableBackend)),
        fonts_for(&[Script::Arabic]),
    );
    let input = page_with_ink(200, 60, &[[14, 14, 96, 26]]);

    let outcome = h.pipeline.process(input.clone()).await;

    assert_eq!(
        *outcome.status(),
        ProcessStatus::Degraded(DegradedReason::TranslationUnavailable)
    );
    assert_eq!(outcome.image, input);
    assert_eq!(outcome.report.fallback_count, 1);
    assert!(!outcome.report.warnings.is_empty());
}

#[tokio::test]
async fn test_translation_timeout_degrades_with_original_image() {
    let mut config = test_config("ar");
    config.translation.timeout = Duration::from_millis(200);
    let h = harness(
        config,
        Some(ScriptedOcr::new(vec![
            ([10, 10, 100, 30], "HELLO", 0.9),
            ([10, 35, 100, 55], "WORLD", 0.9),
        ])),
        Some(Arc::new(SlowBackend {
            delay: Duration::from_secs(30),
        })),
        fonts_for(&[Script::Arabic]),
    );
    let input = page_with_ink(200, 60, &[[14, 14, 96, 26]]);

    let outcome = h.pipeline.process(input.clone()).await;

    assert_eq!(
        *outcome.status(),
        ProcessStatus::Degraded(DegradedReason::TranslationUnavailable)
    );
    assert_eq!(outcome.image, input);
    assert_eq!(outcome.report.translated_count, 0);
    assert_eq!(outcome.report.fallback_count, 2);
    assert!(h.engine.plans().is_empty());
}

#[tokio::test]
async fn test_partial_translation_failure_keeps_source_for_that_region() {
    let backend = MapBackend::new(&[("HELLO", "مرحبا"), ("PEACE", "سلام")]).failing_on("WORLD");
    let h = harness(
        test_config("ar"),
        Some(ScriptedOcr::new(vec![
            ([10, 10, 100, 30], "HELLO", 0.9),
            ([10, 40, 100, 60], "WORLD", 0.9),
            ([10, 70, 100, 90], "PEACE", 0.9),
        ])),
        Some(Arc::new(backend)),
        fonts_for(&[Script::Arabic]),
    );

    let outcome = h.pipeline.process(page_with_ink(200, 100, &[])).await;

    assert_eq!(*outcome.status(), ProcessStatus::Success);
    assert_eq!(outcome.report.translated_count, 2);
    assert_eq!(outcome.report.fallback_count, 1);

    let texts: Vec<String> = h.engine.plans().into_iter().map(|p| p.text).collect();
    assert_eq!(texts.len(), 3);
    assert!(texts[0].contains("مرحبا"));
    assert!(texts[1].contains("WORLD"));
    assert!(texts[2].contains("سلام"));
}

#[tokio::test]
async fn test_region_identity_is_preserved() {
    let boxes = [[10, 10, 90, 30], [110, 10, 190, 30], [10, 50, 190, 80]];
    let h = harness(
        test_config("ar"),
        Some(ScriptedOcr::new(vec![
            (boxes[0], "HELLO", 0.9),
            (boxes[1], "WORLD", 0.8),
            (boxes[2], "PEACE", 0.7),
        ])),
        Some(arabic_map()),
        fonts_for(&[Script::Arabic]),
    );

    let outcome = h.pipeline.process(page_with_ink(200, 100, &[])).await;
    assert!(outcome.status().is_success());

    let plans = h.engine.plans();
    let expected = ["مرحبا", "عالم", "سلام"];
    assert_eq!(plans.len(), 3);
    for (i, plan) in plans.iter().enumerate() {
        assert_eq!(plan.region_index, i);
        assert_eq!(plan.region, boxes[i]);
        assert!(plan.text.contains(expected[i]), "region {} drew {:?}", i, plan.text);
    }
}

#[tokio::test]
async fn test_batch_preserves_order_and_isolates_failures() {
    let h = harness(
        test_config("ar"),
        Some(ScriptedOcr::new(vec![([10, 10, 100, 30], "HELLO", 0.9)])),
        Some(arabic_map()),
        fonts_for(&[Script::Arabic]),
    );
    let images: Vec<DynamicImage> = vec![
        page_with_ink(200, 60, &[[14, 14, 96, 26]]),
        // Too small for the scripted box: clamping leaves nothing
        page_with_ink(8, 8, &[]),
        page_with_ink(150, 40, &[]),
    ];
    let sizes: Vec<(u32, u32)> = images.iter().map(|i| (i.width(), i.height())).collect();

    let result = h.pipeline.process_batch(images).await;

    assert_eq!(result.len(), 3);
    for (i, outcome) in result.outcomes.iter().enumerate() {
        assert_eq!(outcome.report.index, i);
        assert_eq!((outcome.image.width(), outcome.image.height()), sizes[i]);
    }
    assert!(result.outcomes[0].status().is_success());
    assert_eq!(
        *result.outcomes[1].status(),
        ProcessStatus::Degraded(DegradedReason::NoTextDetected)
    );
    assert!(result.outcomes[2].status().is_success());
    assert_eq!(result.analytics.total_images, 3);
    assert_eq!(result.analytics.successful, 2);
    assert_eq!(result.analytics.degraded, 1);
}

#[tokio::test]
async fn test_empty_batch() {
    let h = harness(test_config("ar"), None, None, fonts_for(&[Script::Arabic]));
    let result = h.pipeline.process_batch(Vec::new()).await;
    assert!(result.is_empty());
    assert_eq!(result.analytics.total_images, 0);
}

#[tokio::test]
async fn test_cancellation_before_start_reports_every_image() {
    let h = harness(
        test_config("ar"),
        Some(ScriptedOcr::new(vec![([10, 10, 100, 30], "HELLO", 0.9)])),
        Some(arabic_map()),
        fonts_for(&[Script::Arabic]),
    );
    let cancel = CancellationHandle::new();
    cancel.cancel();
    let input = page_with_ink(200, 60, &[[14, 14, 96, 26]]);

    let result = h
        .pipeline
        .process_batch_with_cancel(vec![input.clone(), input.clone()], &cancel)
        .await;

    assert_eq!(result.len(), 2);
    for outcome in &result.outcomes {
        assert_eq!(*outcome.status(), ProcessStatus::Failed(FailureReason::Cancelled));
        assert_eq!(outcome.image, input);
    }
    assert!(h.engine.plans().is_empty());
}

#[tokio::test]
async fn test_cancellation_mid_batch_keeps_order_and_length() {
    let mut config = test_config("ar");
    // One image in flight at a time, so the rest are still queued when cancel fires
    config.batch.max_batch_size = 1;
    let cancel = CancellationHandle::new();
    let backend = Arc::new(CancellingBackend::new(cancel.clone()));
    let h = harness(
        config,
        Some(ScriptedOcr::new(vec![([10, 10, 100, 30], "HELLO", 0.9)])),
        Some(backend.clone()),
        fonts_for(&[Script::Arabic]),
    );
    let inputs: Vec<DynamicImage> = vec![
        page_with_ink(200, 60, &[[14, 14, 96, 26]]),
        page_with_ink(180, 50, &[[14, 14, 96, 26]]),
        page_with_ink(160, 40, &[[14, 14, 96, 26]]),
    ];

    let result = h.pipeline.process_batch_with_cancel(inputs.clone(), &cancel).await;

    assert!(cancel.is_cancelled());
    assert_eq!(result.len(), inputs.len());
    for (i, outcome) in result.outcomes.iter().enumerate() {
        assert_eq!(outcome.report.index, i);
        assert_eq!(*outcome.status(), ProcessStatus::Failed(FailureReason::Cancelled));
        assert_eq!(outcome.image, inputs[i]);
    }
    // Only the admitted image reached translation; it stopped before rendering
    assert_eq!(backend.calls(), 1);
    assert!(result.outcomes[0].report.stages.contains(&PipelineState::Translating));
    assert!(!result.outcomes[0].report.stages.contains(&PipelineState::Rendering));
    for later in &result.outcomes[1..] {
        assert_eq!(later.report.stages, vec![PipelineState::Detecting]);
    }
    assert!(h.engine.plans().is_empty());
    assert_eq!(result.analytics.failed, 3);
    assert_eq!(result.analytics.cancelled, 3);
}
