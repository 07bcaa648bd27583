// OCR capability: the trait the detector drives, plus the backends
// selectable from configuration.

use image::RgbImage;
use std::sync::Arc;
use tracing::info;

use crate::core::config::{DetectionConfig, OcrBackendKind};
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::RawDetection;

/// An OCR capability.
///
/// Implementations must tolerate concurrent `recognize` calls on one
/// instance: the detector shares a single engine across all images.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognise text lines in `image`. Geometries are in the image's own
    /// pixel coordinates.
    fn recognize(&self, image: &RgbImage) -> anyhow::Result<Vec<RawDetection>>;
}

/// Build the engine named by `config.backend`.
pub fn build_ocr_engine(config: &DetectionConfig) -> DetectionResult<Arc<dyn OcrEngine>> {
    match config.backend {
        OcrBackendKind::Disabled => Err(DetectionError::Unavailable(
            "OCR backend disabled by configuration".to_string(),
        )),
        OcrBackendKind::Ocrs => {
            #[cfg(feature = "ocr")]
            {
                let engine = ocrs_backend::OcrsEngine::from_model_dir(&config.model_dir)?;
                info!(backend = "ocrs", "OCR engine ready");
                Ok(Arc::new(engine))
            }
            #[cfg(not(feature = "ocr"))]
            {
                info!(
                    model_dir = %config.model_dir.display(),
                    "ocrs backend requested but the crate was built without the `ocr` feature"
                );
                Err(DetectionError::Unavailable(
                    "built without the `ocr` feature".to_string(),
                ))
            }
        }
    }
}

#[cfg(feature = "ocr")]
mod ocrs_backend {
    use anyhow::{anyhow, Context};
    use image::RgbImage;
    use ocrs::{ImageSource, OcrEngine as OcrsInner, OcrEngineParams, TextItem};
    use rten::Model;
    use std::path::Path;
    use tracing::{debug, instrument};

    use super::OcrEngine;
    use crate::core::errors::{DetectionError, DetectionResult};
    use crate::core::types::{RawDetection, RegionGeometry};

    const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
    const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

    /// `ocrs` does not score its lines, so every line gets full confidence.
    const OCRS_LINE_CONFIDENCE: f32 = 1.0;

    pub struct OcrsEngine {
        engine: OcrsInner,
    }

    impl OcrsEngine {
        pub fn from_model_dir(dir: &Path) -> DetectionResult<Self> {
            let load = |file: &str| {
                let path = dir.join(file);
                if !path.exists() {
                    return Err(DetectionError::Unavailable(format!(
                        "OCR model not found at {}",
                        path.display()
                    )));
                }
                Model::load_file(&path).map_err(|err| {
                    DetectionError::Unavailable(format!(
                        "failed to load OCR model {}: {}",
                        path.display(),
                        err
                    ))
                })
            };

            let detection_model = load(DETECTION_MODEL_FILENAME)?;
            let recognition_model = load(RECOGNITION_MODEL_FILENAME)?;

            let engine = OcrsInner::new(OcrEngineParams {
                detection_model: Some(detection_model),
                recognition_model: Some(recognition_model),
                ..Default::default()
            })
            .map_err(|err| {
                DetectionError::Unavailable(format!("failed to initialise ocrs: {}", err))
            })?;

            Ok(Self { engine })
        }
    }

    impl OcrEngine for OcrsEngine {
        fn name(&self) -> &str {
            "ocrs"
        }

        #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
        fn recognize(&self, image: &RgbImage) -> anyhow::Result<Vec<RawDetection>> {
            let source = ImageSource::from_bytes(image.as_raw(), image.dimensions())
                .map_err(|err| anyhow!("invalid image source: {}", err))?;
            let input = self
                .engine
                .prepare_input(source)
                .context("OCR preprocessing failed")?;

            let words = self
                .engine
                .detect_words(&input)
                .context("word detection failed")?;
            let lines = self.engine.find_text_lines(&input, &words);
            let texts = self
                .engine
                .recognize_text(&input, &lines)
                .context("line recognition failed")?;

            let detections: Vec<RawDetection> = texts
                .into_iter()
                .flatten()
                .map(|line| {
                    let rect = line.bounding_rect();
                    RawDetection::new(
                        RegionGeometry::Rect([rect.left(), rect.top(), rect.right(), rect.bottom()]),
                        line.to_string(),
                        OCRS_LINE_CONFIDENCE,
                    )
                })
                .collect();

            debug!(lines = detections.len(), "ocrs recognition complete");
            Ok(detections)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;

    #[test]
    fn test_disabled_backend_is_unavailable() {
        let mut config = Config::defaults().unwrap().detection;
        config.backend = OcrBackendKind::Disabled;
        assert!(matches!(
            build_ocr_engine(&config),
            Err(DetectionError::Unavailable(_))
        ));
    }

    #[test]
    fn test_missing_models_are_unavailable() {
        let mut config = Config::defaults().unwrap().detection;
        config.backend = OcrBackendKind::Ocrs;
        config.model_dir = "definitely/not/a/model/dir".into();
        assert!(matches!(
            build_ocr_engine(&config),
            Err(DetectionError::Unavailable(_))
        ));
    }
}
