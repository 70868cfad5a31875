//! Detect-then-OCR strategy
//!
//! A vehicle detector finds the vehicle, the lower part of its bounding box
//! (where the plate sits) is cropped out and only that crop goes to OCR.

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use lombada_common::config::DetectorSettings;
use lombada_common::plate::validate_plate;
use serde::Deserialize;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

use super::{run_with_stdin, OcrEngine, OcrMode, PlateReading, PlateRecognizer};
use crate::batch::UploadedFile;
use crate::error::RecognitionError;

/// One detected object; `bbox` is `[x, y, width, height]` in pixels
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    pub label: String,
    pub score: f32,
    pub bbox: [f32; 4],
}

#[async_trait]
pub trait VehicleDetector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<Vec<Detection>, RecognitionError>;
}

/// External detector program: image on stdin, JSON detections on stdout
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandDetector {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_settings(settings: &DetectorSettings) -> Self {
        Self::new(settings.command.clone(), settings.args.clone())
    }
}

#[async_trait]
impl VehicleDetector for CommandDetector {
    async fn detect(&self, image: &[u8]) -> Result<Vec<Detection>, RecognitionError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        let output = run_with_stdin(&mut command, image).await.map_err(|e| {
            RecognitionError::Detection(format!("failed to run {}: {}", self.program.display(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Detection(format!(
                "detector exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let detections: Vec<Detection> = serde_json::from_slice(&output.stdout)
            .map_err(|e| RecognitionError::Detection(format!("invalid detector output: {}", e)))?;

        tracing::debug!(count = detections.len(), "Vehicle detection finished");
        Ok(detections)
    }
}

/// Pixel rectangle inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Lower `fraction` of `bbox`, clamped to a `width` x `height` image
///
/// Returns `None` when nothing of the region lies inside the image.
pub fn plate_region(bbox: [f32; 4], fraction: f32, width: u32, height: u32) -> Option<CropRect> {
    let [x, y, w, h] = bbox;
    if ![x, y, w, h, fraction].iter().all(|v| v.is_finite()) || w <= 0.0 || h <= 0.0 {
        return None;
    }

    let fraction = fraction.clamp(0.0, 1.0);
    let bottom = y + h;
    let top = bottom - h * fraction;
    let right = x + w;

    let x0 = x.max(0.0).round() as u32;
    let y0 = top.max(0.0).round() as u32;
    let x1 = (right.max(0.0).round() as u32).min(width);
    let y1 = (bottom.max(0.0).round() as u32).min(height);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(CropRect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Best detection at or above `min_score`
pub fn best_detection(detections: &[Detection], min_score: f32) -> Option<&Detection> {
    detections
        .iter()
        .filter(|d| d.score.is_finite())
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .filter(|d| d.score >= min_score)
}

/// Decode, crop and re-encode the plate region as PNG
fn crop_png(image: &[u8], bbox: [f32; 4], fraction: f32) -> Result<Option<Vec<u8>>, RecognitionError> {
    let decoded: DynamicImage = image::load_from_memory(image)?;

    let Some(rect) = plate_region(bbox, fraction, decoded.width(), decoded.height()) else {
        return Ok(None);
    };

    let crop = decoded.crop_imm(rect.x, rect.y, rect.width, rect.height);
    let mut png = Vec::new();
    crop.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(Some(png))
}

pub struct DetectThenOcrRecognizer {
    detector: Arc<dyn VehicleDetector>,
    engine: Arc<dyn OcrEngine>,
    min_score: f32,
    plate_fraction: f32,
}

impl DetectThenOcrRecognizer {
    pub fn new(
        detector: Arc<dyn VehicleDetector>,
        engine: Arc<dyn OcrEngine>,
        min_score: f32,
        plate_fraction: f32,
    ) -> Self {
        Self {
            detector,
            engine,
            min_score,
            plate_fraction,
        }
    }
}

#[async_trait]
impl PlateRecognizer for DetectThenOcrRecognizer {
    fn name(&self) -> &'static str {
        "detect_ocr"
    }

    async fn try_recognize(&self, image: &UploadedFile) -> Result<PlateReading, RecognitionError> {
        let detections = self.detector.detect(&image.bytes).await?;

        let Some(best) = best_detection(&detections, self.min_score) else {
            tracing::debug!(file = %image.name, "No vehicle detected with enough confidence");
            return Ok(PlateReading::none());
        };

        let bytes: Bytes = image.bytes.clone();
        let bbox = best.bbox;
        let fraction = self.plate_fraction;
        let crop = tokio::task::spawn_blocking(move || crop_png(&bytes, bbox, fraction))
            .await
            .map_err(|e| RecognitionError::Detection(format!("crop task failed: {}", e)))??;

        let Some(crop) = crop else {
            tracing::debug!(file = %image.name, ?bbox, "Vehicle box lies outside the image");
            return Ok(PlateReading::none());
        };

        let output = self.engine.read_text(&crop, OcrMode::SingleLine).await?;
        // The crop holds only the plate; anything else is discarded
        Ok(match validate_plate(&output.text) {
            Some(plate) => PlateReading::found(plate, output.confidence, Some(best.label.clone())),
            None => PlateReading::none(),
        })
    }
}
