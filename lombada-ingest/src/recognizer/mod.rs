//! Plate recognition
//!
//! One [`PlateRecognizer`] trait, several interchangeable strategies:
//! - [`FilenameRecognizer`]: plate taken from the image filename
//! - [`DirectOcrRecognizer`]: OCR over the whole photograph
//! - [`DetectThenOcrRecognizer`]: vehicle detection, then OCR of the plate region
//! - [`NullRecognizer`]: recognition disabled
//!
//! Strategies implement the fallible `try_recognize`; callers use `recognize`
//! or [`recognize_within`], which never fail and degrade to
//! [`PlateReading::none`].

use async_trait::async_trait;
use lombada_common::config::{RecognizerKind, TomlConfig};
use serde::Serialize;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::batch::UploadedFile;
use crate::error::RecognitionError;

pub mod detect;
pub mod filename;
pub mod ocr;

pub use detect::{CommandDetector, DetectThenOcrRecognizer, Detection, VehicleDetector};
pub use filename::FilenameRecognizer;
pub use ocr::{DirectOcrRecognizer, OcrEngine, OcrMode, OcrOutput, TesseractCli};

/// Confidence reported by strategies that have no engine score
pub const FIXED_CONFIDENCE: f64 = 80.0;

/// Vehicle type reported by strategies that do not classify
pub const DEFAULT_VEHICLE_TYPE: &str = "Automóvel";

/// Outcome of one recognition attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlateReading {
    pub plate: Option<String>,
    /// 0-100; always 0 without a plate
    pub confidence: f64,
    pub vehicle_type: Option<String>,
}

impl PlateReading {
    pub fn none() -> Self {
        Self {
            plate: None,
            confidence: 0.0,
            vehicle_type: None,
        }
    }

    pub fn found(plate: String, confidence: f64, vehicle_type: Option<String>) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };

        Self {
            plate: Some(plate),
            confidence,
            vehicle_type,
        }
    }

    pub fn is_found(&self) -> bool {
        self.plate.is_some()
    }
}

#[async_trait]
pub trait PlateRecognizer: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    async fn try_recognize(&self, image: &UploadedFile) -> Result<PlateReading, RecognitionError>;

    /// Never fails; errors are logged and mapped to "no plate"
    async fn recognize(&self, image: &UploadedFile) -> PlateReading {
        match self.try_recognize(image).await {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!(
                    recognizer = self.name(),
                    file = %image.name,
                    error = %e,
                    "Plate recognition failed, continuing without plate"
                );
                PlateReading::none()
            }
        }
    }
}

/// [`PlateRecognizer::recognize`] bounded by `limit`
///
/// A recognizer that overruns is treated as a failure.
pub async fn recognize_within(
    recognizer: &dyn PlateRecognizer,
    image: &UploadedFile,
    limit: Duration,
) -> PlateReading {
    match tokio::time::timeout(limit, recognizer.recognize(image)).await {
        Ok(reading) => reading,
        Err(_) => {
            tracing::warn!(
                recognizer = recognizer.name(),
                file = %image.name,
                error = %RecognitionError::Timeout(limit),
                "Plate recognition failed, continuing without plate"
            );
            PlateReading::none()
        }
    }
}

/// Recognition disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecognizer;

#[async_trait]
impl PlateRecognizer for NullRecognizer {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn try_recognize(&self, _image: &UploadedFile) -> Result<PlateReading, RecognitionError> {
        Ok(PlateReading::none())
    }
}

/// Recognizer selected by `[ingest] recognizer`
pub fn build_recognizer(config: &TomlConfig) -> Arc<dyn PlateRecognizer> {
    let kind = config.ingest.recognizer;
    tracing::info!(recognizer = %kind, "Plate recognizer selected");

    match kind {
        RecognizerKind::Filename => Arc::new(FilenameRecognizer),
        RecognizerKind::Ocr => Arc::new(DirectOcrRecognizer::new(Arc::new(
            TesseractCli::from_settings(&config.ocr),
        ))),
        RecognizerKind::DetectOcr => Arc::new(DetectThenOcrRecognizer::new(
            Arc::new(CommandDetector::from_settings(&config.detector)),
            Arc::new(TesseractCli::from_settings(&config.ocr)),
            config.detector.min_score,
            config.detector.plate_region,
        )),
        RecognizerKind::None => Arc::new(NullRecognizer),
    }
}

/// Run an external program with `input` on stdin and collect its output
///
/// The child is killed if the future is dropped (recognizer timeout).
pub(crate) async fn run_with_stdin(command: &mut Command, input: &[u8]) -> std::io::Result<Output> {
    let mut child = command
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("child stdin not captured"))?;

    let writer = async move {
        stdin.write_all(input).await?;
        stdin.shutdown().await
    };

    let (written, output) = tokio::join!(writer, child.wait_with_output());
    let output = output?;

    // A program that exits without draining stdin is judged by its status
    if let Err(e) = written {
        if output.status.success() {
            return Err(e);
        }
    }

    Ok(output)
}
