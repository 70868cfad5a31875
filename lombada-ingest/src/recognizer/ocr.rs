//! OCR engines and the direct (whole photograph) OCR strategy

use async_trait::async_trait;
use lombada_common::config::OcrSettings;
use lombada_common::plate::find_plate;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

use super::{run_with_stdin, PlateReading, PlateRecognizer, DEFAULT_VEHICLE_TYPE, FIXED_CONFIDENCE};
use crate::batch::UploadedFile;
use crate::error::RecognitionError;

/// Characters a plate can contain
pub const PLATE_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Layout hint passed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    /// Sparse text anywhere in a full photograph
    FullImage,
    /// A single line of text (a plate crop)
    SingleLine,
}

/// Recognized text plus the engine's confidence (0-100)
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f64,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn read_text(&self, image: &[u8], mode: OcrMode) -> Result<OcrOutput, RecognitionError>;
}

/// `tesseract` command line engine
///
/// The image goes in on stdin, TSV comes back on stdout:
/// `tesseract stdin stdout -l por --psm N -c tessedit_char_whitelist=... tsv`
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
    language: String,
    full_image_psm: u8,
    crop_psm: u8,
}

impl TesseractCli {
    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self {
            program: settings.tesseract_path.clone(),
            language: settings.language.clone(),
            full_image_psm: settings.full_image_psm,
            crop_psm: settings.crop_psm,
        }
    }

    fn psm(&self, mode: OcrMode) -> u8 {
        match mode {
            OcrMode::FullImage => self.full_image_psm,
            OcrMode::SingleLine => self.crop_psm,
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn read_text(&self, image: &[u8], mode: OcrMode) -> Result<OcrOutput, RecognitionError> {
        let mut command = Command::new(&self.program);
        command
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.psm(mode).to_string())
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", PLATE_WHITELIST))
            .arg("tsv");

        let output = run_with_stdin(&mut command, image).await.map_err(|e| {
            RecognitionError::Ocr(format!(
                "failed to run {}: {}",
                self.program.display(),
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let parsed = parse_tsv(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!(text = %parsed.text, confidence = parsed.confidence, ?mode, "OCR finished");
        Ok(parsed)
    }
}

/// Parse tesseract TSV output
///
/// Word rows (level 5) with a non-negative confidence contribute their text
/// (space joined) and their confidence (averaged).
pub fn parse_tsv(tsv: &str) -> Result<OcrOutput, RecognitionError> {
    let mut lines = tsv.lines();

    let header = lines
        .next()
        .ok_or_else(|| RecognitionError::Ocr("empty TSV output".to_string()))?;
    let columns: Vec<&str> = header.split('\t').collect();
    let column = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| RecognitionError::Ocr(format!("TSV output lacks '{}' column", name)))
    };
    let level_col = column("level")?;
    let conf_col = column("conf")?;
    let text_col = column("text")?;

    let mut words = Vec::new();
    let mut confidence_sum = 0.0;

    for line in lines {
        let cells: Vec<&str> = line.split('\t').collect();

        if cells.get(level_col).copied() != Some("5") {
            continue;
        }

        let confidence = match cells.get(conf_col).and_then(|c| c.trim().parse::<f64>().ok()) {
            Some(c) if c >= 0.0 => c,
            _ => continue,
        };

        let text = cells.get(text_col).map(|t| t.trim()).unwrap_or_default();
        if text.is_empty() {
            continue;
        }

        words.push(text);
        confidence_sum += confidence;
    }

    let confidence = if words.is_empty() {
        0.0
    } else {
        confidence_sum / words.len() as f64
    };

    Ok(OcrOutput {
        text: words.join(" "),
        confidence,
    })
}

/// Whole-photograph OCR, first plate-shaped token wins
pub struct DirectOcrRecognizer {
    engine: Arc<dyn OcrEngine>,
}

impl DirectOcrRecognizer {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl PlateRecognizer for DirectOcrRecognizer {
    fn name(&self) -> &'static str {
        "ocr"
    }

    async fn try_recognize(&self, image: &UploadedFile) -> Result<PlateReading, RecognitionError> {
        let output = self.engine.read_text(&image.bytes, OcrMode::FullImage).await?;

        Ok(match find_plate(&output.text) {
            Some(plate) => PlateReading::found(
                plate,
                FIXED_CONFIDENCE,
                Some(DEFAULT_VEHICLE_TYPE.to_string()),
            ),
            None => {
                tracing::debug!(file = %image.name, "No plate-shaped text in photograph");
                PlateReading::none()
            }
        })
    }
}
