//! Plate taken from the image filename
//!
//! Looks for a plate-shaped token in the filename; no pixels are read.

use async_trait::async_trait;
use lombada_common::plate::find_plate;
use std::path::Path;

use super::{PlateReading, PlateRecognizer, DEFAULT_VEHICLE_TYPE, FIXED_CONFIDENCE};
use crate::batch::UploadedFile;
use crate::error::RecognitionError;

#[derive(Debug, Default, Clone, Copy)]
pub struct FilenameRecognizer;

impl FilenameRecognizer {
    pub fn read_name(name: &str) -> PlateReading {
        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);

        match find_plate(stem) {
            Some(plate) => PlateReading::found(
                plate,
                FIXED_CONFIDENCE,
                Some(DEFAULT_VEHICLE_TYPE.to_string()),
            ),
            None => PlateReading::none(),
        }
    }
}

#[async_trait]
impl PlateRecognizer for FilenameRecognizer {
    fn name(&self) -> &'static str {
        "filename"
    }

    async fn try_recognize(&self, image: &UploadedFile) -> Result<PlateReading, RecognitionError> {
        let reading = Self::read_name(&image.name);
        tracing::debug!(file = %image.name, plate = ?reading.plate, "Filename plate lookup");
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_in_name() {
        let reading = FilenameRecognizer::read_name("2024-03-15 14 30 22 abc1d23.jpg");
        assert_eq!(reading.plate.as_deref(), Some("ABC1D23"));
        assert_eq!(reading.confidence, 80.0);
        assert_eq!(reading.vehicle_type.as_deref(), Some("Automóvel"));
    }

    #[test]
    fn test_dashed_traditional_plate() {
        let reading = FilenameRecognizer::read_name("20240315143022_XYZ-9876.png");
        assert_eq!(reading.plate.as_deref(), Some("XYZ9876"));
    }

    #[test]
    fn test_timestamp_only_name_has_no_plate() {
        assert_eq!(
            FilenameRecognizer::read_name("2024-03-15 14 30 22.jpg"),
            PlateReading::none()
        );
    }
}
