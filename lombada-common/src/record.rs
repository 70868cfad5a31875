//! Vehicle passage record
//!
//! A [`Record`] starts life as a parsed CSV row, picks up at most one image
//! reference and one plate annotation during an ingest run, and is then
//! inserted or merged into the record store.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::timestamp;

/// How record identity is established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPolicy {
    /// The CSV supplies the id in its third column; rows merge by id.
    Explicit,
    /// The store assigns the id on insert; every row is a new record.
    #[default]
    StoreAssigned,
}

impl FromStr for IdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(IdPolicy::Explicit),
            "store_assigned" | "store-assigned" | "auto" => Ok(IdPolicy::StoreAssigned),
            other => Err(format!(
                "unknown id policy '{}' (expected 'explicit' or 'store_assigned')",
                other
            )),
        }
    }
}

impl fmt::Display for IdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdPolicy::Explicit => write!(f, "explicit"),
            IdPolicy::StoreAssigned => write!(f, "store_assigned"),
        }
    }
}

/// One vehicle passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable identifier; `None` until the store assigns one
    pub id: Option<i64>,
    /// Moment the vehicle passed the sensor (zone-naive)
    #[serde(with = "timestamp::serde_canonical")]
    pub timestamp: NaiveDateTime,
    /// Measured speed in km/h
    pub speed: i64,
    /// Reference to the stored photograph
    pub image_url: Option<String>,
    /// Recognized plate (validated format)
    pub plate: Option<String>,
    /// Plate confidence on the 0-100 scale; 0 when no plate
    pub plate_confidence: f64,
    /// Free-text vehicle classification
    pub vehicle_type: Option<String>,
}

impl Record {
    /// Create an unenriched record
    pub fn new(timestamp: NaiveDateTime, speed: i64) -> Self {
        Self {
            id: None,
            timestamp,
            speed,
            image_url: None,
            plate: None,
            plate_confidence: 0.0,
            vehicle_type: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn has_image(&self) -> bool {
        self.image_url.is_some()
    }

    /// Enrichment-only merge
    ///
    /// Fills null fields of `self` from `candidate`, never replacing a
    /// non-null value. The plate's confidence travels with the plate.
    /// Returns `true` if anything changed.
    pub fn merge_enrichment(&mut self, candidate: &Record) -> bool {
        let mut changed = false;

        if self.image_url.is_none() && candidate.image_url.is_some() {
            self.image_url = candidate.image_url.clone();
            changed = true;
        }

        if self.plate.is_none() && candidate.plate.is_some() {
            self.plate = candidate.plate.clone();
            self.plate_confidence = candidate.plate_confidence;
            changed = true;
        }

        if self.vehicle_type.is_none() && candidate.vehicle_type.is_some() {
            self.vehicle_type = candidate.vehicle_type.clone();
            changed = true;
        }

        changed
    }

    pub fn speed_band(&self) -> SpeedBand {
        SpeedBand::from_speed(self.speed)
    }

    /// Confidence band, only meaningful when a plate is present
    pub fn confidence_band(&self) -> Option<ConfidenceBand> {
        self.plate
            .as_ref()
            .map(|_| ConfidenceBand::from_confidence(self.plate_confidence))
    }
}

/// Speed classification shown next to each record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedBand {
    Normal,
    Medium,
    High,
}

impl SpeedBand {
    pub fn from_speed(speed: i64) -> Self {
        if speed > 80 {
            SpeedBand::High
        } else if speed > 60 {
            SpeedBand::Medium
        } else {
            SpeedBand::Normal
        }
    }
}

/// Plate confidence classification (0-100 scale)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 90.0 {
            ConfidenceBand::High
        } else if confidence > 70.0 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

/// Dashboard free-text search
///
/// A record matches when its canonical timestamp text or its speed contains
/// the term, or its plate contains the uppercased term. A blank term matches
/// everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    term: String,
}

impl RecordFilter {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into().trim().to_string(),
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn is_empty(&self) -> bool {
        self.term.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        if self.term.is_empty() {
            return true;
        }

        timestamp::format(&record.timestamp).contains(&self.term)
            || record.speed.to_string().contains(&self.term)
            || record
                .plate
                .as_deref()
                .is_some_and(|plate| plate.contains(&self.term.to_uppercase()))
    }
}
