//! Brazilian license plate validation
//!
//! Every recognizer funnels its raw text through these functions so that a
//! stored plate is always one of the two fixed 7-character shapes:
//! - Mercosul: `ABC1D23` (3 letters, digit, letter, 2 digits)
//! - Traditional: `ABC1234` (3 letters, 4 digits)

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static MERCOSUL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}[0-9][A-Z][0-9]{2}$").expect("valid regex"));

static TRADITIONAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}[0-9]{4}$").expect("valid regex"));

/// Plate-shaped token inside free text (either format)
static PLATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]{3}[0-9][0-9A-Z][0-9]{2}").expect("valid regex"));

/// Plate layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlateFormat {
    Mercosul,
    Traditional,
}

impl PlateFormat {
    /// Classify an already-cleaned plate string
    pub fn of(plate: &str) -> Option<Self> {
        if MERCOSUL.is_match(plate) {
            Some(PlateFormat::Mercosul)
        } else if TRADITIONAL.is_match(plate) {
            Some(PlateFormat::Traditional)
        } else {
            None
        }
    }
}

/// Clean and validate recognized plate text
///
/// Uppercases, strips everything that is not `A-Z0-9`, then accepts the
/// result only if it matches one of the two plate formats.
///
/// ```
/// use lombada_common::plate::validate_plate;
///
/// assert_eq!(validate_plate("abc-1d23").as_deref(), Some("ABC1D23"));
/// assert_eq!(validate_plate("ABCD123"), None);
/// ```
pub fn validate_plate(text: &str) -> Option<String> {
    let cleaned: String = text
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();

    PlateFormat::of(&cleaned).map(|_| cleaned)
}

/// Find the first plate-shaped token in free text
///
/// Searches the uppercased text as-is first; if nothing is found, searches
/// again with spaces and dashes removed (`ABC-1234` is how traditional plates
/// are printed).
pub fn find_plate(text: &str) -> Option<String> {
    let upper = text.to_ascii_uppercase();

    if let Some(plate) = first_valid_token(&upper) {
        return Some(plate);
    }

    let compact: String = upper
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    first_valid_token(&compact)
}

fn first_valid_token(text: &str) -> Option<String> {
    PLATE_TOKEN
        .find_iter(text)
        .find_map(|m| validate_plate(m.as_str()))
}
