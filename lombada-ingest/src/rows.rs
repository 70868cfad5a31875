//! CSV row parsing
//!
//! The log is tab separated: `timestamp<TAB>speed` or
//! `timestamp<TAB>speed<TAB>id`. Line numbers are physical (1-based, blank
//! lines counted) so errors point at the line a person sees in an editor.

use chrono::NaiveDateTime;
use lombada_common::record::{IdPolicy, Record};
use lombada_common::timestamp;

use crate::error::{ParseError, RowError};

/// One successfully parsed log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub line: usize,
    pub timestamp: NaiveDateTime,
    pub speed: i64,
    /// Present only under [`IdPolicy::Explicit`]
    pub id: Option<i64>,
}

impl CsvRow {
    /// Unenriched record for this row
    pub fn to_record(&self) -> Record {
        let record = Record::new(self.timestamp, self.speed);
        match self.id {
            Some(id) => record.with_id(id),
            None => record,
        }
    }

    pub fn match_key(&self) -> String {
        timestamp::to_match_key(&self.timestamp)
    }
}

/// Parse every non-blank line; bad lines become [`RowError`]s
pub fn parse_rows(text: &str, policy: IdPolicy) -> (Vec<CsvRow>, Vec<RowError>) {
    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for (index, raw) in text.split('\n').enumerate() {
        let line = index + 1;
        let content = raw.strip_suffix('\r').unwrap_or(raw);

        if content.trim().is_empty() {
            continue;
        }

        match parse_line(line, content, policy) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::warn!(line, error = %e, "Skipping malformed CSV line");
                errors.push(RowError::new(line, e));
            }
        }
    }

    (rows, errors)
}

fn parse_line(line: usize, content: &str, policy: IdPolicy) -> Result<CsvRow, ParseError> {
    let mut fields = content.split('\t').map(str::trim);

    let ts_text = non_empty(fields.next()).ok_or(ParseError::MissingField { field: "timestamp" })?;
    let speed_text = non_empty(fields.next()).ok_or(ParseError::MissingField { field: "speed" })?;
    let id_text = non_empty(fields.next());

    let timestamp = timestamp::parse(ts_text).map_err(|e| ParseError::InvalidTimestamp { value: e.value })?;

    let speed = speed_text
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidSpeed {
            value: speed_text.to_string(),
        })?;

    let id = match policy {
        IdPolicy::Explicit => {
            let text = id_text.ok_or(ParseError::MissingField { field: "id" })?;
            Some(text.parse::<i64>().map_err(|_| ParseError::InvalidId {
                value: text.to_string(),
            })?)
        }
        IdPolicy::StoreAssigned => None,
    };

    Ok(CsvRow {
        line,
        timestamp,
        speed,
        id,
    })
}

fn non_empty(field: Option<&str>) -> Option<&str> {
    field.filter(|f| !f.is_empty())
}
