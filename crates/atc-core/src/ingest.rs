//! Aircraft ingest from CSV.
//!
//! Format: a literal `Time,ID,X,Y,Z,SpeedX,SpeedY,SpeedZ` header line
//! followed by one aircraft per line with exactly eight comma-separated
//! fields. Bad rows are skipped and reported; the load as a whole
//! succeeds if at least one aircraft was accepted.

use crate::error::AtcError;
use crate::geometry::{Airspace, Position, Velocity};
use crate::models::validate_callsign;
use crate::rules::{MAX_SPEED, MIN_SPEED};

/// Expected CSV header line.
pub const CSV_HEADER: &str = "Time,ID,X,Y,Z,SpeedX,SpeedY,SpeedZ";

const FIELD_COUNT: usize = 8;

/// One accepted ingest row.
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftSeed {
    /// Entry time from the feed, seconds
    pub time: f64,
    pub callsign: String,
    pub position: Position,
    pub velocity: Velocity,
}

/// A rejected row with its 1-based line number.
#[derive(Debug)]
pub struct IngestRejection {
    pub line_no: usize,
    pub error: AtcError,
}

/// Outcome of parsing a whole CSV document.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub accepted: Vec<AircraftSeed>,
    pub rejected: Vec<IngestRejection>,
}

impl LoadReport {
    /// The load contract: at least one aircraft accepted.
    pub fn is_success(&self) -> bool {
        !self.accepted.is_empty()
    }
}

fn parse_field(raw: &str, name: &str) -> Result<f64, AtcError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AtcError::InvalidInput(format!("unparseable {name}: '{}'", raw.trim())))
}

/// Parse one data row.
pub fn parse_row(line: &str, airspace: &Airspace) -> Result<AircraftSeed, AtcError> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(AtcError::InvalidInput(format!(
            "expected {FIELD_COUNT} fields, got {}",
            fields.len()
        )));
    }

    let time = parse_field(fields[0], "time")?;
    let callsign = fields[1].trim().to_string();
    validate_callsign(&callsign)?;

    let position = Position::new(
        parse_field(fields[2], "x")?,
        parse_field(fields[3], "y")?,
        parse_field(fields[4], "z")?,
    );
    let velocity = Velocity::new(
        parse_field(fields[5], "vx")?,
        parse_field(fields[6], "vy")?,
        parse_field(fields[7], "vz")?,
    );

    if !position.is_valid(airspace) {
        return Err(AtcError::OutOfRange(format!(
            "position ({}, {}, {}) outside airspace",
            position.x, position.y, position.z
        )));
    }

    let speed = velocity.speed();
    if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(AtcError::OutOfRange(format!(
            "speed {speed:.1} outside [{MIN_SPEED}, {MAX_SPEED}]"
        )));
    }

    Ok(AircraftSeed {
        time,
        callsign,
        position,
        velocity,
    })
}

/// Parse a whole CSV document, collecting accepted rows and rejections.
pub fn parse_document(contents: &str, airspace: &Airspace) -> LoadReport {
    let mut report = LoadReport::default();
    let mut lines = contents.lines().enumerate();

    match lines.next() {
        Some((_, header)) if header.trim() == CSV_HEADER => {}
        Some((_, header)) => {
            report.rejected.push(IngestRejection {
                line_no: 1,
                error: AtcError::InvalidInput(format!("unexpected header: '{}'", header.trim())),
            });
        }
        None => return report,
    }

    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(line, airspace) {
            Ok(seed) => report.accepted.push(seed),
            Err(error) => report.rejected.push(IngestRejection {
                line_no: idx + 1,
                error,
            }),
        }
    }

    report
}
