//! Core data models for the ATC kernel.

use crate::error::AtcError;
use crate::geometry::{Position, Velocity};
use chrono::Utc;

/// Flight phase of an aircraft inside the controlled volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AircraftStatus {
    /// Just entered the airspace, no position advance applied yet
    #[default]
    Entering,
    /// Normal flight
    Cruising,
    /// Maintaining position
    Holding,
    /// Left (or about to leave) the controlled volume; terminal
    Exiting,
    /// Operator-declared emergency
    Emergency,
}

impl AircraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AircraftStatus::Entering => "ENTERING",
            AircraftStatus::Cruising => "CRUISING",
            AircraftStatus::Holding => "HOLDING",
            AircraftStatus::Exiting => "EXITING",
            AircraftStatus::Emergency => "EMERGENCY",
        }
    }

    pub fn from_tag(tag: u8) -> Option<AircraftStatus> {
        match tag {
            0 => Some(AircraftStatus::Entering),
            1 => Some(AircraftStatus::Cruising),
            2 => Some(AircraftStatus::Holding),
            3 => Some(AircraftStatus::Exiting),
            4 => Some(AircraftStatus::Emergency),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            AircraftStatus::Entering => 0,
            AircraftStatus::Cruising => 1,
            AircraftStatus::Holding => 2,
            AircraftStatus::Exiting => 3,
            AircraftStatus::Emergency => 4,
        }
    }
}

impl std::fmt::Display for AircraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinematic state of a single aircraft at one instant.
///
/// Invariants: `heading` is re-derived from the horizontal velocity
/// whenever the velocity changes and stays in [0, 360); `timestamp_ms`
/// never decreases for a given aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftState {
    pub callsign: String,
    pub position: Position,
    pub velocity: Velocity,
    /// Heading in degrees, [0, 360)
    pub heading: f64,
    pub status: AircraftStatus,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl AircraftState {
    pub fn new(callsign: impl Into<String>, position: Position, velocity: Velocity) -> Self {
        let mut state = Self {
            callsign: callsign.into(),
            position,
            velocity,
            heading: 0.0,
            status: AircraftStatus::Entering,
            timestamp_ms: 0,
        };
        state.update_heading();
        state.touch();
        state
    }

    /// Current 3-D speed.
    pub fn speed(&self) -> f64 {
        self.velocity.speed()
    }

    /// Re-derive the heading from the horizontal velocity components.
    pub fn update_heading(&mut self) {
        self.heading = self.velocity.heading_deg();
    }

    /// Refresh the timestamp, never letting it move backwards.
    pub fn touch(&mut self) {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        if now > self.timestamp_ms {
            self.timestamp_ms = now;
        } else {
            // Clock resolution is coarser than the call rate; keep monotonicity.
            self.timestamp_ms += 1;
        }
    }
}

/// Minimum/maximum callsign length accepted on ingest and in commands.
pub const MIN_CALLSIGN_LEN: usize = 3;
pub const MAX_CALLSIGN_LEN: usize = 10;

/// Validate a callsign: 3..=10 alphanumeric ASCII characters.
pub fn validate_callsign(id: &str) -> Result<(), AtcError> {
    if id.len() < MIN_CALLSIGN_LEN || id.len() > MAX_CALLSIGN_LEN {
        return Err(AtcError::InvalidInput(format!(
            "callsign '{id}' must be {MIN_CALLSIGN_LEN}-{MAX_CALLSIGN_LEN} characters"
        )));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AtcError::InvalidInput(format!(
            "callsign '{id}' must be alphanumeric"
        )));
    }
    Ok(())
}
