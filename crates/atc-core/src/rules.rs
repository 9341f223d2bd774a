//! Separation rules, performance limits, and scheduling constants.

use serde::Deserialize;

/// Aircraft performance limits.
pub const MIN_SPEED: f64 = 150.0;
pub const MAX_SPEED: f64 = 500.0;

/// Update intervals in milliseconds.
pub const POSITION_UPDATE_INTERVAL_MS: u64 = 1000;
pub const SEPARATION_CHECK_INTERVAL_MS: u64 = 1000;
pub const SSR_INTERROGATION_INTERVAL_MS: u64 = 1000;
pub const PSR_SCAN_INTERVAL_MS: u64 = 4000;
pub const DISPLAY_UPDATE_INTERVAL_MS: u64 = 5000;
pub const HISTORY_LOGGING_INTERVAL_MS: u64 = 30_000;

/// Advisory task priorities (higher = more urgent). Used where the host
/// platform supports priority scheduling; correctness never depends on it.
pub const RADAR_PRIORITY: i32 = 20;
pub const SEPARATION_PRIORITY: i32 = 18;
pub const AIRCRAFT_PRIORITY: i32 = 16;
pub const DISPLAY_PRIORITY: i32 = 14;
pub const LOGGING_PRIORITY: i32 = 12;
pub const OPERATOR_PRIORITY: i32 = 10;

/// Radar track management.
pub const MAX_TRACK_AGE_MS: u64 = 10_000;
pub const MIN_TRACK_QUALITY: i32 = 30;
pub const MAX_TRACK_QUALITY: i32 = 100;
/// Bounded uniform noise applied per axis during a primary scan.
pub const RADAR_POSITION_ERROR: f64 = 50.0;

/// Separation thresholds and prediction horizon.
///
/// Thresholds are expressed as multiples of the minimum horizontal
/// separation. Deserializable so a rules file can override the
/// defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SeparationRules {
    /// Minimum horizontal separation in linear units
    pub min_horizontal_separation: f64,
    /// Minimum vertical separation in linear units
    pub min_vertical_separation: f64,
    /// Prediction horizon in seconds
    pub lookahead_secs: f64,
    /// Seconds between repeat advisories for the same pair
    pub warning_cooldown_secs: f64,
    /// Early-warning multiplier on the horizontal minimum
    pub early_threshold: f64,
    /// Critical-warning multiplier on the horizontal minimum
    pub critical_threshold: f64,
    /// Immediate-action multiplier on the horizontal minimum
    pub immediate_action_threshold: f64,
}

/// Maximum configurable lookahead horizon in seconds.
pub const MAX_LOOKAHEAD_SECS: f64 = 300.0;

/// Predictions closer than this are imminent regardless of separation.
pub const IMMEDIATE_ACTION_TIME_SECS: f64 = 30.0;

impl Default for SeparationRules {
    fn default() -> Self {
        Self {
            min_horizontal_separation: 3000.0,
            min_vertical_separation: 1000.0,
            lookahead_secs: 180.0,
            warning_cooldown_secs: 15.0,
            early_threshold: 3.0,
            critical_threshold: 1.5,
            immediate_action_threshold: 1.2,
        }
    }
}

impl SeparationRules {
    /// Clamp a requested lookahead into (0, MAX_LOOKAHEAD_SECS].
    pub fn set_lookahead(&mut self, secs: f64) {
        if secs > 0.0 && secs <= MAX_LOOKAHEAD_SECS {
            self.lookahead_secs = secs;
        }
    }

    pub fn early_warning_distance(&self) -> f64 {
        self.min_horizontal_separation * self.early_threshold
    }

    pub fn critical_warning_distance(&self) -> f64 {
        self.min_horizontal_separation * self.critical_threshold
    }

    pub fn immediate_action_distance(&self) -> f64 {
        self.min_horizontal_separation * self.immediate_action_threshold
    }

    /// Cooldown entries older than twice the cooldown are swept.
    pub fn cooldown_expiry_secs(&self) -> f64 {
        self.warning_cooldown_secs * 2.0
    }
}

/// Validate a commanded speed against the performance limits.
pub fn speed_in_limits(speed: f64) -> bool {
    (MIN_SPEED..=MAX_SPEED).contains(&speed)
}

/// Validate a commanded heading: [0, 360).
pub fn heading_in_limits(heading: f64) -> bool {
    (0.0..360.0).contains(&heading)
}
