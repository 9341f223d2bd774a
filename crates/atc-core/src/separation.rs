//! Pairwise separation checks and look-ahead conflict prediction.
//!
//! Prediction uses straight-line dead reckoning and the linear
//! closest-approach solution: minimise the planar squared distance
//! between the two extrapolated tracks over time. The entry-time
//! (quadratic) variant is deliberately not used; callers only rely on
//! `time_to_violation >= 0` and the separation at that time.

use crate::geometry::{dead_reckon, Position};
use crate::models::AircraftState;
use crate::rules::{SeparationRules, IMMEDIATE_ACTION_TIME_SECS};

/// Relative velocities below this are treated as parallel tracks.
const PARALLEL_TRACK_EPSILON: f64 = 1e-6;

/// A separation violation observed in the current snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationInfo {
    pub aircraft1_id: String,
    pub aircraft2_id: String,
    pub horizontal_separation: f64,
    pub vertical_separation: f64,
    /// Milliseconds since the Unix epoch, taken from the snapshot
    pub timestamp_ms: u64,
    pub is_predicted: bool,
}

/// A predicted loss of separation within the lookahead horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationPrediction {
    pub aircraft1_id: String,
    pub aircraft2_id: String,
    /// Seconds until minimum separation, >= 0
    pub time_to_violation: f64,
    /// Planar separation at that time
    pub min_separation: f64,
    /// Midpoint of the two dead-reckoned positions at that time
    pub conflict_point: Position,
    pub requires_immediate_action: bool,
}

/// Planar separation between two states: (horizontal, vertical).
pub fn separation(s1: &AircraftState, s2: &AircraftState) -> (f64, f64) {
    (
        s1.position.horizontal_distance(&s2.position),
        s1.position.vertical_distance(&s2.position),
    )
}

/// Current-violation test: both minima must be breached simultaneously.
pub fn check_pair_violation(
    s1: &AircraftState,
    s2: &AircraftState,
    rules: &SeparationRules,
) -> Option<ViolationInfo> {
    let (horizontal, vertical) = separation(s1, s2);

    if horizontal < rules.min_horizontal_separation && vertical < rules.min_vertical_separation {
        return Some(ViolationInfo {
            aircraft1_id: s1.callsign.clone(),
            aircraft2_id: s2.callsign.clone(),
            horizontal_separation: horizontal,
            vertical_separation: vertical,
            timestamp_ms: s1.timestamp_ms.max(s2.timestamp_ms),
            is_predicted: false,
        });
    }

    None
}

/// Time of minimum planar separation for two dead-reckoned tracks.
///
/// Returns 0 for parallel tracks (zero relative velocity) and clamps
/// diverging tracks (negative optimum) to 0, so the result is always
/// non-negative and the separation at the returned time never exceeds
/// the current separation.
pub fn time_to_minimum_separation(s1: &AircraftState, s2: &AircraftState) -> f64 {
    let dx = s2.position.x - s1.position.x;
    let dy = s2.position.y - s1.position.y;
    let dvx = s2.velocity.vx - s1.velocity.vx;
    let dvy = s2.velocity.vy - s1.velocity.vy;

    let a = dvx * dvx + dvy * dvy;
    if a < PARALLEL_TRACK_EPSILON {
        return 0.0;
    }

    let t = -(dx * dvx + dy * dvy) / a;
    t.max(0.0)
}

/// Closure rate: magnitude of the relative velocity vector.
pub fn closure_rate(s1: &AircraftState, s2: &AircraftState) -> f64 {
    let dvx = s2.velocity.vx - s1.velocity.vx;
    let dvy = s2.velocity.vy - s1.velocity.vy;
    let dvz = s2.velocity.vz - s1.velocity.vz;
    (dvx * dvx + dvy * dvy + dvz * dvz).sqrt()
}

/// Full look-ahead prediction for one unordered pair.
pub fn predict_violation(
    s1: &AircraftState,
    s2: &AircraftState,
    rules: &SeparationRules,
) -> ViolationPrediction {
    let t_min = time_to_minimum_separation(s1, s2);

    let future1 = dead_reckon(&s1.position, &s1.velocity, t_min);
    let future2 = dead_reckon(&s2.position, &s2.velocity, t_min);

    let min_separation = future1.horizontal_distance(&future2);
    let conflict_point = future1.midpoint(&future2);

    let requires_immediate_action = t_min < IMMEDIATE_ACTION_TIME_SECS
        || min_separation < rules.immediate_action_distance();

    ViolationPrediction {
        aircraft1_id: s1.callsign.clone(),
        aircraft2_id: s2.callsign.clone(),
        time_to_violation: t_min,
        min_separation,
        conflict_point,
        requires_immediate_action,
    }
}

/// Whether a prediction is worth emitting: the pair must actually be
/// converging (a clamped or parallel `t_min` of zero means separation
/// only grows from here), the approach must fall inside the horizon,
/// and the minimum separation must dip below the early-warning
/// distance.
pub fn prediction_is_actionable(p: &ViolationPrediction, rules: &SeparationRules) -> bool {
    p.time_to_violation > 0.0
        && p.time_to_violation < rules.lookahead_secs
        && p.min_separation < rules.early_warning_distance()
}
