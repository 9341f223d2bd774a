//! Resolution advisory generation for predicted conflicts.

use crate::geometry::Airspace;
use crate::models::AircraftState;
use crate::rules::{self, SeparationRules};
use crate::separation::ViolationPrediction;

/// The kind of manoeuvre an advisory proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    AltitudeChange,
    SpeedChange,
    HeadingChange,
    EmergencyStop,
}

/// A single proposed manoeuvre for one aircraft.
///
/// `value` is a target altitude, target speed, or target heading
/// depending on `kind`; it is unused for `EmergencyStop`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionAction {
    pub aircraft_id: String,
    pub kind: ResolutionKind,
    pub value: f64,
    pub mandatory: bool,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Speed delta applied when proposing a speed-differential manoeuvre.
const SPEED_DIFFERENTIAL: f64 = 50.0;
/// Heading offset for opposite-sense turns.
const HEADING_OFFSET_DEG: f64 = 30.0;
/// Heading similarity window that makes turns worthwhile.
const HEADING_SIMILARITY_DEG: f64 = 45.0;
/// Speed similarity window that makes a differential worthwhile.
const SPEED_SIMILARITY: f64 = 50.0;

fn wrap_heading(heading: f64) -> f64 {
    heading.rem_euclid(360.0)
}

/// Propose resolution actions for a predicted conflict between two
/// aircraft.
///
/// The vertical manoeuvre sends the lower aircraft further down by one
/// vertical-separation increment; it is always proposed and preferred
/// (higher confidence) when the pair is vertically tight. A speed
/// differential is added when the speeds are close, and opposite-sense
/// turns when the headings are close. All actions inherit the
/// prediction's urgency as their `mandatory` flag.
pub fn generate_actions(
    s1: &AircraftState,
    s2: &AircraftState,
    prediction: &ViolationPrediction,
    rules: &SeparationRules,
) -> Vec<ResolutionAction> {
    let mut actions = Vec::new();
    let mandatory = prediction.requires_immediate_action;

    let vertical_gap = (s1.position.z - s2.position.z).abs();
    let vertically_tight = vertical_gap < 1.5 * rules.min_vertical_separation;

    let (lower, _higher) = if s1.position.z <= s2.position.z {
        (s1, s2)
    } else {
        (s2, s1)
    };

    actions.push(ResolutionAction {
        aircraft_id: lower.callsign.clone(),
        kind: ResolutionKind::AltitudeChange,
        value: lower.position.z - rules.min_vertical_separation,
        mandatory,
        confidence: if vertically_tight { 0.9 } else { 0.6 },
    });

    let speed1 = s1.speed();
    let speed2 = s2.speed();
    if (speed1 - speed2).abs() < SPEED_SIMILARITY {
        // Slow the faster aircraft to open a speed differential.
        let (faster, faster_speed) = if speed1 >= speed2 {
            (s1, speed1)
        } else {
            (s2, speed2)
        };
        actions.push(ResolutionAction {
            aircraft_id: faster.callsign.clone(),
            kind: ResolutionKind::SpeedChange,
            value: faster_speed - SPEED_DIFFERENTIAL,
            mandatory,
            confidence: 0.5,
        });
    }

    let heading_gap = (s1.heading - s2.heading).abs();
    let heading_gap = heading_gap.min(360.0 - heading_gap);
    if heading_gap < HEADING_SIMILARITY_DEG {
        actions.push(ResolutionAction {
            aircraft_id: s1.callsign.clone(),
            kind: ResolutionKind::HeadingChange,
            value: wrap_heading(s1.heading + HEADING_OFFSET_DEG),
            mandatory,
            confidence: 0.7,
        });
        actions.push(ResolutionAction {
            aircraft_id: s2.callsign.clone(),
            kind: ResolutionKind::HeadingChange,
            value: wrap_heading(s2.heading - HEADING_OFFSET_DEG),
            mandatory,
            confidence: 0.7,
        });
    }

    actions
}

/// Validate an action against airspace and performance bounds.
///
/// Invalid actions are dropped before emission, never "fixed up".
pub fn action_is_valid(action: &ResolutionAction, airspace: &Airspace) -> bool {
    match action.kind {
        ResolutionKind::AltitudeChange => airspace.altitude_valid(action.value),
        ResolutionKind::SpeedChange => rules::speed_in_limits(action.value),
        ResolutionKind::HeadingChange => rules::heading_in_limits(action.value),
        ResolutionKind::EmergencyStop => true,
    }
}

/// Filter a proposed action set down to the executable ones.
pub fn validate_actions(actions: Vec<ResolutionAction>, airspace: &Airspace) -> Vec<ResolutionAction> {
    actions
        .into_iter()
        .filter(|action| action_is_valid(action, airspace))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Position, Velocity};
    use crate::separation::predict_violation;

    fn state(callsign: &str, pos: (f64, f64, f64), vel: (f64, f64, f64)) -> AircraftState {
        AircraftState::new(
            callsign,
            Position::new(pos.0, pos.1, pos.2),
            Velocity::new(vel.0, vel.1, vel.2),
        )
    }

    fn predicted_pair() -> (AircraftState, AircraftState, ViolationPrediction) {
        let a = state("AC001", (60_000.0, 50_000.0, 20_000.0), (-400.0, 0.0, 0.0));
        let b = state("AC002", (40_000.0, 50_000.0, 20_400.0), (400.0, 0.0, 0.0));
        let prediction = predict_violation(&a, &b, &SeparationRules::default());
        (a, b, prediction)
    }

    #[test]
    fn lower_aircraft_gets_descent() {
        let (a, b, prediction) = predicted_pair();
        let rules = SeparationRules::default();
        let actions = generate_actions(&a, &b, &prediction, &rules);

        let altitude = actions
            .iter()
            .find(|action| action.kind == ResolutionKind::AltitudeChange)
            .expect("vertical action always proposed");
        assert_eq!(altitude.aircraft_id, "AC001");
        assert!((altitude.value - 19_000.0).abs() < 1e-9);
        // Pair is vertically tight, so the vertical move is preferred.
        assert!(altitude.confidence > 0.8);
        assert!(altitude.mandatory);
    }

    #[test]
    fn similar_speeds_get_a_differential() {
        let (a, b, prediction) = predicted_pair();
        let rules = SeparationRules::default();
        let actions = generate_actions(&a, &b, &prediction, &rules);

        let speed = actions
            .iter()
            .find(|action| action.kind == ResolutionKind::SpeedChange)
            .expect("equal speeds propose a differential");
        assert!((speed.value - 350.0).abs() < 1e-9);
    }

    #[test]
    fn opposite_headings_skip_the_turn() {
        let (a, b, prediction) = predicted_pair();
        let rules = SeparationRules::default();
        let actions = generate_actions(&a, &b, &prediction, &rules);

        // Head-on pair: headings 180 apart, no turn proposed
        assert!(actions
            .iter()
            .all(|action| action.kind != ResolutionKind::HeadingChange));
    }

    #[test]
    fn similar_headings_turn_opposite_ways() {
        let a = state("AC001", (10_000.0, 50_000.0, 20_000.0), (400.0, 0.0, 0.0));
        let b = state("AC002", (12_000.0, 50_500.0, 20_300.0), (390.0, 40.0, 0.0));
        let rules = SeparationRules::default();
        let prediction = predict_violation(&a, &b, &rules);
        let actions = generate_actions(&a, &b, &prediction, &rules);

        let turns: Vec<_> = actions
            .iter()
            .filter(|action| action.kind == ResolutionKind::HeadingChange)
            .collect();
        assert_eq!(turns.len(), 2);
        assert!((turns[0].value - wrap_heading(a.heading + 30.0)).abs() < 1e-9);
        assert!((turns[1].value - wrap_heading(b.heading - 30.0)).abs() < 1e-9);
    }

    #[test]
    fn validation_drops_out_of_band_altitude() {
        let airspace = Airspace::default();
        let actions = vec![
            ResolutionAction {
                aircraft_id: "AC001".into(),
                kind: ResolutionKind::AltitudeChange,
                value: 14_500.0,
                mandatory: true,
                confidence: 0.9,
            },
            ResolutionAction {
                aircraft_id: "AC002".into(),
                kind: ResolutionKind::EmergencyStop,
                value: 0.0,
                mandatory: true,
                confidence: 1.0,
            },
        ];

        let valid = validate_actions(actions, &airspace);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].kind, ResolutionKind::EmergencyStop);
    }

    #[test]
    fn heading_values_wrap_into_range() {
        assert!((wrap_heading(370.0) - 10.0).abs() < 1e-9);
        assert!((wrap_heading(-20.0) - 340.0).abs() < 1e-9);
        assert!((wrap_heading(360.0) - 0.0).abs() < 1e-9);
    }
}
