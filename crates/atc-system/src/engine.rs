//! Separation engine: current violations, look-ahead prediction,
//! warning hysteresis, and advisory dispatch.
//!
//! Each cycle snapshots the registry, evaluates every unordered pair,
//! emits current violations immediately (never suppressed) and
//! predicted conflicts subject to a per-pair cooldown. When any pair
//! needs immediate action the engine halves its own period for the
//! next activation.

use crate::comm::{AlertLevel, CommandData, Message, MessageBus};
use crate::registry::AircraftRegistry;
use crate::runner::{PeriodCell, PeriodicTask, TaskFlow};
use async_trait::async_trait;
use atc_core::geometry::Airspace;
use atc_core::models::AircraftState;
use atc_core::resolution::{self, ResolutionAction, ResolutionKind};
use atc_core::rules::{SeparationRules, SEPARATION_CHECK_INTERVAL_MS, SEPARATION_PRIORITY};
use atc_core::separation::{
    check_pair_violation, predict_violation, prediction_is_actionable, ViolationInfo,
    ViolationPrediction,
};
use atc_core::AtcError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SENDER_ID: &str = "SEPARATION";

/// Engine period while any pair requires immediate action.
pub const URGENT_CHECK_INTERVAL_MS: u64 = SEPARATION_CHECK_INTERVAL_MS / 2;

/// Unordered aircraft pair used as the cooldown key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey(String, String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }

    pub fn involves(&self, callsign: &str) -> bool {
        self.0 == callsign || self.1 == callsign
    }
}

/// What the last engine cycle saw; consumed by the display.
#[derive(Debug, Default, Clone)]
pub struct EngineReport {
    pub violations: Vec<ViolationInfo>,
    pub predictions: Vec<ViolationPrediction>,
}

pub struct SeparationEngine {
    registry: Arc<AircraftRegistry>,
    bus: MessageBus,
    rules: SeparationRules,
    airspace: Airspace,
    cooldowns: DashMap<PairKey, Instant>,
    report: Mutex<EngineReport>,
    period: Arc<PeriodCell>,
    checks: AtomicU64,
    violations_detected: AtomicU64,
    advisories_emitted: AtomicU64,
}

impl SeparationEngine {
    pub fn new(
        registry: Arc<AircraftRegistry>,
        bus: MessageBus,
        rules: SeparationRules,
        airspace: Airspace,
    ) -> Arc<Self> {
        tracing::info!(
            lookahead_secs = rules.lookahead_secs,
            h_min = rules.min_horizontal_separation,
            v_min = rules.min_vertical_separation,
            "separation engine initialized"
        );
        Arc::new(Self {
            registry,
            bus,
            rules,
            airspace,
            cooldowns: DashMap::new(),
            report: Mutex::new(EngineReport::default()),
            period: PeriodCell::new(Duration::from_millis(SEPARATION_CHECK_INTERVAL_MS)),
            checks: AtomicU64::new(0),
            violations_detected: AtomicU64::new(0),
            advisories_emitted: AtomicU64::new(0),
        })
    }

    /// The engine's own period cell; hand this to the runner so the
    /// adaptive cadence takes effect.
    pub fn period(&self) -> Arc<PeriodCell> {
        Arc::clone(&self.period)
    }

    pub fn rules(&self) -> &SeparationRules {
        &self.rules
    }

    /// Last cycle's findings.
    pub fn report(&self) -> EngineReport {
        self.report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn checks_performed(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn violations_detected(&self) -> u64 {
        self.violations_detected.load(Ordering::Relaxed)
    }

    pub fn advisories_emitted(&self) -> u64 {
        self.advisories_emitted.load(Ordering::Relaxed)
    }

    /// Drop cooldown state for a removed aircraft.
    pub fn purge(&self, callsign: &str) {
        self.cooldowns.retain(|key, _| !key.involves(callsign));
    }

    /// Severity tiers follow the separation thresholds: immediate
    /// action is critical, a minimum separation inside the critical
    /// band warns, anything else in the early band is informational.
    fn alert_level(&self, prediction: &ViolationPrediction) -> AlertLevel {
        if prediction.requires_immediate_action {
            AlertLevel::Critical
        } else if prediction.min_separation < self.rules.critical_warning_distance() {
            AlertLevel::Warning
        } else {
            AlertLevel::Info
        }
    }

    fn command_for(action: &ResolutionAction) -> CommandData {
        match action.kind {
            ResolutionKind::AltitudeChange => CommandData::new(&action.aircraft_id, "ALTITUDE")
                .with_param(format!("{:.0}", action.value)),
            ResolutionKind::SpeedChange => CommandData::new(&action.aircraft_id, "SPEED")
                .with_param(format!("{:.0}", action.value)),
            ResolutionKind::HeadingChange => CommandData::new(&action.aircraft_id, "HEADING")
                .with_param(format!("{:.1}", action.value)),
            ResolutionKind::EmergencyStop => {
                CommandData::new(&action.aircraft_id, "EMERGENCY").with_param("ON")
            }
        }
    }

    fn execute_actions(&self, actions: &[ResolutionAction]) {
        for action in actions {
            let msg = Message::command(SENDER_ID, Self::command_for(action));
            if let Err(err) = self.bus.send(&msg) {
                tracing::warn!(
                    aircraft = %action.aircraft_id,
                    "failed to dispatch resolution command: {err}"
                );
            }
        }
    }

    fn handle_current_violation(&self, s1: &AircraftState, s2: &AircraftState, violation: &ViolationInfo) {
        self.violations_detected.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            a = %violation.aircraft1_id,
            b = %violation.aircraft2_id,
            horizontal = violation.horizontal_separation,
            vertical = violation.vertical_separation,
            "separation violation"
        );

        let alert = Message::alert(
            SENDER_ID,
            AlertLevel::Emergency,
            format!(
                "VIOLATION {} / {}: horizontal {:.0}, vertical {:.0}",
                violation.aircraft1_id,
                violation.aircraft2_id,
                violation.horizontal_separation,
                violation.vertical_separation
            ),
        );
        if let Err(err) = self.bus.send(&alert) {
            tracing::warn!("failed to publish violation alert: {err}");
        }

        // Resolution for an active violation is always mandatory.
        let mut prediction = predict_violation(s1, s2, &self.rules);
        prediction.requires_immediate_action = true;

        let actions = resolution::validate_actions(
            resolution::generate_actions(s1, s2, &prediction, &self.rules),
            &self.airspace,
        );
        self.execute_actions(&actions);
    }

    fn handle_prediction(
        &self,
        s1: &AircraftState,
        s2: &AircraftState,
        prediction: &ViolationPrediction,
        now: Instant,
    ) -> bool {
        let key = PairKey::new(&prediction.aircraft1_id, &prediction.aircraft2_id);
        let cooldown = Duration::from_secs_f64(self.rules.warning_cooldown_secs);

        if let Some(last) = self.cooldowns.get(&key) {
            if now.duration_since(*last) < cooldown {
                tracing::debug!(
                    a = %prediction.aircraft1_id,
                    b = %prediction.aircraft2_id,
                    "prediction suppressed by cooldown"
                );
                return false;
            }
        }

        tracing::warn!(
            a = %prediction.aircraft1_id,
            b = %prediction.aircraft2_id,
            t_min = prediction.time_to_violation,
            min_separation = prediction.min_separation,
            immediate = prediction.requires_immediate_action,
            "predicted conflict"
        );

        let alert = Message::alert(
            SENDER_ID,
            self.alert_level(prediction),
            format!(
                "PREDICTED CONFLICT {} / {}: {:.1}s to minimum separation {:.0}",
                prediction.aircraft1_id,
                prediction.aircraft2_id,
                prediction.time_to_violation,
                prediction.min_separation
            ),
        );
        if let Err(err) = self.bus.send(&alert) {
            tracing::warn!("failed to publish conflict alert: {err}");
        }

        let actions = resolution::validate_actions(
            resolution::generate_actions(s1, s2, prediction, &self.rules),
            &self.airspace,
        );
        self.execute_actions(&actions);

        self.cooldowns.insert(key, now);
        self.advisories_emitted.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn sweep_cooldowns(&self, now: Instant) {
        let expiry = Duration::from_secs_f64(self.rules.cooldown_expiry_secs());
        self.cooldowns
            .retain(|_, last| now.duration_since(*last) <= expiry);
    }

    /// One engine cycle at an explicit instant; split from `execute`
    /// so the hysteresis and cadence logic is testable.
    pub fn run_cycle(&self, now: Instant) {
        let snapshot = self.registry.snapshot();
        let mut report = EngineReport::default();
        let mut immediate_action = false;

        for i in 0..snapshot.len() {
            for j in (i + 1)..snapshot.len() {
                let s1 = &snapshot[i];
                let s2 = &snapshot[j];
                self.checks.fetch_add(1, Ordering::Relaxed);

                // Current violation first; it pre-empts the predictive
                // path for this pair and is never cooldown-suppressed.
                if let Some(violation) = check_pair_violation(s1, s2, &self.rules) {
                    self.handle_current_violation(s1, s2, &violation);
                    report.violations.push(violation);
                    immediate_action = true;
                    continue;
                }

                let prediction = predict_violation(s1, s2, &self.rules);
                if prediction_is_actionable(&prediction, &self.rules) {
                    if prediction.requires_immediate_action {
                        immediate_action = true;
                    }
                    self.handle_prediction(s1, s2, &prediction, now);
                    report.predictions.push(prediction);
                }
            }
        }

        self.sweep_cooldowns(now);

        // Adaptive cadence: tighten while anything is urgent, restore
        // the default once the airspace calms down.
        let target = if immediate_action {
            Duration::from_millis(URGENT_CHECK_INTERVAL_MS)
        } else {
            Duration::from_millis(SEPARATION_CHECK_INTERVAL_MS)
        };
        if self.period.get() != target {
            tracing::info!(period_ms = target.as_millis() as u64, "separation cadence changed");
            self.period.set(target);
        }

        *self
            .report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = report;
    }
}

#[async_trait]
impl PeriodicTask for SeparationEngine {
    fn name(&self) -> &str {
        "separation"
    }

    fn priority(&self) -> i32 {
        SEPARATION_PRIORITY
    }

    async fn execute(&self) -> Result<TaskFlow, AtcError> {
        self.run_cycle(Instant::now());
        Ok(TaskFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::Aircraft;
    use crate::comm::{message_channel, MessagePayload, MessageReceiver, MessageType};
    use atc_core::{Position, Velocity};

    fn engine_with(
        aircraft: &[(&str, (f64, f64, f64), (f64, f64, f64))],
    ) -> (Arc<SeparationEngine>, MessageReceiver) {
        let registry = AircraftRegistry::new();
        for (callsign, pos, vel) in aircraft {
            registry.add(Arc::new(
                Aircraft::new(
                    *callsign,
                    Position::new(pos.0, pos.1, pos.2),
                    Velocity::new(vel.0, vel.1, vel.2),
                    Airspace::default(),
                )
                .expect("valid aircraft"),
            ));
        }
        let (bus, rx) = message_channel();
        let engine = SeparationEngine::new(
            registry,
            bus,
            SeparationRules::default(),
            Airspace::default(),
        );
        (engine, rx)
    }

    fn drain(rx: &mut MessageReceiver) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(msg) = rx.try_recv() {
            messages.push(msg.expect("decode"));
        }
        messages
    }

    #[test]
    fn head_on_pair_emits_prediction_and_commands() {
        let (engine, mut rx) = engine_with(&[
            ("AC001", (60_000.0, 50_000.0, 20_000.0), (-400.0, 0.0, 0.0)),
            ("AC002", (40_000.0, 50_000.0, 20_000.0), (400.0, 0.0, 0.0)),
        ]);

        engine.run_cycle(Instant::now());

        let report = engine.report();
        assert!(report.violations.is_empty());
        assert_eq!(report.predictions.len(), 1);
        let prediction = &report.predictions[0];
        assert!((prediction.time_to_violation - 25.0).abs() < 1e-9);
        assert!(prediction.requires_immediate_action);

        let messages = drain(&mut rx);
        let alerts: Vec<_> = messages
            .iter()
            .filter(|m| m.message_type == MessageType::Alert)
            .collect();
        assert_eq!(alerts.len(), 1);
        match &alerts[0].payload {
            MessagePayload::Alert(alert) => assert_eq!(alert.level, AlertLevel::Critical),
            other => panic!("unexpected payload: {other:?}"),
        }
        // Same-altitude pair: the descent command targets the
        // tie-broken lower aircraft and a speed differential follows.
        assert!(messages
            .iter()
            .any(|m| m.message_type == MessageType::Command));
    }

    #[test]
    fn alert_severity_follows_separation_thresholds() {
        // Closing at 800 u/s with a 4000-unit lateral offset: t_min is
        // 50s and the minimum separation sits between the immediate
        // (3600) and critical (4500) distances.
        let (engine, mut rx) = engine_with(&[
            ("AC001", (0.0, 50_000.0, 20_000.0), (400.0, 0.0, 0.0)),
            ("AC002", (40_000.0, 54_000.0, 20_000.0), (-400.0, 0.0, 0.0)),
        ]);
        engine.run_cycle(Instant::now());

        let report = engine.report();
        assert_eq!(report.predictions.len(), 1);
        assert!(!report.predictions[0].requires_immediate_action);
        let alert = drain(&mut rx)
            .into_iter()
            .find(|m| m.message_type == MessageType::Alert)
            .expect("alert emitted");
        match alert.payload {
            MessagePayload::Alert(alert) => assert_eq!(alert.level, AlertLevel::Warning),
            other => panic!("unexpected payload: {other:?}"),
        }

        // A 5500-unit offset clears the critical band but stays inside
        // the early one: informational only.
        let (engine, mut rx) = engine_with(&[
            ("AC003", (0.0, 50_000.0, 20_000.0), (400.0, 0.0, 0.0)),
            ("AC004", (40_000.0, 55_500.0, 20_000.0), (-400.0, 0.0, 0.0)),
        ]);
        engine.run_cycle(Instant::now());

        let alert = drain(&mut rx)
            .into_iter()
            .find(|m| m.message_type == MessageType::Alert)
            .expect("alert emitted");
        match alert.payload {
            MessagePayload::Alert(alert) => assert_eq!(alert.level, AlertLevel::Info),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parallel_pair_emits_nothing() {
        // Zero relative velocity at 5000 apart: no prediction, no alert.
        let (engine, mut rx) = engine_with(&[
            ("AC001", (0.0, 0.0, 20_000.0), (400.0, 0.0, 0.0)),
            ("AC002", (0.0, 5000.0, 20_000.0), (400.0, 0.0, 0.0)),
        ]);

        engine.run_cycle(Instant::now());

        let report = engine.report();
        assert!(report.violations.is_empty());
        assert!(report.predictions.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn altitude_only_conflict_is_not_a_violation() {
        // Vertically tight but horizontally wide open, no closure.
        let (engine, mut rx) = engine_with(&[
            ("AC003", (10_000.0, 50_000.0, 20_000.0), (400.0, 0.0, 0.0)),
            ("AC004", (20_000.0, 50_000.0, 20_500.0), (400.0, 0.0, 0.0)),
        ]);

        engine.run_cycle(Instant::now());

        let report = engine.report();
        assert!(report.violations.is_empty());
        assert!(report.predictions.is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn current_violation_emits_every_cycle_without_cooldown() {
        let (engine, mut rx) = engine_with(&[
            ("AC001", (50_000.0, 50_000.0, 20_000.0), (200.0, 0.0, 0.0)),
            ("AC002", (50_500.0, 50_000.0, 20_200.0), (200.0, 0.0, 0.0)),
        ]);

        let base = Instant::now();
        engine.run_cycle(base);
        engine.run_cycle(base + Duration::from_secs(1));
        engine.run_cycle(base + Duration::from_secs(2));

        assert_eq!(engine.violations_detected(), 3);
        let alerts = drain(&mut rx)
            .into_iter()
            .filter(|m| m.message_type == MessageType::Alert)
            .count();
        assert_eq!(alerts, 3);
    }

    #[test]
    fn cooldown_suppresses_repeat_predictions() {
        let (engine, mut rx) = engine_with(&[
            ("AC001", (60_000.0, 50_000.0, 20_000.0), (-400.0, 0.0, 0.0)),
            ("AC002", (40_000.0, 50_000.0, 20_000.0), (400.0, 0.0, 0.0)),
        ]);

        let base = Instant::now();
        engine.run_cycle(base);
        assert_eq!(engine.advisories_emitted(), 1);
        drain(&mut rx);

        // Re-run within the cooldown window: suppressed.
        engine.run_cycle(base + Duration::from_secs(5));
        assert_eq!(engine.advisories_emitted(), 1);
        assert!(drain(&mut rx)
            .iter()
            .all(|m| m.message_type != MessageType::Alert));

        // Past the cooldown: a fresh advisory goes out.
        engine.run_cycle(base + Duration::from_secs(16));
        assert_eq!(engine.advisories_emitted(), 2);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| m.message_type == MessageType::Alert));
    }

    #[test]
    fn cooldown_entries_expire_after_double_window() {
        let (engine, _rx) = engine_with(&[
            ("AC001", (60_000.0, 50_000.0, 20_000.0), (-400.0, 0.0, 0.0)),
            ("AC002", (40_000.0, 50_000.0, 20_000.0), (400.0, 0.0, 0.0)),
        ]);

        let base = Instant::now();
        engine.run_cycle(base);
        assert_eq!(engine.cooldowns.len(), 1);

        // Empty the registry so no new predictions refresh the entry.
        for callsign in engine.registry.callsigns() {
            engine.registry.remove(&callsign);
        }
        engine.purge("AC001");
        assert!(engine.cooldowns.is_empty());
    }

    #[test]
    fn sweep_removes_stale_cooldowns() {
        let (engine, _rx) = engine_with(&[]);
        engine
            .cooldowns
            .insert(PairKey::new("AC001", "AC002"), Instant::now());

        let later = Instant::now() + Duration::from_secs(31);
        engine.sweep_cooldowns(later);
        assert!(engine.cooldowns.is_empty(), "2x cooldown (30s) has passed");
    }

    #[test]
    fn adaptive_cadence_halves_and_restores() {
        let (engine, _rx) = engine_with(&[
            ("AC001", (60_000.0, 50_000.0, 20_000.0), (-400.0, 0.0, 0.0)),
            ("AC002", (40_000.0, 50_000.0, 20_000.0), (400.0, 0.0, 0.0)),
        ]);

        let base = Instant::now();
        engine.run_cycle(base);
        assert_eq!(
            engine.period().get(),
            Duration::from_millis(URGENT_CHECK_INTERVAL_MS)
        );

        // Remove the conflict pair; cadence returns within one cycle.
        for callsign in engine.registry.callsigns() {
            engine.registry.remove(&callsign);
        }
        engine.run_cycle(base + Duration::from_secs(1));
        assert_eq!(
            engine.period().get(),
            Duration::from_millis(SEPARATION_CHECK_INTERVAL_MS)
        );
    }

    #[test]
    fn pair_key_is_unordered() {
        assert_eq!(PairKey::new("AC001", "AC002"), PairKey::new("AC002", "AC001"));
        assert!(PairKey::new("AC001", "AC002").involves("AC001"));
        assert!(PairKey::new("AC001", "AC002").involves("AC002"));
        assert!(!PairKey::new("AC001", "AC002").involves("AC003"));
    }
}
