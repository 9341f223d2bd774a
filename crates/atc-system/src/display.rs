//! Controller-facing textual status display.
//!
//! Renders a plain-text situation summary on a fixed cadence: aircraft
//! table, active violations, predicted conflicts, and an optional
//! per-aircraft focus panel fed by the radar tracker. The operator can
//! pause/resume updates, change the refresh rate, and pick the focused
//! aircraft.

use crate::engine::SeparationEngine;
use crate::radar::RadarTracker;
use crate::registry::AircraftRegistry;
use crate::runner::{PeriodicTask, TaskFlow};
use async_trait::async_trait;
use atc_core::models::AircraftState;
use atc_core::rules::DISPLAY_PRIORITY;
use atc_core::AtcError;
use chrono::Local;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Operator-adjustable display controls, shared with the console.
pub struct DisplaySettings {
    paused: AtomicBool,
    focus: Mutex<Option<String>>,
}

impl DisplaySettings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            paused: AtomicBool::new(false),
            focus: Mutex::new(None),
        })
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_focus(&self, callsign: Option<String>) {
        *self
            .focus
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = callsign;
    }

    pub fn focus(&self) -> Option<String> {
        self.focus
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

pub struct StatusDisplay {
    registry: Arc<AircraftRegistry>,
    engine: Arc<SeparationEngine>,
    radar: Arc<RadarTracker>,
    settings: Arc<DisplaySettings>,
}

impl StatusDisplay {
    pub fn new(
        registry: Arc<AircraftRegistry>,
        engine: Arc<SeparationEngine>,
        radar: Arc<RadarTracker>,
        settings: Arc<DisplaySettings>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            engine,
            radar,
            settings,
        })
    }

    fn aircraft_row(state: &AircraftState) -> String {
        format!(
            "{:<10} ({:>8.0}, {:>8.0}, {:>6.0})  {:>6.1} u/s  {:>6.1}°  {}",
            state.callsign,
            state.position.x,
            state.position.y,
            state.position.z,
            state.speed(),
            state.heading,
            state.status
        )
    }

    /// Render the current situation to a string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let states = self.registry.snapshot();
        let report = self.engine.report();

        let _ = writeln!(out, "=== Air Traffic Control System ===");
        let _ = writeln!(out, "Time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "{}", "-".repeat(70));
        let _ = writeln!(out, "Active Aircraft: {}", states.len());

        for state in &states {
            let _ = writeln!(out, "  {}", Self::aircraft_row(state));
        }

        if !report.violations.is_empty() {
            let _ = writeln!(out, "\nVIOLATIONS:");
            for violation in &report.violations {
                let _ = writeln!(
                    out,
                    "  {} / {}  horizontal {:.0}  vertical {:.0}",
                    violation.aircraft1_id,
                    violation.aircraft2_id,
                    violation.horizontal_separation,
                    violation.vertical_separation
                );
            }
        }

        if !report.predictions.is_empty() {
            let _ = writeln!(out, "\nPredicted Conflicts:");
            for prediction in &report.predictions {
                let _ = writeln!(
                    out,
                    "  {} / {}  in {:.1}s  min sep {:.0}{}",
                    prediction.aircraft1_id,
                    prediction.aircraft2_id,
                    prediction.time_to_violation,
                    prediction.min_separation,
                    if prediction.requires_immediate_action {
                        "  [IMMEDIATE ACTION]"
                    } else {
                        ""
                    }
                );
            }
        }

        if let Some(focus) = self.settings.focus() {
            let _ = writeln!(out, "\nTracking: {focus}");
            match self.registry.find(&focus) {
                Some(state) => {
                    let _ = writeln!(out, "  {}", Self::aircraft_row(&state));
                    match self.radar.track_quality(&focus) {
                        Some(quality) => {
                            let _ = writeln!(out, "  Radar track quality: {quality}%");
                        }
                        None => {
                            let _ = writeln!(out, "  No radar track");
                        }
                    }
                }
                None => {
                    let _ = writeln!(out, "  (not in registry)");
                }
            }
        }

        let _ = writeln!(out, "{}", "-".repeat(70));
        out
    }
}

#[async_trait]
impl PeriodicTask for StatusDisplay {
    fn name(&self) -> &str {
        "display"
    }

    fn priority(&self) -> i32 {
        DISPLAY_PRIORITY
    }

    async fn execute(&self) -> Result<TaskFlow, AtcError> {
        if self.settings.is_paused() {
            return Ok(TaskFlow::Continue);
        }
        println!("{}", self.render());
        Ok(TaskFlow::Continue)
    }
}
