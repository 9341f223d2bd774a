//! Per-aircraft state ownership and the periodic position integrator.

use crate::runner::{PeriodicTask, TaskFlow};
use async_trait::async_trait;
use atc_core::geometry::{dead_reckon, Airspace};
use atc_core::ingest::AircraftSeed;
use atc_core::models::{AircraftState, AircraftStatus};
use atc_core::rules::{self, AIRCRAFT_PRIORITY};
use atc_core::{AtcError, Position, Velocity};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A single aircraft under control.
///
/// All reads and mutations go through the internal lock; `state()`
/// returns a copy, so no caller ever observes a partially updated
/// aircraft. Command ordering per aircraft is FIFO by lock acquisition.
pub struct Aircraft {
    state: Mutex<AircraftState>,
    airspace: Airspace,
}

impl Aircraft {
    pub fn new(
        callsign: impl Into<String>,
        position: Position,
        velocity: Velocity,
        airspace: Airspace,
    ) -> Result<Self, AtcError> {
        let callsign = callsign.into();
        if !position.is_valid(&airspace) {
            return Err(AtcError::OutOfRange(format!(
                "initial position for {callsign} outside airspace"
            )));
        }

        let state = AircraftState::new(callsign, position, velocity);
        tracing::info!(
            callsign = %state.callsign,
            x = position.x,
            y = position.y,
            z = position.z,
            speed = state.speed(),
            heading = state.heading,
            "aircraft initialized"
        );

        Ok(Self {
            state: Mutex::new(state),
            airspace,
        })
    }

    pub fn from_seed(seed: &AircraftSeed, airspace: Airspace) -> Result<Self, AtcError> {
        Self::new(seed.callsign.clone(), seed.position, seed.velocity, airspace)
    }

    pub fn callsign(&self) -> String {
        self.lock().callsign.clone()
    }

    /// Copy of the current state.
    pub fn state(&self) -> AircraftState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AircraftState> {
        // Per-aircraft state lock; critical sections stay short and no
        // other lock is ever taken while holding it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advance the position by one integration step.
    ///
    /// Returns `TaskFlow::Stop` once the aircraft leaves the airspace:
    /// the state is marked `Exiting` and the periodic task terminates.
    pub fn advance(&self, dt_secs: f64) -> TaskFlow {
        let mut state = self.lock();

        if state.status == AircraftStatus::Exiting {
            return TaskFlow::Stop;
        }

        let next = dead_reckon(&state.position, &state.velocity, dt_secs);
        if next.is_valid(&self.airspace) {
            state.position = next;
            state.touch();
            if state.status == AircraftStatus::Entering {
                state.status = AircraftStatus::Cruising;
                tracing::info!(callsign = %state.callsign, "entered cruise");
            }
            TaskFlow::Continue
        } else {
            state.status = AircraftStatus::Exiting;
            state.touch();
            tracing::info!(callsign = %state.callsign, "exiting airspace");
            TaskFlow::Stop
        }
    }

    /// Change speed, preserving the current heading. Bounds: [150, 500].
    pub fn update_speed(&self, speed: f64) -> Result<(), AtcError> {
        if !rules::speed_in_limits(speed) {
            return Err(AtcError::OutOfRange(format!(
                "speed {speed} outside [{}, {}]",
                rules::MIN_SPEED,
                rules::MAX_SPEED
            )));
        }

        let mut state = self.lock();
        let heading = state.heading;
        state.velocity.set_from_speed_and_heading(speed, heading);
        state.update_heading();
        state.touch();
        tracing::debug!(callsign = %state.callsign, speed, "speed updated");
        Ok(())
    }

    /// Change heading, preserving the current horizontal speed.
    /// Bounds: [0, 360).
    pub fn update_heading(&self, heading: f64) -> Result<(), AtcError> {
        if !rules::heading_in_limits(heading) {
            return Err(AtcError::OutOfRange(format!(
                "heading {heading} outside [0, 360)"
            )));
        }

        let mut state = self.lock();
        let speed = state.velocity.ground_speed();
        state.velocity.set_from_speed_and_heading(speed, heading);
        state.heading = heading;
        state.touch();
        tracing::debug!(callsign = %state.callsign, heading, "heading updated");
        Ok(())
    }

    /// Change altitude. Bounds: the airspace altitude band.
    pub fn update_altitude(&self, altitude: f64) -> Result<(), AtcError> {
        if !self.airspace.altitude_valid(altitude) {
            return Err(AtcError::OutOfRange(format!(
                "altitude {altitude} outside [{}, {}]",
                self.airspace.z_min, self.airspace.z_max
            )));
        }

        let mut state = self.lock();
        state.position.z = altitude;
        state.touch();
        tracing::debug!(callsign = %state.callsign, altitude, "altitude updated");
        Ok(())
    }

    pub fn declare_emergency(&self) {
        let mut state = self.lock();
        state.status = AircraftStatus::Emergency;
        state.touch();
        tracing::warn!(callsign = %state.callsign, "emergency declared");
    }

    /// Cancel an emergency, restoring normal cruise.
    pub fn cancel_emergency(&self) {
        let mut state = self.lock();
        if state.status == AircraftStatus::Emergency {
            state.status = AircraftStatus::Cruising;
            state.touch();
            tracing::info!(callsign = %state.callsign, "emergency cancelled");
        }
    }
}

/// The periodic integrator for one aircraft.
pub struct AircraftTask {
    aircraft: Arc<Aircraft>,
    name: String,
    dt_secs: f64,
}

impl AircraftTask {
    pub fn new(aircraft: Arc<Aircraft>, period: Duration) -> Self {
        let name = format!("aircraft/{}", aircraft.callsign());
        Self {
            aircraft,
            name,
            dt_secs: period.as_secs_f64(),
        }
    }
}

#[async_trait]
impl PeriodicTask for AircraftTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        AIRCRAFT_PRIORITY
    }

    async fn execute(&self) -> Result<TaskFlow, AtcError> {
        Ok(self.aircraft.advance(self.dt_secs))
    }
}
