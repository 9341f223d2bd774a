//! Two-cadence radar surveillance.
//!
//! The tracker runs at the secondary-surveillance cadence. A primary
//! scan (position detection with bounded noise) fires once enough time
//! has elapsed since the previous one; a secondary interrogation
//! re-broadcasts every live track as a position-update message. Every
//! cycle also ages tracks and evicts the stale ones.

use crate::comm::{Message, MessageBus};
use crate::registry::AircraftRegistry;
use crate::runner::{PeriodicTask, TaskFlow};
use async_trait::async_trait;
use atc_core::geometry::Airspace;
use atc_core::models::AircraftState;
use atc_core::rules::{PSR_SCAN_INTERVAL_MS, RADAR_POSITION_ERROR, RADAR_PRIORITY};
use atc_core::track::RadarTrack;
use atc_core::{AtcError, Position};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::random_range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SENDER_ID: &str = "RADAR";

/// Track table entry: the confidence-scored track plus the last full
/// state it was derived from (with the noisy detected position).
#[derive(Debug, Clone)]
struct TrackEntry {
    track: RadarTrack,
    state: AircraftState,
    last_update: Instant,
}

pub struct RadarTracker {
    registry: Arc<AircraftRegistry>,
    bus: MessageBus,
    airspace: Airspace,
    tracks: DashMap<String, TrackEntry>,
    last_primary: Mutex<Instant>,
    last_secondary: Mutex<Instant>,
    primary_scans: AtomicU64,
    secondary_scans: AtomicU64,
    update_cycles: AtomicU64,
}

impl RadarTracker {
    pub fn new(registry: Arc<AircraftRegistry>, bus: MessageBus, airspace: Airspace) -> Arc<Self> {
        let now = Instant::now();
        let tracker = Arc::new(Self {
            registry,
            bus,
            airspace,
            tracks: DashMap::new(),
            last_primary: Mutex::new(now),
            last_secondary: Mutex::new(now),
            primary_scans: AtomicU64::new(0),
            secondary_scans: AtomicU64::new(0),
            update_cycles: AtomicU64::new(0),
        });
        tracing::info!("radar tracker initialized");
        tracker
    }

    /// Drop the track for a removed aircraft.
    pub fn purge(&self, callsign: &str) {
        if self.tracks.remove(callsign).is_some() {
            tracing::info!(%callsign, "radar track purged");
        }
    }

    /// Tracks confident enough to surface, as state copies.
    pub fn tracked_aircraft(&self) -> Vec<AircraftState> {
        self.tracks
            .iter()
            .filter(|entry| entry.value().track.meets_quality_floor())
            .map(|entry| entry.value().state.clone())
            .collect()
    }

    /// State of one tracked aircraft, if its track meets the floor.
    pub fn track(&self, callsign: &str) -> Option<AircraftState> {
        self.tracks.get(callsign).and_then(|entry| {
            entry
                .value()
                .track
                .meets_quality_floor()
                .then(|| entry.value().state.clone())
        })
    }

    /// Track quality for display purposes, regardless of the floor.
    pub fn track_quality(&self, callsign: &str) -> Option<i32> {
        self.tracks.get(callsign).map(|entry| entry.value().track.quality)
    }

    pub fn is_tracked(&self, callsign: &str) -> bool {
        self.track(callsign).is_some()
    }

    pub fn primary_scan_count(&self) -> u64 {
        self.primary_scans.load(Ordering::Relaxed)
    }

    pub fn secondary_scan_count(&self) -> u64 {
        self.secondary_scans.load(Ordering::Relaxed)
    }

    fn noise(&self) -> f64 {
        random_range(-RADAR_POSITION_ERROR..=RADAR_POSITION_ERROR)
    }

    /// Detect every registered aircraft once, with per-axis noise.
    pub fn perform_primary_scan(&self, now: Instant) {
        let scan_no = self.primary_scans.fetch_add(1, Ordering::Relaxed) + 1;

        for state in self.registry.snapshot() {
            let detected = Position::new(
                state.position.x + self.noise(),
                state.position.y + self.noise(),
                state.position.z + self.noise(),
            );

            // A return outside the volume is a failed detection for
            // this aircraft only; the scan carries on.
            if !detected.is_valid(&self.airspace) {
                tracing::debug!(
                    callsign = %state.callsign,
                    "radar return outside airspace, detection dropped"
                );
                continue;
            }

            let mut observed = state.clone();
            observed.position = detected;

            match self.tracks.entry(state.callsign.clone()) {
                Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    existing.track.observe(detected);
                    existing.state = observed;
                    existing.last_update = now;
                }
                Entry::Vacant(entry) => {
                    entry.insert(TrackEntry {
                        track: RadarTrack::new(detected),
                        state: observed,
                        last_update: now,
                    });
                }
            }
        }

        tracing::debug!(scan = scan_no, tracks = self.tracks.len(), "primary scan complete");
    }

    /// Interrogate every current track: re-broadcast it as a position
    /// update and, when the aircraft still answers (is registered),
    /// refresh the track's currency. Tracks whose aircraft is gone stop
    /// being refreshed and decay out.
    pub fn perform_secondary_interrogation(&self, now: Instant) {
        self.secondary_scans.fetch_add(1, Ordering::Relaxed);

        for mut entry in self.tracks.iter_mut() {
            let callsign = entry.key().clone();
            if self.registry.find(&callsign).is_some() {
                entry.last_update = now;
            }
            let msg = Message::position_update(SENDER_ID, entry.state.clone());
            if let Err(err) = self.bus.send(&msg) {
                tracing::warn!(%callsign, "failed to publish track update: {err}");
            }
        }
    }

    /// Decay stale tracks and evict the dead ones.
    pub fn maintain_tracks(&self, now: Instant) {
        let cycle = self.update_cycles.fetch_add(1, Ordering::Relaxed) + 1;

        for mut entry in self.tracks.iter_mut() {
            let age_ms = now.duration_since(entry.last_update).as_millis() as u64;
            entry.track.age(age_ms);
        }

        self.tracks.retain(|callsign, entry| {
            let age_ms = now.duration_since(entry.last_update).as_millis() as u64;
            let keep = !entry.track.should_evict(age_ms);
            if !keep {
                tracing::info!(%callsign, quality = entry.track.quality, "stale track removed");
            }
            keep
        });

        if cycle % 10 == 0 {
            self.log_track_table();
        }
    }

    fn log_track_table(&self) {
        tracing::info!(
            tracks = self.tracks.len(),
            primary_scans = self.primary_scan_count(),
            secondary_scans = self.secondary_scan_count(),
            "radar track table"
        );
        for entry in self.tracks.iter() {
            let track = &entry.value().track;
            tracing::info!(
                callsign = %entry.key(),
                x = track.position.x,
                y = track.position.y,
                z = track.position.z,
                quality = track.quality,
                "track"
            );
        }
    }

    /// One surveillance cycle at an explicit instant. Split out from
    /// `execute` so tests can drive the cadence directly.
    pub fn run_cycle(&self, now: Instant) {
        {
            let mut last = self
                .last_primary
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if now.duration_since(*last) >= Duration::from_millis(PSR_SCAN_INTERVAL_MS) {
                self.perform_primary_scan(now);
                *last = now;
            }
        }

        {
            let mut last = self
                .last_secondary
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // The task itself runs at the SSR cadence, so every due
            // cycle triggers an interrogation.
            if now.duration_since(*last) >= self.secondary_interval() {
                self.perform_secondary_interrogation(now);
                *last = now;
            }
        }

        self.maintain_tracks(now);
    }

    fn secondary_interval(&self) -> Duration {
        Duration::from_millis(atc_core::rules::SSR_INTERROGATION_INTERVAL_MS)
    }
}

#[async_trait]
impl PeriodicTask for RadarTracker {
    fn name(&self) -> &str {
        "radar"
    }

    fn priority(&self) -> i32 {
        RADAR_PRIORITY
    }

    async fn execute(&self) -> Result<TaskFlow, AtcError> {
        self.run_cycle(Instant::now());
        Ok(TaskFlow::Continue)
    }
}
