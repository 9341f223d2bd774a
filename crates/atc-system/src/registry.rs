//! Shared aircraft registry.
//!
//! The registry is the only mutable structure shared across component
//! boundaries. It maps callsigns to their owning [`Aircraft`] handles
//! and hands out consistent snapshots: each returned state is an atomic
//! copy of one aircraft, though ages may differ across aircraft.

use crate::aircraft::Aircraft;
use atc_core::models::AircraftState;
use dashmap::DashMap;
use std::sync::{Arc, RwLock};

type PurgeHook = Box<dyn Fn(&str) + Send + Sync>;

pub struct AircraftRegistry {
    aircraft: DashMap<String, Arc<Aircraft>>,
    /// Called with the callsign on removal so dependent state (radar
    /// tracks, warning cooldowns) is purged with the aircraft.
    purge_hooks: RwLock<Vec<PurgeHook>>,
}

impl AircraftRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            aircraft: DashMap::new(),
            purge_hooks: RwLock::new(Vec::new()),
        })
    }

    /// Register a hook run on every removal.
    pub fn on_remove(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.purge_hooks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(hook));
    }

    /// Add an aircraft. Re-adding a callsign replaces the old handle.
    pub fn add(&self, aircraft: Arc<Aircraft>) -> Option<Arc<Aircraft>> {
        let callsign = aircraft.callsign();
        let replaced = self.aircraft.insert(callsign.clone(), aircraft);
        if replaced.is_some() {
            tracing::info!(%callsign, "aircraft replaced in registry");
        } else {
            tracing::info!(%callsign, "aircraft added to registry");
        }
        replaced
    }

    /// Remove an aircraft and purge its dependent state.
    pub fn remove(&self, callsign: &str) -> Option<Arc<Aircraft>> {
        let removed = self.aircraft.remove(callsign).map(|(_, aircraft)| aircraft);
        if removed.is_some() {
            let hooks = self
                .purge_hooks
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for hook in hooks.iter() {
                hook(callsign);
            }
            tracing::info!(%callsign, "aircraft removed from registry");
        }
        removed
    }

    /// Owning handle for direct command dispatch.
    pub fn get(&self, callsign: &str) -> Option<Arc<Aircraft>> {
        self.aircraft.get(callsign).map(|entry| Arc::clone(entry.value()))
    }

    /// State copy for one aircraft.
    pub fn find(&self, callsign: &str) -> Option<AircraftState> {
        self.aircraft.get(callsign).map(|entry| entry.value().state())
    }

    /// Consistent per-aircraft snapshot of the whole registry.
    pub fn snapshot(&self) -> Vec<AircraftState> {
        self.aircraft
            .iter()
            .map(|entry| entry.value().state())
            .collect()
    }

    pub fn callsigns(&self) -> Vec<String> {
        self.aircraft.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }
}
