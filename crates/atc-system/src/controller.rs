//! System composition: wiring, lifecycle, ingest and message routing.
//!
//! The controller owns every component and the shutdown order. All
//! cross-component traffic that is not a registry snapshot flows
//! through the message bus; the controller's pump applies inbound
//! commands to aircraft and logs alerts.

use crate::aircraft::{Aircraft, AircraftTask};
use crate::comm::{
    message_channel, AlertLevel, Message, MessageBus, MessagePayload, MessageReceiver, MessageType,
};
use crate::config::Config;
use crate::display::{DisplaySettings, StatusDisplay};
use crate::engine::SeparationEngine;
use crate::history::HistoryLogger;
use crate::operator::{run_console, CommandExecutor};
use crate::radar::RadarTracker;
use crate::registry::AircraftRegistry;
use crate::runner::{spawn_periodic, spawn_periodic_with_cell, PeriodCell, PeriodicHandle};
use atc_core::ingest::{self, AircraftSeed};
use atc_core::rules::{
    DISPLAY_UPDATE_INTERVAL_MS, HISTORY_LOGGING_INTERVAL_MS, POSITION_UPDATE_INTERVAL_MS,
    SSR_INTERROGATION_INTERVAL_MS,
};
use atc_core::AtcError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Controller {
    config: Config,
    registry: Arc<AircraftRegistry>,
    radar: Arc<RadarTracker>,
    engine: Arc<SeparationEngine>,
    history: Arc<HistoryLogger>,
    display: Arc<StatusDisplay>,
    display_settings: Arc<DisplaySettings>,
    display_period: Arc<PeriodCell>,
    bus: MessageBus,
    inbound: Mutex<Option<MessageReceiver>>,
    shutdown: CancellationToken,

    aircraft_tasks: Mutex<HashMap<String, PeriodicHandle>>,
    service_tasks: Mutex<Vec<NamedTask>>,
}

enum NamedTask {
    Periodic(&'static str, PeriodicHandle),
    Plain(&'static str, JoinHandle<()>),
}

impl Controller {
    pub fn new(config: Config) -> Arc<Self> {
        let registry = AircraftRegistry::new();
        let (bus, inbound) = message_channel();

        let radar = RadarTracker::new(Arc::clone(&registry), bus.clone(), config.airspace);
        let engine = SeparationEngine::new(
            Arc::clone(&registry),
            bus.clone(),
            config.rules.clone(),
            config.airspace,
        );
        let history = HistoryLogger::new(&config.history_path, Arc::clone(&registry));
        let display_settings = DisplaySettings::new();
        let display = StatusDisplay::new(
            Arc::clone(&registry),
            Arc::clone(&engine),
            Arc::clone(&radar),
            Arc::clone(&display_settings),
        );

        // Removing an aircraft purges its dependent state everywhere.
        // Weak handles keep the registry from owning its own consumers.
        {
            let radar = Arc::downgrade(&radar);
            registry.on_remove(move |callsign| {
                if let Some(radar) = radar.upgrade() {
                    radar.purge(callsign);
                }
            });
            let engine = Arc::downgrade(&engine);
            registry.on_remove(move |callsign| {
                if let Some(engine) = engine.upgrade() {
                    engine.purge(callsign);
                }
            });
        }

        Arc::new(Self {
            config,
            registry,
            radar,
            engine,
            history,
            display,
            display_settings,
            display_period: PeriodCell::new(Duration::from_millis(DISPLAY_UPDATE_INTERVAL_MS)),
            bus,
            inbound: Mutex::new(Some(inbound)),
            shutdown: CancellationToken::new(),
            aircraft_tasks: Mutex::new(HashMap::new()),
            service_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn registry(&self) -> Arc<AircraftRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn engine(&self) -> Arc<SeparationEngine> {
        Arc::clone(&self.engine)
    }

    pub fn radar(&self) -> Arc<RadarTracker> {
        Arc::clone(&self.radar)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Load the aircraft CSV and register every accepted row.
    ///
    /// Fails only when not a single aircraft was accepted.
    pub fn ingest_file(&self, path: impl AsRef<Path>) -> Result<usize, AtcError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| AtcError::Fatal(format!("cannot read {}: {err}", path.display())))?;

        let report = ingest::parse_document(&contents, &self.config.airspace);
        for rejection in &report.rejected {
            tracing::error!(
                line = rejection.line_no,
                "ingest row rejected: {}",
                rejection.error
            );
        }

        let mut added = 0;
        for seed in &report.accepted {
            match self.add_aircraft(seed) {
                Ok(()) => added += 1,
                Err(err) => tracing::error!(callsign = %seed.callsign, "ingest failed: {err}"),
            }
        }

        if added == 0 {
            return Err(AtcError::Fatal(format!(
                "no aircraft loaded from {}",
                path.display()
            )));
        }

        tracing::info!(count = added, rejected = report.rejected.len(), "aircraft loaded");
        Ok(added)
    }

    /// Register one aircraft and start its position integrator.
    pub fn add_aircraft(&self, seed: &AircraftSeed) -> Result<(), AtcError> {
        let aircraft = Arc::new(Aircraft::from_seed(seed, self.config.airspace)?);
        self.registry.add(Arc::clone(&aircraft));

        let period = Duration::from_millis(POSITION_UPDATE_INTERVAL_MS);
        let handle = spawn_periodic(Arc::new(AircraftTask::new(aircraft, period)), period);
        self.aircraft_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(seed.callsign.clone(), handle);
        Ok(())
    }

    /// Stop one aircraft's task and remove it from the registry.
    pub async fn remove_aircraft(&self, callsign: &str) {
        let handle = self
            .aircraft_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(callsign);
        if let Some(handle) = handle {
            handle.stop().await;
        }
        self.registry.remove(callsign);
    }

    /// Start the service tasks: radar, separation, display, history,
    /// and the message pump.
    pub fn start(self: &Arc<Self>) {
        let mut services = self
            .service_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        services.push(NamedTask::Periodic(
            "radar",
            spawn_periodic(
                Arc::clone(&self.radar) as Arc<dyn crate::runner::PeriodicTask>,
                Duration::from_millis(SSR_INTERROGATION_INTERVAL_MS),
            ),
        ));

        services.push(NamedTask::Periodic(
            "separation",
            spawn_periodic_with_cell(
                Arc::clone(&self.engine) as Arc<dyn crate::runner::PeriodicTask>,
                self.engine.period(),
            ),
        ));

        services.push(NamedTask::Periodic(
            "display",
            spawn_periodic_with_cell(
                Arc::clone(&self.display) as Arc<dyn crate::runner::PeriodicTask>,
                Arc::clone(&self.display_period),
            ),
        ));

        services.push(NamedTask::Periodic(
            "history",
            spawn_periodic(
                Arc::clone(&self.history) as Arc<dyn crate::runner::PeriodicTask>,
                Duration::from_millis(HISTORY_LOGGING_INTERVAL_MS),
            ),
        ));

        let inbound = self
            .inbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(inbound) = inbound {
            let controller = Arc::clone(self);
            services.push(NamedTask::Plain(
                "pump",
                tokio::spawn(async move { controller.pump_messages(inbound).await }),
            ));
        }

        tracing::info!("system started");
    }

    /// Start the interactive operator console. Kept separate from
    /// `start` so headless runs (and tests) never touch stdin.
    pub fn start_console(&self) {
        let executor = CommandExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.engine),
            Arc::clone(&self.radar),
            Arc::clone(&self.display_settings),
            Arc::clone(&self.display_period),
            self.bus.clone(),
            self.shutdown.clone(),
        );
        self.service_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(NamedTask::Plain(
                "operator",
                tokio::spawn(run_console(executor, self.shutdown.clone())),
            ));
    }

    /// Apply one inbound command message to its target aircraft.
    fn apply_command(&self, target_id: &str, command: &str, params: &[String]) {
        let Some(aircraft) = self.registry.get(target_id) else {
            tracing::warn!(target = %target_id, "command for unknown aircraft dropped");
            return;
        };

        let first_param = params.first().map(String::as_str);
        let outcome = match (command, first_param) {
            ("ALTITUDE", Some(raw)) => raw
                .parse::<f64>()
                .map_err(|_| AtcError::InvalidInput(format!("bad altitude '{raw}'")))
                .and_then(|value| aircraft.update_altitude(value)),
            ("SPEED", Some(raw)) => raw
                .parse::<f64>()
                .map_err(|_| AtcError::InvalidInput(format!("bad speed '{raw}'")))
                .and_then(|value| aircraft.update_speed(value)),
            ("HEADING", Some(raw)) => raw
                .parse::<f64>()
                .map_err(|_| AtcError::InvalidInput(format!("bad heading '{raw}'")))
                .and_then(|value| aircraft.update_heading(value)),
            ("EMERGENCY", Some("ON")) => {
                aircraft.declare_emergency();
                Ok(())
            }
            ("EMERGENCY", Some("OFF")) => {
                aircraft.cancel_emergency();
                Ok(())
            }
            _ => Err(AtcError::InvalidInput(format!(
                "unsupported command '{command}'"
            ))),
        };

        if let Err(err) = outcome {
            tracing::warn!(target = %target_id, command, "command rejected: {err}");
        }
    }

    async fn pump_messages(self: Arc<Self>, mut inbound: MessageReceiver) {
        loop {
            let msg = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                msg = inbound.recv() => msg,
            };

            let Some(msg) = msg else { break };
            let msg: Message = match msg {
                Ok(msg) => msg,
                Err(err) => {
                    tracing::warn!("undecodable frame dropped: {err}");
                    continue;
                }
            };

            match (&msg.message_type, &msg.payload) {
                (MessageType::Command, MessagePayload::Command(data)) => {
                    self.apply_command(&data.target_id, &data.command, &data.params);
                }
                (MessageType::Alert, MessagePayload::Alert(alert)) => match alert.level {
                    AlertLevel::Emergency | AlertLevel::Critical => {
                        tracing::error!(sender = %msg.sender_id, "ALERT: {}", alert.description);
                    }
                    AlertLevel::Warning => {
                        tracing::warn!(sender = %msg.sender_id, "ALERT: {}", alert.description);
                    }
                    AlertLevel::Info => {
                        tracing::info!(sender = %msg.sender_id, "ALERT: {}", alert.description);
                    }
                },
                (MessageType::PositionUpdate, MessagePayload::AircraftState(state)) => {
                    tracing::trace!(callsign = %state.callsign, "track update");
                }
                (MessageType::StatusRequest, MessagePayload::Command(data)) => {
                    let text = match self.registry.find(&data.target_id) {
                        Some(state) => format!("{}: {}", state.callsign, state.status),
                        None => format!("{}: unknown", data.target_id),
                    };
                    let response = Message::status_response("CONTROL", &data.target_id, text);
                    if let Err(err) = self.bus.send(&response) {
                        tracing::warn!("failed to answer status request: {err}");
                    }
                }
                _ => {
                    tracing::trace!(message_type = ?msg.message_type, "message ignored");
                }
            }
        }

        tracing::info!("message pump stopped");
    }

    fn log_system_status(&self, started: std::time::Instant) {
        tracing::info!(
            uptime_secs = started.elapsed().as_secs(),
            aircraft = self.registry.len(),
            violation_checks = self.engine.checks_performed(),
            violations = self.engine.violations_detected(),
            advisories = self.engine.advisories_emitted(),
            primary_scans = self.radar.primary_scan_count(),
            secondary_scans = self.radar.secondary_scan_count(),
            "system status"
        );
    }

    /// Block until an operator EXIT or an OS termination signal,
    /// reporting system metrics periodically.
    pub async fn run_until_shutdown(&self) {
        let started = std::time::Instant::now();
        let mut metrics = tokio::time::interval(Duration::from_secs(30));
        metrics.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Consume the interval's immediate first tick.
        metrics.tick().await;

        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {err}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    tracing::error!("failed to listen for SIGTERM: {err}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::pin!(ctrl_c);
        tokio::pin!(terminate);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown requested by operator");
                    break;
                }
                _ = &mut ctrl_c => {
                    tracing::info!("interrupt received");
                    break;
                }
                _ = &mut terminate => {
                    tracing::info!("termination signal received");
                    break;
                }
                _ = metrics.tick() => self.log_system_status(started),
            }
        }
    }

    /// Stop everything in reverse dependency order:
    /// history, display, operator, separation, radar, aircraft, channel.
    pub async fn shutdown(&self) {
        tracing::info!("initiating system shutdown");
        self.shutdown.cancel();

        let services = {
            let mut guard = self
                .service_tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };

        let mut by_name: HashMap<&'static str, NamedTask> = HashMap::new();
        for task in services {
            let name = match &task {
                NamedTask::Periodic(name, _) => *name,
                NamedTask::Plain(name, _) => *name,
            };
            by_name.insert(name, task);
        }

        for name in ["history", "display", "operator", "separation", "radar"] {
            match by_name.remove(name) {
                Some(NamedTask::Periodic(_, handle)) => handle.stop().await,
                Some(NamedTask::Plain(_, handle)) => {
                    // The console blocks on stdin; cancellation has been
                    // requested, so just detach it.
                    handle.abort();
                    let _ = handle.await;
                }
                None => {}
            }
        }

        let aircraft = {
            let mut guard = self
                .aircraft_tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        for (_, handle) in aircraft {
            handle.stop().await;
        }

        if let Some(NamedTask::Plain(_, pump)) = by_name.remove("pump") {
            let _ = pump.await;
        }

        tracing::info!("system shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atc_core::ingest::CSV_HEADER;
    use atc_core::models::AircraftStatus;
    use std::path::PathBuf;

    fn temp_csv(name: &str, rows: &[&str]) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("atc-ingest-{name}-{}.csv", std::process::id()));
        let mut contents = String::from(CSV_HEADER);
        for row in rows {
            contents.push('\n');
            contents.push_str(row);
        }
        std::fs::write(&path, contents).expect("write csv");
        path
    }

    fn test_config(name: &str) -> Config {
        let mut history = std::env::temp_dir();
        history.push(format!("atc-ctl-history-{name}-{}.log", std::process::id()));
        Config {
            history_path: history.to_string_lossy().into_owned(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn ingest_loads_valid_rows_and_skips_bad_ones() {
        let controller = Controller::new(test_config("ingest"));
        let path = temp_csv(
            "mixed",
            &[
                "0.0,AC001,10000,20000,20000,300,0,0",
                "0.0,AC002,90000,20000,21000,-300,0,0",
                "0.0,AC003,50000,50000,19000,0,250,0",
                "0.0,AC004,50000,50000",
                "0.0,AC005,30000,30000,22000,0,-200,0",
                "0.0,AC006,500000,50000,20000,200,0,0",
                "0.0,AC007,70000,10000,23000,180,0,0",
            ],
        );

        let added = controller.ingest_file(&path).expect("load succeeds");
        assert_eq!(added, 5);
        assert_eq!(controller.registry().len(), 5);
        assert!(controller.registry().find("AC004").is_none());
        assert!(controller.registry().find("AC006").is_none());

        controller.shutdown().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn ingest_fails_with_no_valid_rows() {
        let controller = Controller::new(test_config("empty"));
        let path = temp_csv("bad", &["garbage", "1,2,3"]);

        let err = controller.ingest_file(&path).unwrap_err();
        assert!(matches!(err, AtcError::Fatal(_)));

        controller.shutdown().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let controller = Controller::new(test_config("missing"));
        let err = controller
            .ingest_file("/nonexistent/aircraft.csv")
            .unwrap_err();
        assert!(matches!(err, AtcError::Fatal(_)));
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn aircraft_tasks_advance_positions() {
        let controller = Controller::new(test_config("advance"));
        let path = temp_csv("advance", &["0.0,AC001,10000,20000,20000,300,0,0"]);
        controller.ingest_file(&path).expect("load");

        // Aircraft tasks start with ingest; give one a couple cycles.
        let initial_x = controller.registry().find("AC001").unwrap().position.x;
        tokio::time::sleep(Duration::from_millis(2200)).await;
        let state = controller.registry().find("AC001").unwrap();
        assert!(state.position.x > initial_x);
        assert_eq!(state.status, AircraftStatus::Cruising);

        controller.shutdown().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn remove_aircraft_purges_dependents() {
        let controller = Controller::new(test_config("remove"));
        let path = temp_csv("remove", &["0.0,AC001,10000,20000,20000,300,0,0"]);
        controller.ingest_file(&path).expect("load");

        // Force a radar track, then remove the aircraft.
        let radar = controller.radar();
        radar.perform_primary_scan(std::time::Instant::now());
        assert!(radar.track_quality("AC001").is_some());

        controller.remove_aircraft("AC001").await;
        assert!(controller.registry().find("AC001").is_none());
        assert!(radar.track_quality("AC001").is_none());

        controller.shutdown().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn engine_commands_flow_back_to_aircraft() {
        let controller = Controller::new(test_config("flow"));
        let path = temp_csv(
            "flow",
            &[
                "0.0,AC001,60000,50000,20000,-400,0,0",
                "0.0,AC002,40000,50000,20000,400,0,0",
            ],
        );
        controller.ingest_file(&path).expect("load");
        controller.start();

        // Head-on pair: the engine predicts a conflict, proposes a
        // descent for the lower aircraft (tie-broken), and the pump
        // applies the command.
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let z1 = controller.registry().find("AC001").unwrap().position.z;
        let z2 = controller.registry().find("AC002").unwrap().position.z;
        assert!(
            (z1 - 19_000.0).abs() < 1e-6 || (z2 - 19_000.0).abs() < 1e-6,
            "one aircraft should have been descended: z1={z1} z2={z2}"
        );

        controller.shutdown().await;
        let _ = std::fs::remove_file(&controller.config.history_path);
        let _ = std::fs::remove_file(&path);
    }
}
