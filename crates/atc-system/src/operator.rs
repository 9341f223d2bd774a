//! Operator command processing and the stdin console.
//!
//! Input lines are tokenised into the post-parse command shape and
//! dispatched synchronously: aircraft commands mutate state through the
//! registry and report success or failure to the caller immediately;
//! system commands adjust the display or request shutdown.

use crate::comm::{CommandData, Message, MessageBus};
use crate::display::DisplaySettings;
use crate::engine::SeparationEngine;
use crate::radar::RadarTracker;
use crate::registry::AircraftRegistry;
use crate::runner::PeriodCell;
use atc_core::models::validate_callsign;
use atc_core::AtcError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SENDER_ID: &str = "OPERATOR";

/// Display refresh-rate bounds, seconds.
const MIN_DISPLAY_RATE_SECS: u64 = 2;
const MAX_DISPLAY_RATE_SECS: u64 = 30;

/// The post-parse operator command shape.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Altitude { callsign: String, value: f64 },
    Speed { callsign: String, value: f64 },
    Heading { callsign: String, value: f64 },
    Emergency { callsign: String, active: bool },
    Status { callsign: Option<String> },
    Track { callsign: Option<String> },
    Help { topic: Option<String> },
    DisplayRate { secs: u64 },
    Pause,
    Resume,
    Clear,
    Exit,
}

fn invalid(msg: impl Into<String>) -> AtcError {
    AtcError::InvalidInput(msg.into())
}

fn parse_value(raw: &str, what: &str) -> Result<f64, AtcError> {
    raw.parse::<f64>()
        .map_err(|_| invalid(format!("unparseable {what}: '{raw}'")))
}

fn require_callsign(tokens: &[&str], cmd: &str) -> Result<String, AtcError> {
    let id = tokens
        .get(1)
        .ok_or_else(|| invalid(format!("{cmd} requires an aircraft id")))?;
    validate_callsign(id)?;
    Ok((*id).to_string())
}

fn require_param<'a>(tokens: &[&'a str], cmd: &str) -> Result<&'a str, AtcError> {
    tokens
        .get(2)
        .copied()
        .ok_or_else(|| invalid(format!("{cmd} requires a value")))
}

/// Tokenise and parse one input line.
pub fn parse_command(line: &str) -> Result<OperatorCommand, AtcError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return Err(invalid("empty command"));
    };
    let cmd = first.to_ascii_uppercase();

    match cmd.as_str() {
        "ALT" | "ALTITUDE" => Ok(OperatorCommand::Altitude {
            callsign: require_callsign(&tokens, &cmd)?,
            value: parse_value(require_param(&tokens, &cmd)?, "altitude")?,
        }),
        "SPD" | "SPEED" => Ok(OperatorCommand::Speed {
            callsign: require_callsign(&tokens, &cmd)?,
            value: parse_value(require_param(&tokens, &cmd)?, "speed")?,
        }),
        "HDG" | "HEADING" => Ok(OperatorCommand::Heading {
            callsign: require_callsign(&tokens, &cmd)?,
            value: parse_value(require_param(&tokens, &cmd)?, "heading")?,
        }),
        "EMERG" | "EMERGENCY" => {
            let callsign = require_callsign(&tokens, &cmd)?;
            let active = match require_param(&tokens, &cmd)?.to_ascii_uppercase().as_str() {
                "ON" => true,
                "OFF" => false,
                other => return Err(invalid(format!("expected ON or OFF, got '{other}'"))),
            };
            Ok(OperatorCommand::Emergency { callsign, active })
        }
        "STATUS" => {
            let callsign = match tokens.get(1) {
                Some(id) => {
                    validate_callsign(id)?;
                    Some((*id).to_string())
                }
                None => None,
            };
            Ok(OperatorCommand::Status { callsign })
        }
        "TRACK" => {
            let target = tokens
                .get(1)
                .ok_or_else(|| invalid("TRACK requires an aircraft id or NONE"))?;
            if target.eq_ignore_ascii_case("NONE") {
                Ok(OperatorCommand::Track { callsign: None })
            } else {
                validate_callsign(target)?;
                Ok(OperatorCommand::Track {
                    callsign: Some((*target).to_string()),
                })
            }
        }
        "HELP" => Ok(OperatorCommand::Help {
            topic: tokens.get(1).map(|t| t.to_ascii_uppercase()),
        }),
        "DISPLAY" => {
            let raw = tokens
                .get(1)
                .ok_or_else(|| invalid("DISPLAY requires a rate in seconds"))?;
            let secs = raw
                .parse::<u64>()
                .map_err(|_| invalid(format!("unparseable display rate: '{raw}'")))?;
            if !(MIN_DISPLAY_RATE_SECS..=MAX_DISPLAY_RATE_SECS).contains(&secs) {
                return Err(AtcError::OutOfRange(format!(
                    "display rate must be {MIN_DISPLAY_RATE_SECS}-{MAX_DISPLAY_RATE_SECS} seconds"
                )));
            }
            Ok(OperatorCommand::DisplayRate { secs })
        }
        "PAUSE" => Ok(OperatorCommand::Pause),
        "RESUME" => Ok(OperatorCommand::Resume),
        "CLEAR" => Ok(OperatorCommand::Clear),
        "EXIT" => Ok(OperatorCommand::Exit),
        other => Err(invalid(format!("unknown command: {other}"))),
    }
}

const HELP_TEXT: &str = "\
Available Air Traffic Control Commands:
----------------------------------------
ALT <id> <value>      - Change aircraft altitude (15000-25000)
SPD <id> <value>      - Change aircraft speed (150-500 units)
HDG <id> <value>      - Change aircraft heading (0-359 degrees)
EMERG <id> ON|OFF     - Declare or cancel an emergency
STATUS [id]           - System or per-aircraft status
TRACK <id>|NONE       - Focus the display on one aircraft
DISPLAY <rate>        - Set display refresh rate (2-30 seconds)
PAUSE / RESUME        - Pause or resume display updates
CLEAR                 - Clear the screen
HELP [cmd]            - Show help
EXIT                  - Shut the system down

Example: ALT AC001 20000";

/// Synchronous command dispatch against the live system.
pub struct CommandExecutor {
    registry: Arc<AircraftRegistry>,
    engine: Arc<SeparationEngine>,
    radar: Arc<RadarTracker>,
    display: Arc<DisplaySettings>,
    display_period: Arc<PeriodCell>,
    bus: MessageBus,
    shutdown: CancellationToken,
}

impl CommandExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<AircraftRegistry>,
        engine: Arc<SeparationEngine>,
        radar: Arc<RadarTracker>,
        display: Arc<DisplaySettings>,
        display_period: Arc<PeriodCell>,
        bus: MessageBus,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            engine,
            radar,
            display,
            display_period,
            bus,
            shutdown,
        })
    }

    fn aircraft_status(&self, callsign: &str) -> Result<String, AtcError> {
        let state = self
            .registry
            .find(callsign)
            .ok_or_else(|| invalid(format!("unknown aircraft: {callsign}")))?;

        let tracked = if self.radar.is_tracked(callsign) {
            "tracked"
        } else {
            "not tracked"
        };
        Ok(format!(
            "{}: pos ({:.0}, {:.0}, {:.0}) speed {:.1} heading {:.1} status {} radar {}",
            state.callsign,
            state.position.x,
            state.position.y,
            state.position.z,
            state.speed(),
            state.heading,
            state.status,
            tracked
        ))
    }

    fn system_status(&self) -> String {
        format!(
            "Aircraft: {}  Violation checks: {}  Violations: {}  Advisories: {}  Radar scans: {}/{}",
            self.registry.len(),
            self.engine.checks_performed(),
            self.engine.violations_detected(),
            self.engine.advisories_emitted(),
            self.radar.primary_scan_count(),
            self.radar.secondary_scan_count(),
        )
    }

    /// Execute one parsed command, returning the operator-visible
    /// output. Errors surface synchronously; no message is emitted for
    /// a failed command.
    pub fn execute(&self, command: OperatorCommand) -> Result<String, AtcError> {
        match command {
            OperatorCommand::Altitude { callsign, value } => {
                let aircraft = self
                    .registry
                    .get(&callsign)
                    .ok_or_else(|| invalid(format!("unknown aircraft: {callsign}")))?;
                aircraft.update_altitude(value)?;
                self.record_input(&callsign, "ALTITUDE", &format!("{value}"));
                Ok(format!("{callsign} altitude set to {value:.0}"))
            }
            OperatorCommand::Speed { callsign, value } => {
                let aircraft = self
                    .registry
                    .get(&callsign)
                    .ok_or_else(|| invalid(format!("unknown aircraft: {callsign}")))?;
                aircraft.update_speed(value)?;
                self.record_input(&callsign, "SPEED", &format!("{value}"));
                Ok(format!("{callsign} speed set to {value:.0}"))
            }
            OperatorCommand::Heading { callsign, value } => {
                let aircraft = self
                    .registry
                    .get(&callsign)
                    .ok_or_else(|| invalid(format!("unknown aircraft: {callsign}")))?;
                aircraft.update_heading(value)?;
                self.record_input(&callsign, "HEADING", &format!("{value}"));
                Ok(format!("{callsign} heading set to {value:.1}"))
            }
            OperatorCommand::Emergency { callsign, active } => {
                let aircraft = self
                    .registry
                    .get(&callsign)
                    .ok_or_else(|| invalid(format!("unknown aircraft: {callsign}")))?;
                if active {
                    aircraft.declare_emergency();
                } else {
                    aircraft.cancel_emergency();
                }
                self.record_input(&callsign, "EMERGENCY", if active { "ON" } else { "OFF" });
                Ok(format!(
                    "{callsign} emergency {}",
                    if active { "declared" } else { "cancelled" }
                ))
            }
            OperatorCommand::Status { callsign } => {
                let text = match &callsign {
                    Some(id) => self.aircraft_status(id)?,
                    None => self.system_status(),
                };
                let target = callsign.as_deref().unwrap_or("SYSTEM");
                let response = Message::operator_response(SENDER_ID, target, text.clone());
                if let Err(err) = self.bus.send(&response) {
                    tracing::warn!("failed to publish status response: {err}");
                }
                Ok(text)
            }
            OperatorCommand::Track { callsign } => {
                let text = match &callsign {
                    Some(id) => {
                        if self.registry.find(id).is_none() {
                            return Err(invalid(format!("unknown aircraft: {id}")));
                        }
                        format!("tracking {id}")
                    }
                    None => "tracking cleared".to_string(),
                };
                self.display.set_focus(callsign);
                Ok(text)
            }
            OperatorCommand::Help { topic: _ } => Ok(HELP_TEXT.to_string()),
            OperatorCommand::DisplayRate { secs } => {
                self.display_period.set(Duration::from_secs(secs));
                Ok(format!("display refresh rate set to {secs} seconds"))
            }
            OperatorCommand::Pause => {
                self.display.pause();
                Ok("display updates paused".to_string())
            }
            OperatorCommand::Resume => {
                self.display.resume();
                Ok("display updates resumed".to_string())
            }
            OperatorCommand::Clear => Ok("\x1b[2J\x1b[H".to_string()),
            OperatorCommand::Exit => {
                self.shutdown.cancel();
                Ok("shutting down".to_string())
            }
        }
    }

    /// Parse and execute a raw input line.
    pub fn execute_line(&self, line: &str) -> Result<String, AtcError> {
        self.execute(parse_command(line)?)
    }

    fn record_input(&self, target: &str, command: &str, param: &str) {
        let data = CommandData::new(target, command).with_param(param);
        if let Err(err) = self.bus.send(&Message::operator_input(SENDER_ID, data)) {
            tracing::debug!("operator input not recorded: {err}");
        }
    }
}

/// Read operator input lines until shutdown.
///
/// Stdin reads are blocking and uncancellable, so a dedicated input
/// thread feeds the async loop through a channel. The thread is
/// detached; it ends with the process.
pub async fn run_console(executor: Arc<CommandExecutor>, token: CancellationToken) {
    let (tx, mut lines) = mpsc::unbounded_channel::<String>();

    let reader = std::thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            use std::io::BufRead;
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!("console read failed: {err}");
                        break;
                    }
                }
            }
        });
    if let Err(err) = reader {
        tracing::error!("failed to start console input thread: {err}");
        return;
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            line = lines.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match executor.execute_line(&line) {
                    Ok(output) => println!("{output}"),
                    Err(err) => println!("Error: {err}"),
                }
            }
        }
    }

    tracing::info!("operator console stopped");
}
