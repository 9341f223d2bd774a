//! Runtime configuration from environment, with an optional JSON
//! rules file.
//!
//! `ATC_RULES_PATH` may point at a JSON document overriding the
//! separation rules and/or airspace bounds; individual `ATC_*`
//! environment variables are applied on top of it.

use atc_core::rules::SeparationRules;
use atc_core::{Airspace, AtcError};
use serde::Deserialize;
use std::env;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
    pub history_path: String,
    pub rules: SeparationRules,
    pub airspace: Airspace,
}

/// On-disk override file. Both sections are optional.
#[derive(Debug, Deserialize)]
struct RulesFile {
    separation: Option<SeparationRules>,
    airspace: Option<Airspace>,
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|raw| raw.parse().ok())
}

/// Parse a rules file.
fn load_rules_file(path: &Path) -> Result<RulesFile, AtcError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| AtcError::TransientIo(format!("read {}: {err}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|err| AtcError::InvalidInput(format!("parse {}: {err}", path.display())))
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = env::var("ATC_RULES_PATH") {
            match load_rules_file(Path::new(&path)) {
                Ok(file) => {
                    if let Some(separation) = file.separation {
                        config.rules = separation;
                    }
                    if let Some(airspace) = file.airspace {
                        config.airspace = airspace;
                    }
                    tracing::info!(%path, "rules file applied");
                }
                Err(err) => {
                    tracing::warn!(%path, "rules file ignored: {err}");
                }
            }
        }

        if let Some(lookahead) = env_f64("ATC_LOOKAHEAD_SECS") {
            config.rules.set_lookahead(lookahead);
        }
        if let Some(h_min) = env_f64("ATC_MIN_HORIZONTAL_SEPARATION") {
            if h_min > 0.0 {
                config.rules.min_horizontal_separation = h_min;
            }
        }
        if let Some(v_min) = env_f64("ATC_MIN_VERTICAL_SEPARATION") {
            if v_min > 0.0 {
                config.rules.min_vertical_separation = v_min;
            }
        }
        if let Ok(history_path) = env::var("ATC_HISTORY_PATH") {
            config.history_path = history_path;
        }

        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_path: "atc_history.log".to_string(),
            rules: SeparationRules::default(),
            airspace: Airspace::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_rules(name: &str, contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("atc-rules-{name}-{}.json", std::process::id()));
        std::fs::write(&path, contents).expect("write rules file");
        path
    }

    #[test]
    fn full_rules_file_overrides_both_sections() {
        let path = temp_rules(
            "full",
            r#"{
                "separation": {
                    "min_horizontal_separation": 5000.0,
                    "min_vertical_separation": 1500.0,
                    "lookahead_secs": 120.0,
                    "warning_cooldown_secs": 10.0,
                    "early_threshold": 3.0,
                    "critical_threshold": 1.5,
                    "immediate_action_threshold": 1.2
                },
                "airspace": {
                    "x_min": 0.0,
                    "x_max": 50000.0,
                    "y_min": 0.0,
                    "y_max": 50000.0,
                    "z_min": 10000.0,
                    "z_max": 20000.0
                }
            }"#,
        );

        let file = load_rules_file(&path).expect("parse");
        let separation = file.separation.expect("separation section");
        assert!((separation.min_horizontal_separation - 5000.0).abs() < f64::EPSILON);
        assert!((separation.lookahead_secs - 120.0).abs() < f64::EPSILON);
        let airspace = file.airspace.expect("airspace section");
        assert!((airspace.x_max - 50_000.0).abs() < f64::EPSILON);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn partial_rules_file_leaves_other_section_unset() {
        let path = temp_rules(
            "partial",
            r#"{"airspace": {"x_min": 0.0, "x_max": 80000.0, "y_min": 0.0,
                "y_max": 80000.0, "z_min": 15000.0, "z_max": 25000.0}}"#,
        );

        let file = load_rules_file(&path).expect("parse");
        assert!(file.separation.is_none());
        assert!(file.airspace.is_some());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn malformed_rules_file_is_invalid_input() {
        let path = temp_rules("broken", "{not json");
        let err = load_rules_file(&path).unwrap_err();
        assert!(matches!(err, AtcError::InvalidInput(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_rules_file_is_transient_io() {
        let err = load_rules_file(Path::new("/nonexistent/rules.json")).unwrap_err();
        assert!(matches!(err, AtcError::TransientIo(_)));
    }
}
