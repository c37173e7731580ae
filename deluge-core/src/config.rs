use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A run plan: which scenarios to run, how hard, and for how long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelugeDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(with = "duration_format")]
    pub global_duration: Duration,

    /// Scenario id -> its load shape.
    pub scenarios: BTreeMap<String, ScenarioConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    /// Number of simulated users.
    pub concurrent: usize,

    /// Pacing interval between two iteration starts of one user.
    #[serde(with = "duration_format")]
    pub delay: Duration,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub args: serde_json::Value,
}

impl ScenarioConfig {
    /// Expected iterations per user, at least one.
    #[must_use]
    pub fn expected_iterations(&self, global_duration: Duration) -> u64 {
        let delay = self.delay.as_nanos().max(1);
        let n = global_duration.as_nanos().div_ceil(delay);
        u64::try_from(n).unwrap_or(u64::MAX).max(1)
    }
}

impl DelugeDefinition {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let def: Self = serde_yaml::from_str(s)?;
        def.validate()?;
        Ok(def)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let def: Self = serde_json::from_str(s)?;
        def.validate()?;
        Ok(def)
    }

    /// Loads a `.json` file as JSON and anything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_yaml_str(&raw)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.global_duration.is_zero() {
            return Err(Error::InvalidDuration);
        }
        if self.scenarios.is_empty() {
            return Err(Error::NoScenario(self.id.clone()));
        }
        for (id, scenario) in &self.scenarios {
            if scenario.concurrent == 0 {
                return Err(Error::InvalidConcurrency(id.clone()));
            }
            if scenario.delay.is_zero() {
                return Err(Error::InvalidDelay(id.clone()));
            }
        }
        Ok(())
    }
}

/// Durations as humantime strings (`"200ms"`, `"1m 30s"`) or integer seconds.
pub mod duration_format {
    use std::time::Duration;

    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = Duration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 200ms) or integer seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write as _;

    use super::*;

    const YAML: &str = r#"
id: smoke
name: Smoke test
globalDuration: 200ms
scenarios:
  home:
    concurrent: 10
    delay: 10ms
    args:
      baseUrl: http://localhost:8080
  checkout:
    concurrent: 2
    delay: 1
"#;

    #[test]
    fn parses_yaml_with_humantime_and_seconds() {
        let def = DelugeDefinition::from_yaml_str(YAML).unwrap();
        assert_eq!(def.id, "smoke");
        assert_eq!(def.global_duration, Duration::from_millis(200));
        let home = &def.scenarios["home"];
        assert_eq!(home.concurrent, 10);
        assert_eq!(home.delay, Duration::from_millis(10));
        assert_eq!(home.args["baseUrl"], "http://localhost:8080");
        assert_eq!(def.scenarios["checkout"].delay, Duration::from_secs(1));
        assert!(def.scenarios["checkout"].args.is_null());
    }

    #[test]
    fn json_round_trips() {
        let def = DelugeDefinition::from_yaml_str(YAML).unwrap();
        let json = serde_json::to_string(&def).unwrap();
        assert!(json.contains("\"globalDuration\":\"200ms\""));
        assert_eq!(DelugeDefinition::from_json_str(&json).unwrap(), def);
    }

    #[test]
    fn validation_rejects_bad_load_shapes() {
        let bad_concurrency = YAML.replace("concurrent: 2", "concurrent: 0");
        assert!(matches!(
            DelugeDefinition::from_yaml_str(&bad_concurrency),
            Err(Error::InvalidConcurrency(id)) if id == "checkout"
        ));

        let bad_delay = YAML.replace("delay: 10ms", "delay: 0s");
        assert!(matches!(
            DelugeDefinition::from_yaml_str(&bad_delay),
            Err(Error::InvalidDelay(id)) if id == "home"
        ));

        let bad_duration = YAML.replace("globalDuration: 200ms", "globalDuration: 0s");
        assert!(matches!(
            DelugeDefinition::from_yaml_str(&bad_duration),
            Err(Error::InvalidDuration)
        ));

        let empty = "id: x\nglobalDuration: 1s\nscenarios: {}\n";
        assert!(matches!(
            DelugeDefinition::from_yaml_str(empty),
            Err(Error::NoScenario(_))
        ));

        assert!(matches!(
            DelugeDefinition::from_yaml_str("id: x\nglobalDuration: soon\nscenarios: {}\n"),
            Err(Error::Yaml(_))
        ));
    }

    #[test]
    fn expected_iterations_rounds_up() {
        let cfg = ScenarioConfig {
            concurrent: 1,
            delay: Duration::from_millis(30),
            args: serde_json::Value::Null,
        };
        assert_eq!(cfg.expected_iterations(Duration::from_millis(200)), 7);
        assert_eq!(cfg.expected_iterations(Duration::from_millis(1)), 1);
        assert_eq!(cfg.expected_iterations(Duration::from_millis(300)), 10);
    }

    #[test]
    fn from_path_picks_format_by_extension() {
        let def = DelugeDefinition::from_yaml_str(YAML).unwrap();

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json.write_all(serde_json::to_string(&def).unwrap().as_bytes())
            .unwrap();
        assert_eq!(DelugeDefinition::from_path(json.path()).unwrap(), def);

        let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        yaml.write_all(YAML.as_bytes()).unwrap();
        assert_eq!(DelugeDefinition::from_path(yaml.path()).unwrap(), def);
    }
}
