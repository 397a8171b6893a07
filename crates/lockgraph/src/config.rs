use std::error::Error;
use std::fmt;
use std::str::FromStr;

pub const ENV_CYCLE_CHECK: &str = "LOCKGRAPH_CYCLE_CHECK";
pub const ENV_REPORT_CYCLES: &str = "LOCKGRAPH_REPORT_CYCLES";

/// When the tracker looks for cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CycleCheck {
    /// Search the whole edge set on every acquisition. An existing cycle is
    /// reported again by every later acquisition.
    #[default]
    FullGraph,
    /// Only check edges inserted by the current acquisition. A cycle is
    /// reported once, by the acquisition that closes it.
    NewEdges,
    /// Record edges, never search.
    Off,
}

impl FromStr for CycleCheck {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "full-graph" => Ok(Self::FullGraph),
            "new-edges" | "incremental" => Ok(Self::NewEdges),
            "off" | "none" => Ok(Self::Off),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_CYCLE_CHECK,
                value: s.to_owned(),
                expected: "full, new-edges or off",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub cycle_check: CycleCheck,
    /// Log each detected cycle. The verdict is returned either way.
    pub report_cycles: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cycle_check: CycleCheck::FullGraph,
            report_cycles: true,
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_CYCLE_CHECK) {
            config.cycle_check = value.parse()?;
        }
        if let Some(value) = lookup(ENV_REPORT_CYCLES) {
            config.report_cycles = parse_flag(ENV_REPORT_CYCLES, &value)?;
        }
        Ok(config)
    }
}

pub(crate) fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_owned(),
            expected: "a boolean (1/0, true/false)",
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "invalid {key}={value:?}, expected {expected}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = TrackerConfig::from_lookup(lookup(&[])).expect("valid config");
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.cycle_check, CycleCheck::FullGraph);
        assert!(config.report_cycles);
    }

    #[test]
    fn reads_both_keys() {
        let config = TrackerConfig::from_lookup(lookup(&[
            (ENV_CYCLE_CHECK, "New-Edges"),
            (ENV_REPORT_CYCLES, "0"),
        ]))
        .expect("valid config");
        assert_eq!(config.cycle_check, CycleCheck::NewEdges);
        assert!(!config.report_cycles);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = TrackerConfig::from_lookup(lookup(&[(ENV_CYCLE_CHECK, "sometimes")]))
            .expect_err("bad mode must fail");
        assert!(err.to_string().contains(ENV_CYCLE_CHECK));
    }

    #[test]
    fn rejects_bad_flag() {
        let err = TrackerConfig::from_lookup(lookup(&[(ENV_REPORT_CYCLES, "maybe")]))
            .expect_err("bad flag must fail");
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == ENV_REPORT_CYCLES));
    }
}
