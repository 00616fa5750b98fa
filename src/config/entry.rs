use super::ConfigError;
use serde::Serialize;
use std::fmt;

/// A single persisted configuration value.
///
/// Values are stored untagged so the YAML file stays readable:
/// `autoSearch: true`, `uin: 4711`, `name: pixel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ConfigValue {
    /// Convert a raw YAML node into a value, if it has a supported scalar type
    pub fn from_yaml(node: &serde_yaml_ng::Value) -> Option<Self> {
        match node {
            serde_yaml_ng::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_yaml_ng::Value::Number(n) => n.as_i64().map(Self::Int),
            serde_yaml_ng::Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Str(_) => "string",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// One advertised option of a choice entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub key: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
        }
    }
}

/// Validation rule attached to a configuration entry
///
/// String lengths are counted in characters (Unicode scalar values), not bytes,
/// so a value that round-trips through the YAML file keeps the same length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Inclusive numeric range
    Range { min: i64, max: i64 },
    /// Inclusive string length range, in characters
    Length { min: usize, max: usize },
    /// Value must be one of the option keys
    Choice(Vec<SelectOption>),
    /// Plain boolean switch
    Flag,
}

impl Constraint {
    pub fn range(min: i64, max: i64) -> Self {
        Self::Range { min, max }
    }

    pub fn length(min: usize, max: usize) -> Self {
        Self::Length { min, max }
    }

    pub fn choice(options: &[(&str, &str)]) -> Self {
        Self::Choice(
            options
                .iter()
                .map(|(key, label)| SelectOption::new(key, label))
                .collect(),
        )
    }

    /// Check a candidate value for the entry named `key`
    pub fn validate(&self, key: &str, value: &ConfigValue) -> Result<(), ConfigError> {
        match (self, value) {
            (Self::Range { min, max }, ConfigValue::Int(v)) => {
                if v < min || v > max {
                    return Err(ConfigError::OutOfRange {
                        key: key.to_string(),
                        value: v.to_string(),
                        min: *min,
                        max: *max,
                    });
                }
                Ok(())
            }
            (Self::Length { min, max }, ConfigValue::Str(s)) => {
                let len = s.chars().count();
                if len < *min || len > *max {
                    return Err(ConfigError::OutOfRange {
                        key: key.to_string(),
                        value: format!("{} characters", len),
                        min: *min as i64,
                        max: *max as i64,
                    });
                }
                Ok(())
            }
            (Self::Choice(options), ConfigValue::Str(s)) => {
                if options.iter().any(|o| &o.key == s) {
                    Ok(())
                } else {
                    Err(ConfigError::InvalidOption {
                        key: key.to_string(),
                        value: s.clone(),
                        allowed: options.iter().map(|o| o.key.clone()).collect(),
                    })
                }
            }
            (Self::Flag, ConfigValue::Bool(_)) => Ok(()),
            (_, other) => Err(ConfigError::TypeMismatch {
                key: key.to_string(),
                expected: self.kind(),
                found: other.kind(),
            }),
        }
    }

    /// Parse user input (e.g. from the command line) into a value of the right kind
    pub fn parse_value(&self, key: &str, raw: &str) -> Result<ConfigValue, ConfigError> {
        match self {
            Self::Range { .. } => {
                raw.trim()
                    .parse::<i64>()
                    .map(ConfigValue::Int)
                    .map_err(|_| ConfigError::TypeMismatch {
                        key: key.to_string(),
                        expected: "integer",
                        found: "string",
                    })
            }
            Self::Flag => match raw.trim() {
                "true" | "yes" | "on" | "1" => Ok(ConfigValue::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(ConfigValue::Bool(false)),
                _ => Err(ConfigError::TypeMismatch {
                    key: key.to_string(),
                    expected: "bool",
                    found: "string",
                }),
            },
            Self::Length { .. } | Self::Choice(_) => Ok(ConfigValue::Str(raw.to_string())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Range { .. } => "integer",
            Self::Length { .. } | Self::Choice(_) => "string",
            Self::Flag => "bool",
        }
    }
}

/// A declared configuration entry: key, rule, default and current value
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    key: String,
    constraint: Constraint,
    default: ConfigValue,
    value: ConfigValue,
}

impl ConfigEntry {
    /// Create an entry whose default satisfies its constraint.
    ///
    /// # Panics
    /// If the default violates the constraint. Defaults are part of the
    /// program, so this is a programming error rather than a runtime one.
    pub fn new(key: &str, constraint: Constraint, default: ConfigValue) -> Self {
        if let Err(e) = constraint.validate(key, &default) {
            panic!("invalid default for config entry '{}': {}", key, e);
        }
        Self {
            key: key.to_string(),
            constraint,
            value: default.clone(),
            default,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    pub fn default_value(&self) -> &ConfigValue {
        &self.default
    }

    pub fn value(&self) -> &ConfigValue {
        &self.value
    }

    /// Validate and replace the current value; the old value is kept on error
    pub fn set(&mut self, value: ConfigValue) -> Result<(), ConfigError> {
        self.constraint.validate(&self.key, &value)?;
        self.value = value;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.value = self.default.clone();
    }
}
