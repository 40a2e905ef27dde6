//! Environment variable parsing with type safety.
//!
//! Provides a type-safe parser for `D2CC_*` environment variables with
//! validation, error collection, and source tracking.

use super::source::{ConfigSource, Sourced};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
/// A rejected value leaves the supplied default in place.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    pub fn new() -> Self {
        Self {
            prefix: "D2CC_",
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Accepts 1/true/yes/on and 0/false/no/off/"" in any case.
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let parsed = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        self.errors.push(EnvError::InvalidValue {
                            var: var_name.clone(),
                            expected: "boolean (true/false/1/0/yes/no)".to_string(),
                            value: value.clone(),
                        });
                        return Sourced::default_value(default);
                    }
                };
                Sourced::from_env(parsed, var_name)
            }
            Err(_) => Sourced::default_value(default),
        }
    }

    pub fn get_u64_range(&mut self, name: &str, default: u64, min: u64, max: u64) -> Sourced<u64> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.trim().parse::<u64>() {
                Ok(n) if (min..=max).contains(&n) => Sourced::from_env(n, var_name),
                Ok(n) => {
                    self.errors.push(EnvError::OutOfRange {
                        var: var_name,
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    });
                    Sourced::default_value(default)
                }
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: "unsigned integer".to_string(),
                        value,
                    });
                    Sourced::default_value(default)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }

    pub fn get_usize_range(
        &mut self,
        name: &str,
        default: usize,
        min: usize,
        max: usize,
    ) -> Sourced<usize> {
        let wide = self.get_u64_range(name, default as u64, min as u64, max as u64);
        Sourced {
            value: usize::try_from(wide.value).unwrap_or(default),
            source: wide.source,
            env_var: wide.env_var,
        }
    }

    /// Get a path value with `~/` expanded to the home directory.
    pub fn get_path(&mut self, name: &str, default: PathBuf) -> Sourced<PathBuf> {
        let var_name = self.var_name(name);
        match env::var_os(&var_name) {
            Some(value) if !value.is_empty() => {
                let raw = PathBuf::from(value);
                let expanded = match (raw.strip_prefix("~"), dirs::home_dir()) {
                    (Ok(rest), Some(home)) => home.join(rest),
                    _ => raw,
                };
                Sourced::from_env(expanded, var_name)
            }
            _ => Sourced::default_value(default),
        }
    }

    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let lower = value.to_lowercase();
                match lower.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" | "off" => {
                        Sourced::from_env(lower, var_name)
                    }
                    _ => {
                        self.errors.push(EnvError::InvalidLogLevel {
                            var: var_name,
                            value,
                        });
                        Sourced::default_value(default.to_string())
                    }
                }
            }
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// `None` when unset or empty.
    pub fn get_optional_path(&mut self, name: &str) -> Sourced<Option<PathBuf>> {
        let var_name = self.var_name(name);
        match env::var_os(&var_name) {
            Some(value) if value.is_empty() => Sourced::from_env(None, var_name),
            Some(value) => Sourced::from_env(Some(PathBuf::from(value)), var_name),
            None => Sourced {
                value: None,
                source: ConfigSource::Default,
                env_var: None,
            },
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}
