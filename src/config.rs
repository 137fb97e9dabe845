//! Service configuration read from the environment.

use std::env;

use thiserror::Error;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 10040;
pub const DEFAULT_DIFFICULTY: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub difficulty: usize,
    /// Register the default bench of judges at start-up.
    pub seed_judges: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            difficulty: DEFAULT_DIFFICULTY,
            seed_judges: true,
        }
    }
}

fn parse<T: std::str::FromStr>(
    name: &'static str,
    expected: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: raw,
        }),
    }
}

impl Config {
    /// Reads `SERVER_HOST`, `SERVER_PORT`, `LEDGER_DIFFICULTY` and `SEED_JUDGES`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        Ok(Config {
            host: lookup("SERVER_HOST").unwrap_or(defaults.host),
            port: parse("SERVER_PORT", "a valid u16", lookup("SERVER_PORT"), defaults.port)?,
            difficulty: parse(
                "LEDGER_DIFFICULTY",
                "a non-negative integer",
                lookup("LEDGER_DIFFICULTY"),
                defaults.difficulty,
            )?,
            seed_judges: parse(
                "SEED_JUDGES",
                "true or false",
                lookup("SEED_JUDGES"),
                defaults.seed_judges,
            )?,
        })
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}
