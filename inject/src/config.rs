//! Injector configuration, loadable from YAML.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// What happens when the same exact token is registered twice through
/// [`Injector::add`](crate::Injector::add).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationMode {
  /// The later registration replaces the earlier one, with a warning.
  #[default]
  LastWriteWins,
  /// The second registration fails.
  Strict,
}

fn default_max_resolution_depth() -> usize {
  64
}

/// ```yaml
/// registration: strict
/// max_resolution_depth: 32
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectorConfig {
  #[serde(default)]
  pub registration: RegistrationMode,
  /// Longest chain of nested constructions before resolution is aborted.
  #[serde(default = "default_max_resolution_depth")]
  pub max_resolution_depth: usize,
}

impl Default for InjectorConfig {
  fn default() -> Self {
    Self {
      registration: RegistrationMode::default(),
      max_resolution_depth: default_max_resolution_depth(),
    }
  }
}

impl InjectorConfig {
  pub fn strict() -> Self {
    Self {
      registration: RegistrationMode::Strict,
      ..Self::default()
    }
  }

  pub fn from_yaml_str(yaml: &str) -> Result<Self> {
    let config: Self = serde_yaml::from_str(yaml).map_err(|e| Error::ConfigParse(e.to_string()))?;
    config.validate()
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let contents = std::fs::read_to_string(path)?;
    Self::from_yaml_str(&contents)
  }

  fn validate(self) -> Result<Self> {
    if self.max_resolution_depth == 0 {
      return Err(Error::ConfigParse(
        "max_resolution_depth must be greater than zero".into(),
      ));
    }
    Ok(self)
  }
}
