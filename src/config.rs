//! Capacities and growth parameters for pools and the registry.
//!
//! The defaults match the constants every pool has always been built with:
//! 40 segment slots, 40 gap index slots, a registry of 20 pools, and all
//! three tables doubling once they are more than 75% full.

use serde::{Deserialize, Serialize};

use crate::error::{AllocError, Result};

/// When a growable table doubles, and by how much.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthPolicy {
  /// Occupancy ratio above which the table grows.
  pub fill_factor: f32,
  /// Capacity multiplier applied on growth.
  pub expand_factor: usize,
}

impl GrowthPolicy {
  /// Returns true once `len / capacity` exceeds the fill factor.
  #[inline]
  pub fn should_grow(
    &self,
    len: usize,
    capacity: usize,
  ) -> bool {
    capacity == 0 || (len as f32 / capacity as f32) > self.fill_factor
  }

  /// Capacity after one growth step.
  pub fn next_capacity(
    &self,
    capacity: usize,
  ) -> Result<usize> {
    capacity
      .max(1)
      .checked_mul(self.expand_factor)
      .ok_or_else(|| AllocError::ResourceExhausted(format!("cannot grow past {capacity} slots")))
  }

  pub fn validate(&self) -> Result<()> {
    if !(self.fill_factor > 0.0 && self.fill_factor < 1.0) {
      return Err(AllocError::InvalidConfig(format!(
        "fill_factor must be within (0, 1), got {}",
        self.fill_factor
      )));
    }
    if self.expand_factor < 2 {
      return Err(AllocError::InvalidConfig(format!(
        "expand_factor must be at least 2, got {}",
        self.expand_factor
      )));
    }
    Ok(())
  }
}

impl Default for GrowthPolicy {
  fn default() -> Self {
    Self {
      fill_factor: 0.75,
      expand_factor: 2,
    }
  }
}

/// Per-pool storage parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
  /// Initial number of segment slots in the arena.
  pub segment_capacity: usize,
  /// Initial number of entries the free-space index can hold.
  pub gap_capacity: usize,
  pub segment_growth: GrowthPolicy,
  pub gap_growth: GrowthPolicy,
}

impl PoolConfig {
  pub fn validate(&self) -> Result<()> {
    if self.segment_capacity == 0 {
      return Err(AllocError::InvalidConfig("segment_capacity must be positive".into()));
    }
    if self.gap_capacity == 0 {
      return Err(AllocError::InvalidConfig("gap_capacity must be positive".into()));
    }
    self.segment_growth.validate()?;
    self.gap_growth.validate()
  }
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      segment_capacity: 40,
      gap_capacity: 40,
      segment_growth: GrowthPolicy::default(),
      gap_growth: GrowthPolicy::default(),
    }
  }
}

/// Registry table parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
  pub capacity: usize,
  pub growth: GrowthPolicy,
  /// Applied to every pool the registry opens.
  pub pool: PoolConfig,
}

impl RegistryConfig {
  pub fn validate(&self) -> Result<()> {
    if self.capacity == 0 {
      return Err(AllocError::InvalidConfig("registry capacity must be positive".into()));
    }
    self.growth.validate()?;
    self.pool.validate()
  }
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      capacity: 20,
      growth: GrowthPolicy::default(),
      pool: PoolConfig::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_should_grow() {
    let growth = GrowthPolicy::default();

    assert!(!growth.should_grow(30, 40));
    assert!(growth.should_grow(31, 40));
    assert!(growth.should_grow(0, 0));
  }

  #[test]
  fn test_next_capacity() {
    let growth = GrowthPolicy::default();

    assert_eq!(growth.next_capacity(40).unwrap(), 80);
    assert!(matches!(
      growth.next_capacity(usize::MAX),
      Err(AllocError::ResourceExhausted(_))
    ));
  }

  #[test]
  fn test_validate_rejects_bad_growth() {
    let mut config = PoolConfig::default();
    config.gap_growth.fill_factor = 1.0;
    assert!(matches!(config.validate(), Err(AllocError::InvalidConfig(_))));

    let mut config = PoolConfig::default();
    config.segment_growth.expand_factor = 1;
    assert!(matches!(config.validate(), Err(AllocError::InvalidConfig(_))));

    let config = RegistryConfig {
      capacity: 0,
      ..RegistryConfig::default()
    };
    assert!(matches!(config.validate(), Err(AllocError::InvalidConfig(_))));
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let yaml = "capacity: 8\npool:\n  segment_capacity: 4\n  gap_growth:\n    expand_factor: 3\n";
    let config: RegistryConfig = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.capacity, 8);
    assert_eq!(config.growth, GrowthPolicy::default());
    assert_eq!(config.pool.segment_capacity, 4);
    assert_eq!(config.pool.gap_capacity, 40);
    assert_eq!(config.pool.gap_growth.expand_factor, 3);
    assert_eq!(config.pool.gap_growth.fill_factor, 0.75);
    assert!(config.validate().is_ok());
  }
}
