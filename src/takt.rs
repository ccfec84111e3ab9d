//! Takt time arithmetic and the saved-inputs echo.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Shift parameters the takt time is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaktInput {
  /// Shift length in hours
  pub working_hours: f64,
  /// Break time in minutes
  pub break_minutes: f64,
  /// Units to produce during the shift
  pub target_quantity: f64,
}

impl Default for TaktInput {
  /// First-run values: an 8 hour shift with a 60 minute break, 400 units.
  fn default() -> Self {
    Self {
      working_hours: 8.0,
      break_minutes: 60.0,
      target_quantity: 400.0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaktResult {
  /// Seconds available per unit
  pub takt_time_secs: f64,
  /// Units required per hour to hit the target
  pub hourly_target: f64,
}

impl TaktInput {
  /// Minutes of the shift actually available for production.
  pub fn available_minutes(&self) -> f64 {
    self.working_hours * 60.0 - self.break_minutes
  }

  /// Compute takt time and the hourly target.
  ///
  /// Non-positive available time or target quantity yields zero results
  /// instead of dividing by zero. NaN comparisons are false, so NaN inputs
  /// take the same guard path.
  pub fn compute(&self) -> TaktResult {
    let available = self.available_minutes();
    if !(available > 0.0) || !(self.target_quantity > 0.0) {
      return TaktResult {
        takt_time_secs: 0.0,
        hourly_target: 0.0,
      };
    }

    let takt_time_secs = available * 60.0 / self.target_quantity;
    TaktResult {
      takt_time_secs,
      hourly_target: 3600.0 / takt_time_secs,
    }
  }
}

/// Last-used inputs, echoed to a JSON file and restored on the next run.
pub struct InputStore {
  path: PathBuf,
}

impl InputStore {
  /// Input store at the default location.
  pub fn new() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(Self {
      path: data_dir.join("taktcache").join("inputs.json"),
    })
  }

  /// Input store at an explicit path.
  pub fn at(path: PathBuf) -> Self {
    Self { path }
  }

  /// Restore the last saved inputs, or None on first run.
  pub fn load(&self) -> Result<Option<TaktInput>> {
    if !self.path.exists() {
      return Ok(None);
    }

    let contents = std::fs::read_to_string(&self.path)
      .map_err(|e| eyre!("Failed to read {}: {}", self.path.display(), e))?;
    let input = serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse {}: {}", self.path.display(), e))?;

    Ok(Some(input))
  }

  /// Overwrite the saved inputs.
  pub fn save(&self, input: &TaktInput) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create {}: {}", parent.display(), e))?;
    }

    let contents = serde_json::to_string_pretty(input)
      .map_err(|e| eyre!("Failed to serialize inputs: {}", e))?;
    std::fs::write(&self.path, contents)
      .map_err(|e| eyre!("Failed to write {}: {}", self.path.display(), e))?;

    Ok(())
  }
}
