//! Common routines for handling input data.
use anyhow::{Context, Result, ensure};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::fs;
use std::path::Path;

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Inclusive bounds (with an optional step size) for a numeric input field.
///
/// These mirror the min/max/step attributes of the corresponding input controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Smallest permitted value
    pub min: f64,
    /// Largest permitted value
    pub max: f64,
    /// Values must be `min` plus a whole number of steps
    pub step: Option<f64>,
}

impl Bounds {
    /// Bounds without a step constraint
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            step: None,
        }
    }

    /// Bounds where values must lie on a grid of `step`
    pub const fn with_step(min: f64, max: f64, step: f64) -> Self {
        Self {
            min,
            max,
            step: Some(step),
        }
    }

    /// Whether `value` is on the step grid (always true if there is no step)
    fn is_on_step(&self, value: f64) -> bool {
        let Some(step) = self.step else {
            return true;
        };

        let steps = (value - self.min) / step;
        (steps - steps.round()).abs() < 1e-9
    }

    /// Snap `value` to the nearest step and clamp it to the bounds.
    ///
    /// Non-finite values are mapped to `min`.
    pub fn clamp(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.min;
        }

        let snapped = match self.step {
            Some(step) => self.min + ((value - self.min) / step).round() * step,
            None => value,
        };
        snapped.clamp(self.min, self.max)
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "between {} and {}", self.min, self.max)?;
        if let Some(step) = self.step {
            write!(f, " (in steps of {step})")?;
        }

        Ok(())
    }
}

/// Check that the value of the named field lies within `bounds`
pub fn check_within_bounds(field: &str, value: f64, bounds: &Bounds) -> Result<()> {
    ensure!(
        value.is_finite()
            && value >= bounds.min
            && value <= bounds.max
            && bounds.is_on_step(value),
        "`{field}` must be {bounds}, got {value}"
    );

    Ok(())
}
