use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Tolerance – acceptance window around a reference value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceMode {
    /// Fixed-width window, in the unit of the compared values.
    Absolute,
    /// Window scaled to the reference value, magnitude given in percent.
    Percentage,
}

/// A numeric tolerance used to decide whether two measurements are equivalent.
///
/// The magnitude is validated on construction, so every `Tolerance` in
/// circulation satisfies `magnitude >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    mode: ToleranceMode,
    magnitude: f64,
}

impl Tolerance {
    pub fn new(mode: ToleranceMode, magnitude: f64) -> Result<Self, ConfigError> {
        if !magnitude.is_finite() || magnitude < 0.0 {
            return Err(ConfigError::InvalidMagnitude(magnitude));
        }
        Ok(Tolerance { mode, magnitude })
    }

    pub fn absolute(magnitude: f64) -> Result<Self, ConfigError> {
        Self::new(ToleranceMode::Absolute, magnitude)
    }

    pub fn percent(magnitude: f64) -> Result<Self, ConfigError> {
        Self::new(ToleranceMode::Percentage, magnitude)
    }

    pub fn mode(&self) -> ToleranceMode {
        self.mode
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Closed acceptance interval `(low, high)` around `reference`.
    ///
    /// In percentage mode a zero reference collapses the window to `[0, 0]`.
    pub fn window(&self, reference: f64) -> (f64, f64) {
        let half_width = match self.mode {
            ToleranceMode::Absolute => self.magnitude,
            ToleranceMode::Percentage => self.magnitude / 100.0 * reference.abs(),
        };
        (reference - half_width, reference + half_width)
    }

    /// `true` iff `candidate` lies inside the closed window around `reference`.
    pub fn check(&self, reference: f64, candidate: f64) -> bool {
        let (low, high) = self.window(reference);
        low <= candidate && candidate <= high
    }

    /// Persisted form: `{type: "absolute"|"percent", value: "<decimal>"}`.
    pub fn to_record(&self) -> ToleranceRecord {
        let kind = match self.mode {
            ToleranceMode::Absolute => ABSOLUTE_TAG,
            ToleranceMode::Percentage => PERCENT_TAG,
        };
        ToleranceRecord {
            kind: kind.to_string(),
            value: self.magnitude.to_string(),
        }
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ToleranceMode::Absolute => write!(f, "±{}", self.magnitude),
            ToleranceMode::Percentage => write!(f, "±{}%", self.magnitude),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted form
// ---------------------------------------------------------------------------

const ABSOLUTE_TAG: &str = "absolute";
const PERCENT_TAG: &str = "percent";

/// Tagged textual record a tolerance is saved to and loaded from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToleranceRecord {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

impl ToleranceRecord {
    /// Load the record into `slot`.
    ///
    /// Empty value text leaves `slot` untouched (legacy parameter files carry
    /// empty tolerance elements). Any type other than `"percent"` is read as
    /// absolute. Non-numeric text is a configuration error.
    pub fn load_into(&self, slot: &mut Option<Tolerance>) -> Result<(), ConfigError> {
        let text = self.value.trim();
        if text.is_empty() {
            return Ok(());
        }
        let magnitude: f64 = text.parse().map_err(|source| ConfigError::InvalidTolerance {
            text: self.value.clone(),
            source,
        })?;
        let mode = if self.kind == PERCENT_TAG {
            ToleranceMode::Percentage
        } else {
            ToleranceMode::Absolute
        };
        *slot = Some(Tolerance::new(mode, magnitude)?);
        Ok(())
    }
}
