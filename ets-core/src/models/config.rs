use super::{ConfigurationError, Year};

/// The time horizon and numerical tolerances of an optimization run.
///
/// Every component reads the year grid from here, so trajectories produced
/// within one run always share the same years.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawRunConfig", into = "RawRunConfig")
)]
pub struct RunConfig {
    year_start: Year,
    year_end: Year,
    time_step: Year,
    /// The numerical tolerances shared by every division and smoothing
    pub tolerances: Tolerances,
}

impl RunConfig {
    /// Creates a run configuration with the default tolerances, validating the year range
    pub fn new(year_start: Year, year_end: Year, time_step: Year) -> Result<Self, ConfigurationError> {
        Self::with_tolerances(year_start, year_end, time_step, Tolerances::default())
    }

    /// Creates a run configuration, validating the year range and the tolerances
    pub fn with_tolerances(
        year_start: Year,
        year_end: Year,
        time_step: Year,
        tolerances: Tolerances,
    ) -> Result<Self, ConfigurationError> {
        if time_step <= 0 || year_end < year_start {
            return Err(ConfigurationError::YearRange {
                start: year_start,
                end: year_end,
                step: time_step,
            });
        }
        tolerances.validate()?;
        Ok(Self {
            year_start,
            year_end,
            time_step,
            tolerances,
        })
    }

    /// First year of the horizon
    pub fn year_start(&self) -> Year {
        self.year_start
    }

    /// Last year of the horizon (inclusive, but only reached if it falls on the step)
    pub fn year_end(&self) -> Year {
        self.year_end
    }

    /// Step between consecutive samples
    pub fn time_step(&self) -> Year {
        self.time_step
    }

    /// The sampled years: `year_start, year_start + time_step, ...` up to `year_end`
    pub fn years(&self) -> Vec<Year> {
        (self.year_start..=self.year_end)
            .step_by(self.time_step as usize)
            .collect()
    }
}

/// Numerical tolerances.
///
/// A single set of tolerances is used for the forward values and for their
/// derivatives, so that both are computed through the same expressions.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "RawTolerances", into = "RawTolerances")
)]
pub struct Tolerances {
    /// Smallest magnitude a denominator may take before it is floored
    pub denominator_floor: f64,
    /// Width of the smooth absolute-value surrogate
    pub smoothing_epsilon: f64,
    /// Mix weights at or below this value are treated as negligible
    pub negligible_weight: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            denominator_floor: 1e-12,
            smoothing_epsilon: 1e-6,
            negligible_weight: 1e-9,
        }
    }
}

impl Tolerances {
    fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("denominator_floor", self.denominator_floor),
            ("smoothing_epsilon", self.smoothing_epsilon),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::Scale { name, value });
            }
        }
        if !(self.negligible_weight.is_finite() && self.negligible_weight >= 0.0) {
            return Err(ConfigurationError::Scale {
                name: "negligible_weight",
                value: self.negligible_weight,
            });
        }
        Ok(())
    }
}

// To seamlessly (de)serialize, we create a "raw" version of our structs
// that contains only primitive values, with every tolerance optional. Serde
// uses the raw version and we validate on the way back in.

/// The "DTO" type for the run configuration
#[derive(Clone, Debug)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawRunConfig {
    /// First year of the horizon
    pub year_start: Year,
    /// Last year of the horizon
    pub year_end: Year,
    /// Step between samples, defaulting to one year
    #[cfg_attr(feature = "serde", serde(default = "default_time_step"))]
    pub time_step: Year,
    /// Optional overrides of the numerical tolerances
    #[cfg_attr(feature = "serde", serde(default))]
    pub tolerances: RawTolerances,
}

#[cfg(feature = "serde")]
fn default_time_step() -> Year {
    1
}

/// The "DTO" type for the tolerances, where every field may be omitted
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RawTolerances {
    /// Overrides [`Tolerances::denominator_floor`]
    pub denominator_floor: Option<f64>,
    /// Overrides [`Tolerances::smoothing_epsilon`]
    pub smoothing_epsilon: Option<f64>,
    /// Overrides [`Tolerances::negligible_weight`]
    pub negligible_weight: Option<f64>,
}

impl From<RawTolerances> for Tolerances {
    fn from(value: RawTolerances) -> Self {
        let defaults = Tolerances::default();
        Self {
            denominator_floor: value.denominator_floor.unwrap_or(defaults.denominator_floor),
            smoothing_epsilon: value.smoothing_epsilon.unwrap_or(defaults.smoothing_epsilon),
            negligible_weight: value.negligible_weight.unwrap_or(defaults.negligible_weight),
        }
    }
}

impl From<Tolerances> for RawTolerances {
    fn from(value: Tolerances) -> Self {
        Self {
            denominator_floor: Some(value.denominator_floor),
            smoothing_epsilon: Some(value.smoothing_epsilon),
            negligible_weight: Some(value.negligible_weight),
        }
    }
}

impl TryFrom<RawRunConfig> for RunConfig {
    type Error = ConfigurationError;

    fn try_from(value: RawRunConfig) -> Result<Self, Self::Error> {
        Self::with_tolerances(
            value.year_start,
            value.year_end,
            value.time_step,
            value.tolerances.into(),
        )
    }
}

impl From<RunConfig> for RawRunConfig {
    fn from(value: RunConfig) -> Self {
        Self {
            year_start: value.year_start,
            year_end: value.year_end,
            time_step: value.time_step,
            tolerances: value.tolerances.into(),
        }
    }
}
