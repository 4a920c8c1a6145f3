use super::AlignmentError;

/// A calendar year.
pub type Year = i32;

/// An ordered (year, value) sequence.
///
/// Trajectories are derived, immutable values: every evaluation builds new
/// ones instead of editing the previous iteration's.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawTrajectory", into = "RawTrajectory")
)]
pub struct Trajectory {
    years: Vec<Year>,
    values: Vec<f64>,
}

impl Trajectory {
    /// Creates a trajectory, validating that years are strictly increasing
    /// and that there is one value per year.
    pub fn new(years: Vec<Year>, values: Vec<f64>) -> Result<Self, TrajectoryError> {
        if years.len() != values.len() {
            return Err(TrajectoryError::Length {
                years: years.len(),
                values: values.len(),
            });
        }
        if let Some(pair) = years.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(TrajectoryError::Unordered(pair[1]));
        }
        Ok(Self { years, values })
    }

    /// Creates a trajectory holding the same value for every year.
    ///
    /// The caller guarantees strictly increasing years, as for the run's year grid.
    pub fn constant(years: &[Year], value: f64) -> Self {
        debug_assert!(years.windows(2).all(|pair| pair[0] < pair[1]));
        Self {
            years: years.to_vec(),
            values: vec![value; years.len()],
        }
    }

    /// Creates a trajectory without validation
    ///
    /// The caller guarantees strictly increasing years and equal lengths.
    pub(crate) fn from_parts(years: Vec<Year>, values: Vec<f64>) -> Self {
        debug_assert_eq!(years.len(), values.len());
        Self { years, values }
    }

    /// The years, in increasing order
    pub fn years(&self) -> &[Year] {
        &self.years
    }

    /// The values, one per year
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.years.len()
    }

    /// Whether the trajectory has no samples
    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    /// Iterate over (year, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (Year, f64)> + '_ {
        self.years.iter().copied().zip(self.values.iter().copied())
    }

    /// Position of `year`, if present
    pub fn position(&self, year: Year) -> Option<usize> {
        self.years.binary_search(&year).ok()
    }

    /// Whether both trajectories share the exact same year grid
    pub fn is_aligned_with(&self, other: &Trajectory) -> bool {
        self.years == other.years
    }

    /// For each year of `self`, the position of that year in `other`.
    ///
    /// Fails on the first year of `self` that `other` lacks.
    pub fn align_to(
        &self,
        other: &Trajectory,
        context: impl FnOnce() -> String,
        missing_in: &'static str,
    ) -> Result<Vec<usize>, AlignmentError> {
        let mut positions = Vec::with_capacity(self.len());
        for &year in self.years.iter() {
            match other.position(year) {
                Some(position) => positions.push(position),
                None => {
                    return Err(AlignmentError {
                        context: context(),
                        year,
                        missing_in,
                    });
                }
            }
        }
        Ok(positions)
    }

    /// Apply `f` to every value, keeping the year grid
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::from_parts(self.years.clone(), self.values.iter().map(|&v| f(v)).collect())
    }

    /// Replace the values, keeping the year grid.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not hold one value per year.
    pub fn with_values(&self, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), self.years.len(), "one value per year");
        Self::from_parts(self.years.clone(), values)
    }
}

/// Errors that can occur when constructing a trajectory
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrajectoryError {
    /// The years and values differ in length
    #[error("{years} years for {values} values")]
    Length {
        /// Number of years
        years: usize,
        /// Number of values
        values: usize,
    },
    /// The years are not strictly increasing
    #[error("years are not strictly increasing at {0}")]
    Unordered(Year),
}

/// DTO to ensure that we always validate when we deserialize from an untrusted source
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug)]
pub struct RawTrajectory {
    /// The years
    pub years: Vec<Year>,
    /// One value per year
    pub values: Vec<f64>,
}

impl TryFrom<RawTrajectory> for Trajectory {
    type Error = TrajectoryError;

    fn try_from(value: RawTrajectory) -> Result<Self, Self::Error> {
        Self::new(value.years, value.values)
    }
}

impl From<Trajectory> for RawTrajectory {
    fn from(value: Trajectory) -> Self {
        Self {
            years: value.years,
            values: value.values,
        }
    }
}
