use super::{ConfigurationError, ControlKey, Map};

/// One row of the design-space table: the fixed values of a design variable
/// and which of its control points the optimizer may move.
///
/// The fixed values of locked points are the values reinserted before
/// expansion; the fixed values of activated points only serve as the
/// optimizer's starting point.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DesignSpaceEntry {
    /// The design-space value of every control point
    pub value: Vec<f64>,
    /// Whether each control point is free to vary
    #[cfg_attr(feature = "serde", serde(rename = "activated_elem"))]
    pub activated: Vec<bool>,
}

impl DesignSpaceEntry {
    /// An entry with every control point activated
    pub fn activated(value: Vec<f64>) -> Self {
        let activated = vec![true; value.len()];
        Self { value, activated }
    }

    /// Number of activated control points
    pub fn activated_count(&self) -> usize {
        self.activated.iter().filter(|&&flag| flag).count()
    }

    /// Checks the entry on behalf of `key`
    pub fn validate(&self, key: &ControlKey) -> Result<(), ConfigurationError> {
        if self.activated.len() != self.value.len() {
            return Err(ConfigurationError::FlagLength {
                key: key.clone(),
                flags: self.activated.len(),
                values: self.value.len(),
            });
        }
        if self.value.is_empty() {
            return Err(ConfigurationError::EmptyControlSet(key.clone()));
        }
        if self.value.iter().any(|v| !v.is_finite()) {
            return Err(ConfigurationError::NonFinite(key.clone()));
        }
        Ok(())
    }
}

/// The parameter table: one entry per declared design variable.
///
/// Keys are structured, so the serialized form is a list of `[key, entry]`
/// pairs rather than a JSON object.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "Vec<(ControlKey, DesignSpaceEntry)>", into = "Vec<(ControlKey, DesignSpaceEntry)>")
)]
pub struct DesignSpace(Map<ControlKey, DesignSpaceEntry>);

impl DesignSpace {
    /// Declare (or replace) the entry of `key`
    pub fn insert(&mut self, key: ControlKey, entry: DesignSpaceEntry) {
        self.0.insert(key, entry);
    }

    /// Look up the entry of `key`
    pub fn get(&self, key: &ControlKey) -> Option<&DesignSpaceEntry> {
        self.0.get(key)
    }

    /// Look up the entry of `key`, failing with a configuration error
    pub fn entry(&self, key: &ControlKey) -> Result<&DesignSpaceEntry, ConfigurationError> {
        self.get(key)
            .ok_or_else(|| ConfigurationError::MissingEntry(key.clone()))
    }

    /// The declared keys, in declaration order
    pub fn keys(&self) -> impl Iterator<Item = &ControlKey> {
        self.0.keys()
    }

    /// Iterate over the declared entries
    pub fn iter(&self) -> impl Iterator<Item = (&ControlKey, &DesignSpaceEntry)> {
        self.0.iter()
    }

    /// Number of declared design variables
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is declared
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The optimizer's starting point: the design-space values of every activated point
    pub fn initial_design_vector(&self) -> DesignVector {
        self.iter()
            .map(|(key, entry)| {
                let values = entry
                    .value
                    .iter()
                    .zip(entry.activated.iter())
                    .filter_map(|(&v, &flag)| flag.then_some(v))
                    .collect();
                (key.clone(), values)
            })
            .collect()
    }
}

impl FromIterator<(ControlKey, DesignSpaceEntry)> for DesignSpace {
    fn from_iter<I: IntoIterator<Item = (ControlKey, DesignSpaceEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<(ControlKey, DesignSpaceEntry)>> for DesignSpace {
    fn from(value: Vec<(ControlKey, DesignSpaceEntry)>) -> Self {
        value.into_iter().collect()
    }
}

impl From<DesignSpace> for Vec<(ControlKey, DesignSpaceEntry)> {
    fn from(value: DesignSpace) -> Self {
        value.0.into_iter().collect()
    }
}

/// The optimizer's design vector: the activated control values of each key, in order.
pub type DesignVector = Map<ControlKey, Vec<f64>>;

/// A single control point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlPoint {
    /// The control value
    pub value: f64,
    /// Whether the optimizer may move it
    pub activated: bool,
}

/// The full, ordered control points of one design variable for one iteration.
///
/// Locked points carry their fixed design-space value; activated points carry
/// the optimizer's current value.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlPointSet {
    key: ControlKey,
    points: Vec<ControlPoint>,
}

impl ControlPointSet {
    /// Creates a control point set
    pub fn new(key: ControlKey, points: Vec<ControlPoint>) -> Result<Self, ConfigurationError> {
        if points.is_empty() {
            return Err(ConfigurationError::EmptyControlSet(key));
        }
        if points.iter().any(|point| !point.value.is_finite()) {
            return Err(ConfigurationError::NonFinite(key));
        }
        Ok(Self { key, points })
    }

    /// The design variable these points belong to
    pub fn key(&self) -> &ControlKey {
        &self.key
    }

    /// The points, in order
    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// Number of points, locked ones included
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false: a set holds at least one point
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Every value, locked ones included
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|point| point.value).collect()
    }

    /// Positions of the activated points
    pub fn activated_positions(&self) -> Vec<usize> {
        self.positions(true)
    }

    /// Positions of the locked points
    pub fn locked_positions(&self) -> Vec<usize> {
        self.positions(false)
    }

    /// Values of the activated points, in order
    pub fn activated_values(&self) -> Vec<f64> {
        self.points
            .iter()
            .filter(|point| point.activated)
            .map(|point| point.value)
            .collect()
    }

    fn positions(&self, activated: bool) -> Vec<usize> {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, point)| (point.activated == activated).then_some(i))
            .collect()
    }
}
