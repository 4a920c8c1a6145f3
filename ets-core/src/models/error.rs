use super::{ControlKey, Year};

/// Errors raised when a declared parameter is missing or malformed.
///
/// These are fatal for the current evaluation. Every variant names the
/// offending design variable (or configuration field) so the caller can report it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    /// The key was requested but the design space has no entry for it
    #[error("{0}: no entry in the design space")]
    MissingEntry(ControlKey),
    /// The activation flags and the fixed values of a design-space entry differ in length
    #[error("{key}: {flags} activation flags for {values} design-space values")]
    FlagLength {
        /// The offending key
        key: ControlKey,
        /// Number of activation flags
        flags: usize,
        /// Number of fixed values
        values: usize,
    },
    /// The design vector does not carry one value per activated flag
    #[error("{key}: expected {expected} activated control values, got {actual}")]
    ActivatedCount {
        /// The offending key
        key: ControlKey,
        /// Number of activated flags
        expected: usize,
        /// Number of values supplied by the optimizer
        actual: usize,
    },
    /// A design variable without any control point
    #[error("{0}: no control points")]
    EmptyControlSet(ControlKey),
    /// A spline was requested on an empty sample grid
    #[error("cannot sample a trajectory on zero years")]
    EmptySampleGrid,
    /// A control value or design-space value is NaN or infinite
    #[error("{0}: non-finite control value")]
    NonFinite(ControlKey),
    /// The configured year range is empty or the time step is not positive
    #[error("invalid year range {start}..={end} with step {step}")]
    YearRange {
        /// First year
        start: Year,
        /// Last year
        end: Year,
        /// Step between samples
        step: Year,
    },
    /// A scale or tolerance must be finite and strictly positive
    #[error("{name} must be finite and strictly positive, got {value}")]
    Scale {
        /// The name of the parameter
        name: &'static str,
        /// The rejected value
        value: f64,
    },
}

/// A year-index mismatch between two trajectories being combined.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{context}: year {year} is missing from {missing_in}")]
pub struct AlignmentError {
    /// What was being combined, e.g. the carrier and technology
    pub context: String,
    /// The year that could not be matched
    pub year: Year,
    /// The trajectory lacking that year
    pub missing_in: &'static str,
}
