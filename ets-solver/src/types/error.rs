use crate::SensitivityError;
use ets_core::models::{AlignmentError, CarrierId, ConfigurationError, TechnologyId};

/// Errors that abort the evaluation of a design vector.
///
/// None of these is retried: the pipeline is deterministic, so the same
/// inputs would fail the same way.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// A declared parameter is missing or malformed
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    /// Two trajectories being combined do not share their years
    #[error("alignment error: {0}")]
    Alignment(#[from] AlignmentError),
    /// A derivative could not be declared or composed
    #[error("sensitivity error: {0}")]
    Sensitivity(#[from] SensitivityError),
    /// A technology has a mix weight but no value for the mixed quantity
    #[error("{carrier}.{technology}: no value for the mixed quantity")]
    MissingTechnology {
        /// The carrier being mixed
        carrier: CarrierId,
        /// The technology lacking a value
        technology: TechnologyId,
    },
    /// A carrier has technology mixes but no total investment
    #[error("{0}: no total investment trajectory")]
    MissingTotal(CarrierId),
}
