use crate::models::{DerivativeBlock, VariableId};

/// Interface for answering total-derivative requests.
///
/// The optimizer asks for `d(output)/d(input)` for the pairs it needs, once
/// per iteration. Implementations must be deterministic: the same graph and
/// the same request always give the same block.
pub trait GradientQuery {
    /// Error type for failed requests, e.g. an unknown variable
    type Error: std::error::Error;

    /// The exact total derivative of `output` with respect to `input`,
    /// of shape `dim(output) × dim(input)`.
    fn gradient(
        &self,
        output: &VariableId,
        input: &VariableId,
    ) -> Result<DerivativeBlock, Self::Error>;
}
