use crate::models::{DerivativeBlock, VariableId};

/// One declared partial derivative: `d(output)/d(input)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Partial {
    /// The differentiated quantity
    pub output: VariableId,
    /// The quantity it is differentiated with respect to
    pub input: VariableId,
    /// The block, of shape `dim(output) × dim(input)`
    pub block: DerivativeBlock,
}

impl Partial {
    /// Declare `d(output)/d(input) = block`
    pub fn new(output: VariableId, input: VariableId, block: DerivativeBlock) -> Self {
        Self {
            output,
            input,
            block,
        }
    }
}

/// The local-derivative contract of a component.
///
/// Every component of the computation chain, including external technology
/// models treated as black boxes, declares the partial derivatives of the
/// outputs it produced with respect to the inputs it consumed, evaluated at
/// the point it was just computed at. Only direct dependencies are declared;
/// the composer derives everything else.
///
/// A component whose outputs share a normalization denominator must declare
/// the cross-terms `d(output_j)/d(input_i)` for every sibling `j != i`, since
/// the composer can only sum the edges it is given.
pub trait LocalSensitivities {
    /// The partial derivatives of this component's outputs
    fn partials(&self) -> Vec<Partial>;
}

impl LocalSensitivities for Vec<Partial> {
    fn partials(&self) -> Vec<Partial> {
        self.clone()
    }
}

impl<T: LocalSensitivities + ?Sized> LocalSensitivities for &T {
    fn partials(&self) -> Vec<Partial> {
        (**self).partials()
    }
}
