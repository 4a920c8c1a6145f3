/// Basis-spline expansion of control points into yearly samples
pub mod bspline;

/// Locked-point re-insertion and the design-variable tables
pub mod design_var;

/// Allocation of carrier-level investment to technologies
pub mod invest;

/// The investment conservation constraint and penalty objective
pub mod conservation;

/// Technology mix weights and mixed carrier properties
pub mod mix;

/// The chain-rule composer
pub mod graph;

/// The investment evaluation chain over this crate's components
pub mod pipeline;

pub use bspline::{BSpline, SplineError, SplineExpansion, expand};
pub use conservation::{ConservationMonitor, ConservationOutcome, ConservationSettings};
pub use design_var::{DesignOutcome, DesignVariables, LockedExpansion};
pub use graph::{SensitivityError, SensitivityGraph};
pub use invest::{AllocatedSum, CarrierAllocation, CarrierSplit, InvestmentAllocator};
pub use mix::{MixWeights, MixedProperty};
pub use pipeline::{InvestmentChain, InvestmentEvaluation, InvestmentScenario};
