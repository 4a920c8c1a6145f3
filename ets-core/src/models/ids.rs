use super::string_wrapper;
use std::fmt;

string_wrapper!(CarrierId);
string_wrapper!(TechnologyId);
string_wrapper!(QuantityName);

/// Names one optimizer-controlled design variable.
///
/// Each key owns a set of control points in the design space and expands into
/// exactly one yearly trajectory.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ControlKey {
    /// The investment mix of one technology under a carrier
    Technology(CarrierId, TechnologyId),
    /// The carrier-level investment mix
    Carrier(CarrierId),
    /// A system-wide control, such as a capture percentage
    Named(QuantityName),
}

impl ControlKey {
    /// Convenience constructor for a per-technology key
    pub fn technology(carrier: impl Into<CarrierId>, technology: impl Into<TechnologyId>) -> Self {
        Self::Technology(carrier.into(), technology.into())
    }

    /// Convenience constructor for a carrier-level key
    pub fn carrier(carrier: impl Into<CarrierId>) -> Self {
        Self::Carrier(carrier.into())
    }

    /// Convenience constructor for a named key
    pub fn named(name: impl Into<QuantityName>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Technology(carrier, technology) => write!(f, "{carrier}.{technology}"),
            Self::Carrier(carrier) => write!(f, "{carrier}"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

/// A typed node of the dependency graph.
///
/// Every quantity that takes part in a derivative, whether produced by a
/// component of this workspace or by an external technology model, is named
/// by one of these variants instead of an ad hoc string.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum VariableId {
    /// The activated control values of a design variable
    Control(ControlKey),
    /// The yearly trajectory expanded from a design variable
    Trajectory(ControlKey),
    /// The aggregate investment available to a carrier
    CarrierInvestment(CarrierId),
    /// The absolute investment allocated to one technology
    TechnologyInvestment(CarrierId, TechnologyId),
    /// The reference investment available to the whole system
    AvailableInvestment,
    /// The yearly sum of every technology allocation
    AllocatedInvestment,
    /// The per-year conservation constraint
    ConservationResidual,
    /// The scalar conservation penalty
    ConservationObjective,
    /// A per-technology quantity, e.g. a production trajectory
    TechnologyOutput(CarrierId, TechnologyId, QuantityName),
    /// The share of a technology within its carrier
    MixWeight(CarrierId, TechnologyId),
    /// A carrier-level quantity, e.g. a mixed property
    CarrierOutput(CarrierId, QuantityName),
    /// Anything else an external collaborator publishes
    External(QuantityName),
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control(key) => write!(f, "control[{key}]"),
            Self::Trajectory(key) => write!(f, "trajectory[{key}]"),
            Self::CarrierInvestment(carrier) => write!(f, "invest[{carrier}]"),
            Self::TechnologyInvestment(carrier, technology) => {
                write!(f, "invest[{carrier}.{technology}]")
            }
            Self::AvailableInvestment => write!(f, "available_investment"),
            Self::AllocatedInvestment => write!(f, "allocated_investment"),
            Self::ConservationResidual => write!(f, "invest_constraint"),
            Self::ConservationObjective => write!(f, "invest_objective"),
            Self::TechnologyOutput(carrier, technology, quantity) => {
                write!(f, "{carrier}.{technology}.{quantity}")
            }
            Self::MixWeight(carrier, technology) => write!(f, "mix_weight[{carrier}.{technology}]"),
            Self::CarrierOutput(carrier, quantity) => write!(f, "{carrier}.{quantity}"),
            Self::External(name) => write!(f, "{name}"),
        }
    }
}
