mod block;
mod config;
mod context;
mod design;
mod error;
mod ids;
mod map;
mod trajectory;

pub use block::{DerivativeBlock, Diagonal, ShapeError};
pub use config::{RawRunConfig, RawTolerances, RunConfig, Tolerances};
pub use context::{Degeneracy, Diagnostics, EvaluationContext};
pub use design::{ControlPoint, ControlPointSet, DesignSpace, DesignSpaceEntry, DesignVector};
pub use error::{AlignmentError, ConfigurationError};
pub use ids::{CarrierId, ControlKey, QuantityName, TechnologyId, VariableId};
pub use map::Map;
pub use trajectory::{Trajectory, TrajectoryError, Year};

macro_rules! string_wrapper {
    ($struct:ident) => {
        #[doc = concat!("A newtype wrapper around a String naming a ", stringify!($struct))]
        #[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
        #[cfg_attr(
            feature = "serde",
            derive(serde::Serialize, serde::Deserialize),
            serde(transparent)
        )]
        #[repr(transparent)]
        pub struct $struct(String);

        impl $struct {
            /// View the underlying name
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $struct {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $struct {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::ops::Deref for $struct {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Display for $struct {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

pub(crate) use string_wrapper;
