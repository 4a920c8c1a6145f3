#![warn(missing_docs)]
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

/// Core domain models for differentiable investment trajectories.
///
/// This module contains the fundamental data structures: identifiers, the run
/// configuration, the design-space table, trajectories and the derivative
/// blocks that components exchange.
///
/// The models in this module are primarily data structures with minimal
/// numerical logic, keeping the domain entities separate from the components
/// that compute and differentiate them.
pub mod models;

/// Interface traits for the sensitivity machinery.
///
/// This module contains the "ports": the local-derivative contract every
/// component (internal or an external technology model) exposes, and the
/// gradient query interface offered to the optimizer.
pub mod ports;
