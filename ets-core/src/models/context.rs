use super::{RunConfig, Tolerances, Trajectory, Year};
use tracing::{Level, event};

/// The explicit context handed to every component call of one evaluation.
///
/// It carries the run configuration, the sampled year grid and the
/// diagnostics collected while evaluating. A context lives for exactly one
/// evaluation of one design vector; nothing in it is reused by the next
/// optimizer iteration.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    config: RunConfig,
    years: Vec<Year>,
    diagnostics: Diagnostics,
}

impl EvaluationContext {
    /// Creates a fresh context for one evaluation
    pub fn new(config: RunConfig) -> Self {
        let years = config.years();
        Self {
            config,
            years,
            diagnostics: Diagnostics::default(),
        }
    }

    /// The run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The numerical tolerances
    pub fn tolerances(&self) -> &Tolerances {
        &self.config.tolerances
    }

    /// The sampled years of the run
    pub fn years(&self) -> &[Year] {
        &self.years
    }

    /// Builds a trajectory on the run's year grid.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not hold one value per sampled year.
    pub fn trajectory(&self, values: Vec<f64>) -> Trajectory {
        assert_eq!(
            values.len(),
            self.years.len(),
            "one value per sampled year"
        );
        Trajectory::from_parts(self.years.clone(), values)
    }

    /// The diagnostics recorded so far
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Mutable access to the diagnostics, for components that floor denominators
    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// Consume the context, keeping only its diagnostics
    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

/// A denominator that fell below the floor and was replaced by it.
#[derive(Debug, Clone, PartialEq)]
pub struct Degeneracy {
    /// Where the division happened, e.g. `methane mix weights @ 2031`
    pub location: String,
    /// The raw denominator before flooring
    pub value: f64,
}

/// Numerical events recovered locally during an evaluation.
///
/// Degenerate denominators are never silently ignored: each one is logged at
/// WARN level and kept here so the caller can count or report them.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    degeneracies: Vec<Degeneracy>,
}

impl Diagnostics {
    /// Record a floored denominator
    pub fn record_degeneracy(&mut self, location: impl Into<String>, value: f64) {
        let location = location.into();
        event!(
            Level::WARN,
            location = location.as_str(),
            value,
            "denominator below floor, applying floor"
        );
        self.degeneracies.push(Degeneracy { location, value });
    }

    /// Number of degeneracies recorded
    pub fn degeneracy_count(&self) -> usize {
        self.degeneracies.len()
    }

    /// The recorded degeneracies, in the order they happened
    pub fn degeneracies(&self) -> &[Degeneracy] {
        &self.degeneracies
    }
}
