use super::{
    conservation::{ConservationMonitor, ConservationOutcome, ConservationSettings},
    design_var::{DesignOutcome, DesignVariables},
    graph::{SensitivityError, SensitivityGraph},
    invest::{AllocatedSum, CarrierAllocation, CarrierSplit, InvestmentAllocator},
};
use crate::{EvaluationError, Map};
use ets_core::{
    models::{
        CarrierId, ConfigurationError, DerivativeBlock, DesignSpace, DesignVector, Diagnostics,
        EvaluationContext, RunConfig, Trajectory, VariableId,
    },
    ports::GradientQuery,
};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{Level, event};

/// The inputs of one evaluation besides the design space.
#[derive(Clone, Debug)]
pub struct InvestmentScenario {
    /// The optimizer's current activated control values
    pub design: DesignVector,
    /// Explicit total investment per carrier
    pub carrier_totals: Map<CarrierId, Trajectory>,
    /// The reference investment available to the whole system
    pub available: Trajectory,
}

/// Expand, allocate, sum and check conservation for one design vector.
///
/// A carrier's total investment is taken from the scenario when given,
/// otherwise derived from its carrier-level mix and the available
/// investment. Every step declares its partials into a fresh
/// [`SensitivityGraph`], so the result answers gradient requests for the
/// evaluated point.
#[derive(Clone, Debug)]
pub struct InvestmentChain {
    variables: DesignVariables,
    allocator: InvestmentAllocator,
    monitor: ConservationMonitor,
}

impl InvestmentChain {
    /// Creates a chain, validating the design space and the scales
    pub fn new(space: DesignSpace, settings: ConservationSettings) -> Result<Self, ConfigurationError> {
        Ok(Self {
            variables: DesignVariables::new(space)?,
            allocator: InvestmentAllocator,
            monitor: ConservationMonitor::new(settings)?,
        })
    }

    /// The design variables
    pub fn variables(&self) -> &DesignVariables {
        &self.variables
    }

    /// Evaluate one scenario, sequentially
    pub fn evaluate(
        &self,
        config: &RunConfig,
        scenario: &InvestmentScenario,
    ) -> Result<InvestmentEvaluation, EvaluationError> {
        let mut ctx = EvaluationContext::new(config.clone());
        let mut graph = SensitivityGraph::new();

        let design = self.variables.evaluate(&ctx, &scenario.design)?;
        graph.extend(&design)?;

        // explicit totals take precedence over the carrier-level mix
        let carrier_mix: Map<CarrierId, Trajectory> = design
            .carrier_mix()
            .into_iter()
            .filter(|(carrier, _)| !scenario.carrier_totals.contains_key(carrier))
            .collect();
        let split = self.allocator.split_carriers(
            &carrier_mix,
            &scenario.available,
            self.monitor.settings().available_scaling,
        )?;
        graph.extend(&split)?;

        let mut allocations = Vec::new();
        for carrier in design.carriers() {
            let total = scenario
                .carrier_totals
                .get(&carrier)
                .or_else(|| split.totals().get(&carrier))
                .ok_or_else(|| EvaluationError::MissingTotal(carrier.clone()))?;
            let allocation = self
                .allocator
                .allocate(&carrier, &design.techno_mix(&carrier), total)?;
            graph.extend(&allocation)?;
            allocations.push(allocation);
        }

        let allocated = AllocatedSum::new(&ctx, &allocations)?;
        graph.extend(&allocated)?;

        let conservation =
            self.monitor
                .evaluate(&mut ctx, &scenario.available, allocated.trajectory())?;
        graph.extend(&conservation)?;

        let diagnostics = ctx.into_diagnostics();
        event!(
            Level::DEBUG,
            carriers = allocations.len(),
            variables = graph.node_count(),
            partials = graph.edge_count(),
            degeneracies = diagnostics.degeneracy_count(),
            objective = conservation.objective(),
            "evaluated investment chain"
        );

        Ok(InvestmentEvaluation {
            design,
            split,
            allocations,
            allocated,
            conservation,
            graph,
            diagnostics,
        })
    }

    /// Evaluate independent scenarios, in parallel with the `parallel` feature
    pub fn evaluate_all(
        &self,
        config: &RunConfig,
        scenarios: &[InvestmentScenario],
    ) -> Vec<Result<InvestmentEvaluation, EvaluationError>> {
        #[cfg(feature = "parallel")]
        let results = scenarios
            .par_iter()
            .map(|scenario| self.evaluate(config, scenario))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let results = scenarios
            .iter()
            .map(|scenario| self.evaluate(config, scenario))
            .collect();

        results
    }
}

/// Everything one evaluation produced.
#[derive(Clone, Debug)]
pub struct InvestmentEvaluation {
    design: DesignOutcome,
    split: CarrierSplit,
    allocations: Vec<CarrierAllocation>,
    allocated: AllocatedSum,
    conservation: ConservationOutcome,
    graph: SensitivityGraph,
    diagnostics: Diagnostics,
}

impl InvestmentEvaluation {
    /// The expanded design variables
    pub fn design(&self) -> &DesignOutcome {
        &self.design
    }

    /// The carrier totals derived from the carrier-level mix
    pub fn carrier_split(&self) -> &CarrierSplit {
        &self.split
    }

    /// The technology investments, per carrier
    pub fn allocations(&self) -> &[CarrierAllocation] {
        &self.allocations
    }

    /// The yearly sum of every technology investment
    pub fn allocated(&self) -> &Trajectory {
        self.allocated.trajectory()
    }

    /// The conservation residual and objective
    pub fn conservation(&self) -> &ConservationOutcome {
        &self.conservation
    }

    /// The dependency graph of this evaluation
    pub fn graph(&self) -> &SensitivityGraph {
        &self.graph
    }

    /// The degeneracies met while evaluating
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

impl GradientQuery for InvestmentEvaluation {
    type Error = SensitivityError;

    fn gradient(
        &self,
        output: &VariableId,
        input: &VariableId,
    ) -> Result<DerivativeBlock, Self::Error> {
        self.graph.gradient(output, input)
    }
}
