use crate::{EvaluationError, Map, floor_denominator, step};
use ets_core::{
    models::{
        AlignmentError, CarrierId, DerivativeBlock, EvaluationContext, QuantityName, TechnologyId,
        Trajectory, VariableId,
    },
    ports::{LocalSensitivities, Partial},
};
use tracing::{Level, event};

// Both trajectories must carry exactly the same years.
fn ensure_same_years(
    reference: &Trajectory,
    other: &Trajectory,
    context: impl Fn() -> String,
) -> Result<(), AlignmentError> {
    other.align_to(reference, &context, "the reference technology")?;
    reference.align_to(other, &context, "the technology")?;
    Ok(())
}

/// The share of each technology in a carrier-level quantity.
///
/// `w_j = p_j / Σ_i p_i` for every year. Since every weight shares the same
/// denominator, each weight depends on every sibling's quantity and all of
/// these cross-terms are declared. Weights at or below the negligible
/// threshold get a zero local derivative.
#[derive(Clone, Debug)]
pub struct MixWeights {
    carrier: CarrierId,
    quantity: QuantityName,
    weights: Map<TechnologyId, Trajectory>,
    partials: Vec<Partial>,
}

impl MixWeights {
    /// Compute the weights of `quantity` among the technologies of `carrier`
    pub fn compute(
        ctx: &mut EvaluationContext,
        carrier: &CarrierId,
        quantity: &QuantityName,
        productions: &Map<TechnologyId, Trajectory>,
    ) -> Result<Self, EvaluationError> {
        let Some((_, reference)) = productions.first() else {
            return Ok(Self {
                carrier: carrier.clone(),
                quantity: quantity.clone(),
                weights: Map::default(),
                partials: Vec::new(),
            });
        };
        for (technology, production) in productions.iter() {
            ensure_same_years(reference, production, || {
                format!("{carrier}.{technology} {quantity}")
            })?;
        }

        let tolerances = *ctx.tolerances();
        let n = productions.len();
        let m = reference.len();

        // per year: the floored total
        let mut totals = Vec::with_capacity(m);
        for (k, &year) in reference.years().iter().enumerate() {
            let sum: f64 = productions.values().map(|p| p.values()[k]).sum();
            totals.push(floor_denominator(
                sum,
                tolerances.denominator_floor,
                ctx.diagnostics_mut(),
                || format!("{carrier} {quantity} mix weights @ {year}"),
            ));
        }

        let weights: Map<TechnologyId, Trajectory> = productions
            .iter()
            .map(|(technology, production)| {
                let values = production
                    .values()
                    .iter()
                    .zip(totals.iter())
                    .map(|(p, total)| p / total.value)
                    .collect();
                (technology.clone(), production.with_values(values))
            })
            .collect();

        let mut partials = Vec::with_capacity(n * n);
        for (j, weight) in weights.iter() {
            let gate: Vec<f64> = weight
                .values()
                .iter()
                .map(|&w| step(w, tolerances.negligible_weight))
                .collect();

            for i in productions.keys() {
                let kronecker = if i == j { 1.0 } else { 0.0 };
                let diagonal = (0..m)
                    .map(|k| {
                        let total = totals[k];
                        gate[k] * (kronecker - weight.values()[k] * total.derivative()) / total.value
                    })
                    .collect();
                partials.push(Partial::new(
                    VariableId::MixWeight(carrier.clone(), j.clone()),
                    VariableId::TechnologyOutput(carrier.clone(), i.clone(), quantity.clone()),
                    DerivativeBlock::diagonal(diagonal),
                ));
            }
        }

        event!(
            Level::DEBUG,
            carrier = carrier.as_str(),
            quantity = quantity.as_str(),
            technologies = n,
            "computed mix weights"
        );

        Ok(Self {
            carrier: carrier.clone(),
            quantity: quantity.clone(),
            weights,
            partials,
        })
    }

    /// The carrier
    pub fn carrier(&self) -> &CarrierId {
        &self.carrier
    }

    /// The quantity the weights were computed from
    pub fn quantity(&self) -> &QuantityName {
        &self.quantity
    }

    /// The weight of every technology
    pub fn weights(&self) -> &Map<TechnologyId, Trajectory> {
        &self.weights
    }

    /// The weight of `technology`
    pub fn weight(&self, technology: &TechnologyId) -> Option<&Trajectory> {
        self.weights.get(technology)
    }
}

impl LocalSensitivities for MixWeights {
    fn partials(&self) -> Vec<Partial> {
        self.partials.clone()
    }
}

/// A carrier property averaged over its technologies: `y = Σ_j w_j · r_j`.
#[derive(Clone, Debug)]
pub struct MixedProperty {
    value: Trajectory,
    partials: Vec<Partial>,
}

impl MixedProperty {
    /// Average `values` with the given mix weights.
    ///
    /// Every weighted technology needs a value on the same years.
    pub fn compute(
        ctx: &EvaluationContext,
        property: &QuantityName,
        weights: &MixWeights,
        values: &Map<TechnologyId, Trajectory>,
    ) -> Result<Self, EvaluationError> {
        let carrier = weights.carrier();
        let threshold = ctx.tolerances().negligible_weight;
        let output = VariableId::CarrierOutput(carrier.clone(), property.clone());

        let mut mixed: Option<Vec<f64>> = None;
        let mut years: Option<&Trajectory> = None;
        let mut partials = Vec::with_capacity(2 * weights.weights().len());

        for (technology, weight) in weights.weights().iter() {
            let value = values
                .get(technology)
                .ok_or_else(|| EvaluationError::MissingTechnology {
                    carrier: carrier.clone(),
                    technology: technology.clone(),
                })?;
            ensure_same_years(weight, value, || format!("{carrier}.{technology} {property}"))?;

            let sum = mixed.get_or_insert_with(|| vec![0.0; weight.len()]);
            for (total, (w, r)) in sum.iter_mut().zip(weight.values().iter().zip(value.values())) {
                *total += w * r;
            }
            years.get_or_insert(weight);

            partials.push(Partial::new(
                output.clone(),
                VariableId::MixWeight(carrier.clone(), technology.clone()),
                DerivativeBlock::diagonal(value.values().to_vec()),
            ));
            partials.push(Partial::new(
                output.clone(),
                VariableId::TechnologyOutput(carrier.clone(), technology.clone(), property.clone()),
                DerivativeBlock::diagonal(
                    weight
                        .values()
                        .iter()
                        .map(|&w| step(w, threshold) * w)
                        .collect(),
                ),
            ));
        }

        let value = match (years, mixed) {
            (Some(years), Some(mixed)) => years.with_values(mixed),
            _ => ctx.trajectory(vec![0.0; ctx.years().len()]),
        };

        event!(
            Level::DEBUG,
            carrier = carrier.as_str(),
            property = property.as_str(),
            "computed mixed property"
        );

        Ok(Self { value, partials })
    }

    /// The mixed trajectory
    pub fn value(&self) -> &Trajectory {
        &self.value
    }
}

impl LocalSensitivities for MixedProperty {
    fn partials(&self) -> Vec<Partial> {
        self.partials.clone()
    }
}
