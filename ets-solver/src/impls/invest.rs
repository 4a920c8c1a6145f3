use crate::Map;
use ets_core::{
    models::{
        AlignmentError, CarrierId, ControlKey, DerivativeBlock, EvaluationContext, TechnologyId,
        Trajectory, VariableId,
    },
    ports::{LocalSensitivities, Partial},
};
use ndarray::Array2;
use tracing::{Level, event};

/// Splits the total investment of a carrier among its technologies.
///
/// Each technology receives `total × share` in every year of its mix
/// trajectory. Shares are taken as given: they need not sum to one.
#[derive(Clone, Copy, Debug, Default)]
pub struct InvestmentAllocator;

impl InvestmentAllocator {
    /// Allocate `total` among the technologies of `carrier`.
    ///
    /// Every year of every mix trajectory must be present in `total`.
    pub fn allocate(
        &self,
        carrier: &CarrierId,
        mix: &Map<TechnologyId, Trajectory>,
        total: &Trajectory,
    ) -> Result<CarrierAllocation, AlignmentError> {
        let mut investments = Map::default();
        let mut partials = Vec::with_capacity(2 * mix.len());

        for (technology, share) in mix.iter() {
            let part = split(share, total, || format!("{carrier}.{technology} investment mix"))?;

            let output = VariableId::TechnologyInvestment(carrier.clone(), technology.clone());
            partials.push(Partial::new(
                output.clone(),
                VariableId::Trajectory(ControlKey::Technology(carrier.clone(), technology.clone())),
                part.d_share,
            ));
            partials.push(Partial::new(
                output,
                VariableId::CarrierInvestment(carrier.clone()),
                part.d_total,
            ));
            investments.insert(technology.clone(), part.investment);
        }

        event!(
            Level::DEBUG,
            carrier = carrier.as_str(),
            technologies = investments.len(),
            "allocated carrier investment"
        );

        Ok(CarrierAllocation {
            carrier: carrier.clone(),
            investments,
            partials,
        })
    }

    /// Derive carrier totals from the carrier-level investment mix.
    ///
    /// `available` is the system-wide investment, multiplied by `scaling` to
    /// express it in the unit of the technology investments.
    pub fn split_carriers(
        &self,
        mix: &Map<CarrierId, Trajectory>,
        available: &Trajectory,
        scaling: f64,
    ) -> Result<CarrierSplit, AlignmentError> {
        let scaled = available.map(|a| a * scaling);
        let mut totals = Map::default();
        let mut partials = Vec::with_capacity(2 * mix.len());

        for (carrier, share) in mix.iter() {
            let part = split(share, &scaled, || format!("{carrier} investment mix"))?;

            let output = VariableId::CarrierInvestment(carrier.clone());
            partials.push(Partial::new(
                output.clone(),
                VariableId::Trajectory(ControlKey::Carrier(carrier.clone())),
                part.d_share,
            ));
            partials.push(Partial::new(
                output,
                VariableId::AvailableInvestment,
                part.d_total.scale(scaling),
            ));
            totals.insert(carrier.clone(), part.investment);
        }

        Ok(CarrierSplit { totals, partials })
    }
}

struct Split {
    investment: Trajectory,
    d_share: DerivativeBlock,
    d_total: DerivativeBlock,
}

// investment = share × total on the years of `share`
fn split(
    share: &Trajectory,
    total: &Trajectory,
    context: impl FnOnce() -> String,
) -> Result<Split, AlignmentError> {
    let positions = share.align_to(total, context, "the total investment")?;
    let totals: Vec<f64> = positions.iter().map(|&p| total.values()[p]).collect();
    let values = share
        .values()
        .iter()
        .zip(totals.iter())
        .map(|(s, t)| s * t)
        .collect();

    Ok(Split {
        investment: share.with_values(values),
        d_share: DerivativeBlock::diagonal(totals),
        d_total: selection(share.values(), &positions, total.len(), share.is_aligned_with(total)),
    })
}

// d(out)/d(in) where out[k] = weights[k] · in[positions[k]]
fn selection(weights: &[f64], positions: &[usize], cols: usize, aligned: bool) -> DerivativeBlock {
    if aligned {
        return DerivativeBlock::diagonal(weights.to_vec());
    }
    let mut matrix = Array2::zeros((weights.len(), cols));
    for (k, (&w, &p)) in weights.iter().zip(positions).enumerate() {
        matrix[[k, p]] = w;
    }
    DerivativeBlock::Dense(matrix)
}

/// Carrier totals derived from the carrier-level investment mix.
#[derive(Clone, Debug, Default)]
pub struct CarrierSplit {
    totals: Map<CarrierId, Trajectory>,
    partials: Vec<Partial>,
}

impl CarrierSplit {
    /// The total investment of each carrier
    pub fn totals(&self) -> &Map<CarrierId, Trajectory> {
        &self.totals
    }
}

impl LocalSensitivities for CarrierSplit {
    fn partials(&self) -> Vec<Partial> {
        self.partials.clone()
    }
}

/// The technology investments of one carrier.
#[derive(Clone, Debug)]
pub struct CarrierAllocation {
    carrier: CarrierId,
    investments: Map<TechnologyId, Trajectory>,
    partials: Vec<Partial>,
}

impl CarrierAllocation {
    /// The carrier
    pub fn carrier(&self) -> &CarrierId {
        &self.carrier
    }

    /// The absolute investment of each technology
    pub fn investments(&self) -> &Map<TechnologyId, Trajectory> {
        &self.investments
    }
}

impl LocalSensitivities for CarrierAllocation {
    fn partials(&self) -> Vec<Partial> {
        self.partials.clone()
    }
}

/// The yearly sum of every technology investment over the run's years.
#[derive(Clone, Debug)]
pub struct AllocatedSum {
    trajectory: Trajectory,
    partials: Vec<Partial>,
}

impl AllocatedSum {
    /// Sum every technology investment of every carrier on the run's years
    pub fn new(
        ctx: &EvaluationContext,
        allocations: &[CarrierAllocation],
    ) -> Result<Self, AlignmentError> {
        let grid = ctx.trajectory(vec![0.0; ctx.years().len()]);
        let mut sum = vec![0.0; grid.len()];
        let mut partials = Vec::new();

        for allocation in allocations {
            for (technology, investment) in allocation.investments().iter() {
                let positions = grid.align_to(
                    investment,
                    || format!("{}.{technology} allocated investment", allocation.carrier()),
                    "the technology investment",
                )?;
                let ones = vec![1.0; positions.len()];
                for (total, &p) in sum.iter_mut().zip(positions.iter()) {
                    *total += investment.values()[p];
                }
                partials.push(Partial::new(
                    VariableId::AllocatedInvestment,
                    VariableId::TechnologyInvestment(allocation.carrier().clone(), technology.clone()),
                    selection(&ones, &positions, investment.len(), grid.is_aligned_with(investment)),
                ));
            }
        }

        Ok(Self {
            trajectory: grid.with_values(sum),
            partials,
        })
    }

    /// The summed trajectory
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }
}

impl LocalSensitivities for AllocatedSum {
    fn partials(&self) -> Vec<Partial> {
        self.partials.clone()
    }
}
