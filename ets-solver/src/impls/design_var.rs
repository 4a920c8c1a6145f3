use super::bspline::{SplineError, expand};
use crate::Map;
use ets_core::{
    models::{
        CarrierId, ConfigurationError, ControlKey, ControlPoint, ControlPointSet, DerivativeBlock,
        DesignSpace, DesignSpaceEntry, DesignVector, EvaluationContext, QuantityName,
        TechnologyId, Trajectory, VariableId,
    },
    ports::{LocalSensitivities, Partial},
};
use ndarray::{Array1, Array2, Axis};
use tracing::{Level, event};

/// Rebuild the full control vector of `key` from the optimizer's activated values.
///
/// Locked points take their fixed design-space value at their flagged
/// position; activated points take the next value of `activated`, in order.
pub fn reinsert(
    key: &ControlKey,
    entry: &DesignSpaceEntry,
    activated: &[f64],
) -> Result<ControlPointSet, ConfigurationError> {
    entry.validate(key)?;

    let expected = entry.activated_count();
    if activated.len() != expected {
        return Err(ConfigurationError::ActivatedCount {
            key: key.clone(),
            expected,
            actual: activated.len(),
        });
    }

    let mut free = activated.iter().copied();
    let points = entry
        .value
        .iter()
        .zip(entry.activated.iter())
        .map(|(&fixed, &flag)| ControlPoint {
            // the counts match, so `free` is never exhausted here
            value: if flag { free.next().unwrap_or(fixed) } else { fixed },
            activated: flag,
        })
        .collect();

    ControlPointSet::new(key.clone(), points)
}

/// The expansion of one design variable, with the locked points folded out.
///
/// `trajectory = basis · activated + offset`, where `basis` only keeps the
/// columns of the activated points and `offset` holds the contribution of the
/// locked ones.
#[derive(Clone, Debug)]
pub struct LockedExpansion {
    key: ControlKey,
    trajectory: Trajectory,
    basis: Array2<f64>,
    offset: Array1<f64>,
}

impl LockedExpansion {
    /// Expand a full control point set over the context's years
    pub fn new(ctx: &EvaluationContext, points: &ControlPointSet) -> Result<Self, ConfigurationError> {
        let key = points.key().clone();
        let expansion = expand(&points.values(), ctx.years().len()).map_err(|err| match err {
            SplineError::NoControlPoints => ConfigurationError::EmptyControlSet(key.clone()),
            SplineError::NoSamples => ConfigurationError::EmptySampleGrid,
        })?;

        let locked = points.locked_positions();
        let locked_values: Array1<f64> = locked.iter().map(|&i| points.points()[i].value).collect();
        let offset = expansion
            .basis
            .select(Axis(1), &locked)
            .dot(&locked_values);
        let basis = expansion.basis.select(Axis(1), &points.activated_positions());

        Ok(Self {
            trajectory: ctx.trajectory(expansion.values),
            key,
            basis,
            offset,
        })
    }

    /// The design variable
    pub fn key(&self) -> &ControlKey {
        &self.key
    }

    /// The expanded yearly trajectory
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// The visible `years × activated` basis
    pub fn basis(&self) -> &Array2<f64> {
        &self.basis
    }

    /// The contribution of the locked points
    pub fn offset(&self) -> &Array1<f64> {
        &self.offset
    }

    /// `d Trajectory(key) / d Control(key)`
    pub fn partial(&self) -> Partial {
        Partial::new(
            VariableId::Trajectory(self.key.clone()),
            VariableId::Control(self.key.clone()),
            DerivativeBlock::Dense(self.basis.clone()),
        )
    }
}

/// Translates design vectors into yearly trajectories.
///
/// Holds the design-space table for the whole optimization; every call to
/// [`DesignVariables::evaluate`] is independent of the previous ones.
#[derive(Clone, Debug)]
pub struct DesignVariables {
    space: DesignSpace,
}

impl DesignVariables {
    /// Validates every entry of the design space up front
    pub fn new(space: DesignSpace) -> Result<Self, ConfigurationError> {
        for (key, entry) in space.iter() {
            entry.validate(key)?;
        }
        Ok(Self { space })
    }

    /// The design-space table
    pub fn space(&self) -> &DesignSpace {
        &self.space
    }

    /// Expand every declared design variable for one design vector.
    ///
    /// A key of the design vector without a design-space entry is an error;
    /// a declared key absent from the design vector is only accepted when all
    /// of its points are locked.
    pub fn evaluate(
        &self,
        ctx: &EvaluationContext,
        design: &DesignVector,
    ) -> Result<DesignOutcome, ConfigurationError> {
        for key in design.keys() {
            self.space.entry(key)?;
        }

        let mut expansions = Map::default();
        for (key, entry) in self.space.iter() {
            let activated = design.get(key).map(Vec::as_slice).unwrap_or_default();
            let points = reinsert(key, entry, activated)?;
            let expansion = LockedExpansion::new(ctx, &points)?;

            event!(
                Level::DEBUG,
                key = %key,
                controls = points.len(),
                activated = expansion.basis().ncols(),
                years = expansion.trajectory().len(),
                "expanded design variable"
            );
            expansions.insert(key.clone(), expansion);
        }

        Ok(DesignOutcome { expansions })
    }
}

/// The trajectories of one evaluation, arranged into the published tables.
#[derive(Clone, Debug, Default)]
pub struct DesignOutcome {
    expansions: Map<ControlKey, LockedExpansion>,
}

impl DesignOutcome {
    /// The expansion of `key`
    pub fn expansion(&self, key: &ControlKey) -> Option<&LockedExpansion> {
        self.expansions.get(key)
    }

    /// The trajectory of `key`
    pub fn trajectory(&self, key: &ControlKey) -> Option<&Trajectory> {
        self.expansion(key).map(LockedExpansion::trajectory)
    }

    /// Every expansion, in design-space order
    pub fn expansions(&self) -> impl Iterator<Item = &LockedExpansion> {
        self.expansions.values()
    }

    /// The carriers owning at least one technology mix
    pub fn carriers(&self) -> Vec<CarrierId> {
        let mut carriers: Vec<CarrierId> = Vec::new();
        for key in self.expansions.keys() {
            match key {
                ControlKey::Technology(carrier, _) if !carriers.contains(carrier) => {
                    carriers.push(carrier.clone())
                }
                _ => {}
            }
        }
        carriers
    }

    /// The technology investment-mix table of `carrier`
    pub fn techno_mix(&self, carrier: &CarrierId) -> Map<TechnologyId, Trajectory> {
        self.expansions
            .iter()
            .filter_map(|(key, expansion)| match key {
                ControlKey::Technology(c, technology) if c == carrier => {
                    Some((technology.clone(), expansion.trajectory().clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// The carrier-level investment-mix table
    pub fn carrier_mix(&self) -> Map<CarrierId, Trajectory> {
        self.expansions
            .iter()
            .filter_map(|(key, expansion)| match key {
                ControlKey::Carrier(carrier) => {
                    Some((carrier.clone(), expansion.trajectory().clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// The named system-wide trajectories
    pub fn named(&self) -> Map<QuantityName, Trajectory> {
        self.expansions
            .iter()
            .filter_map(|(key, expansion)| match key {
                ControlKey::Named(name) => Some((name.clone(), expansion.trajectory().clone())),
                _ => None,
            })
            .collect()
    }
}

impl LocalSensitivities for DesignOutcome {
    fn partials(&self) -> Vec<Partial> {
        self.expansions.values().map(LockedExpansion::partial).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ets_core::models::RunConfig;

    fn ctx(years: i32) -> EvaluationContext {
        EvaluationContext::new(RunConfig::new(2020, 2020 + years - 1, 1).unwrap())
    }

    fn key() -> ControlKey {
        ControlKey::technology("methane", "Methanation")
    }

    fn entry(value: Vec<f64>, activated: Vec<bool>) -> DesignSpaceEntry {
        DesignSpaceEntry { value, activated }
    }

    #[test]
    fn test_reinsert_at_flagged_positions() {
        let entry = entry(vec![1.0, 2.0, 3.0, 4.0], vec![false, true, false, true]);
        let points = reinsert(&key(), &entry, &[20.0, 40.0]).unwrap();
        assert_eq!(points.values(), vec![1.0, 20.0, 3.0, 40.0]);
        assert_eq!(points.locked_positions(), vec![0, 2]);
    }

    #[test]
    fn test_reinsert_count_mismatch() {
        let entry = entry(vec![1.0, 2.0, 3.0], vec![true, true, false]);
        assert_eq!(
            reinsert(&key(), &entry, &[5.0]).unwrap_err(),
            ConfigurationError::ActivatedCount {
                key: key(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_trajectory_is_basis_times_activated_plus_offset() {
        let ctx = ctx(10);
        let entry = entry(vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![true, false, true, true, false]);
        let activated = [0.5, -2.0, 7.0];
        let expansion = LockedExpansion::new(&ctx, &reinsert(&key(), &entry, &activated).unwrap()).unwrap();

        assert_eq!(expansion.basis().dim(), (10, 3));
        let rebuilt = expansion.basis().dot(&Array1::from(activated.to_vec())) + expansion.offset();
        for (a, b) in rebuilt.iter().zip(expansion.trajectory().values()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_locked_value_moves_trajectory_not_basis() {
        let ctx = ctx(8);
        let flags = vec![true, false, true, true];
        let a = LockedExpansion::new(
            &ctx,
            &reinsert(&key(), &entry(vec![0.0, 1.0, 0.0, 0.0], flags.clone()), &[1.0, 2.0, 3.0]).unwrap(),
        )
        .unwrap();
        let b = LockedExpansion::new(
            &ctx,
            &reinsert(&key(), &entry(vec![0.0, 9.0, 0.0, 0.0], flags), &[1.0, 2.0, 3.0]).unwrap(),
        )
        .unwrap();

        assert_eq!(a.basis(), b.basis());
        assert_ne!(a.trajectory(), b.trajectory());
    }

    #[test]
    fn test_all_locked_has_zero_columns() {
        let ctx = ctx(5);
        let points = reinsert(&key(), &entry(vec![1.0, 3.0], vec![false, false]), &[]).unwrap();
        let expansion = LockedExpansion::new(&ctx, &points).unwrap();

        assert_eq!(expansion.basis().dim(), (5, 0));
        assert_abs_diff_eq!(expansion.trajectory().values()[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(expansion.trajectory().values()[4], 3.0, epsilon = 1e-12);
        assert_eq!(expansion.partial().block.shape(), (5, 0));
    }

    #[test]
    fn test_unknown_design_key() {
        let space: DesignSpace = [(key(), DesignSpaceEntry::activated(vec![1.0, 2.0]))]
            .into_iter()
            .collect();
        let variables = DesignVariables::new(space).unwrap();

        let mut design = variables.space().initial_design_vector();
        design.insert(ControlKey::carrier("hydrogen"), vec![1.0]);
        assert_eq!(
            variables.evaluate(&ctx(4), &design).unwrap_err(),
            ConfigurationError::MissingEntry(ControlKey::carrier("hydrogen"))
        );
    }

    #[test]
    fn test_invalid_space_is_rejected_up_front() {
        let space: DesignSpace = [(key(), entry(vec![1.0, 2.0], vec![true]))]
            .into_iter()
            .collect();
        assert!(matches!(
            DesignVariables::new(space),
            Err(ConfigurationError::FlagLength { .. })
        ));
    }

    #[test]
    fn test_tables() {
        let space: DesignSpace = [
            (key(), DesignSpaceEntry::activated(vec![1.0, 2.0])),
            (
                ControlKey::technology("methane", "FossilGas"),
                DesignSpaceEntry::activated(vec![3.0, 3.0]),
            ),
            (ControlKey::carrier("methane"), DesignSpaceEntry::activated(vec![0.4])),
            (ControlKey::named("ccs_percentage"), DesignSpaceEntry::activated(vec![10.0])),
        ]
        .into_iter()
        .collect();
        let variables = DesignVariables::new(space).unwrap();
        let outcome = variables
            .evaluate(&ctx(3), &variables.space().initial_design_vector())
            .unwrap();

        let methane = CarrierId::from("methane");
        assert_eq!(outcome.carriers(), vec![methane.clone()]);
        assert_eq!(
            outcome.techno_mix(&methane).keys().collect::<Vec<_>>(),
            vec![&TechnologyId::from("Methanation"), &TechnologyId::from("FossilGas")]
        );
        assert_eq!(outcome.carrier_mix()[&methane].values(), &[0.4, 0.4, 0.4]);
        assert_eq!(outcome.named().len(), 1);
        assert_eq!(outcome.partials().len(), 4);
    }
}
