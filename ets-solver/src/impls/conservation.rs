use crate::{floor_denominator, smoothed_abs, smoothed_abs_derivative};
use ets_core::{
    models::{
        AlignmentError, ConfigurationError, DerivativeBlock, EvaluationContext, Trajectory,
        VariableId,
    },
    ports::{LocalSensitivities, Partial},
};
use tracing::{Level, event};

/// The normalization constants of the conservation constraint.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConservationSettings {
    /// Divides the per-year residual
    pub reference_scale: f64,
    /// Divides the scalar objective
    pub objective_scale: f64,
    /// Unit factor applied to the available investment before comparison
    #[cfg_attr(feature = "serde", serde(default = "unit_scaling"))]
    pub available_scaling: f64,
}

#[cfg(feature = "serde")]
fn unit_scaling() -> f64 {
    1.0
}

impl ConservationSettings {
    /// Settings without any unit conversion of the available investment
    pub fn new(reference_scale: f64, objective_scale: f64) -> Self {
        Self {
            reference_scale,
            objective_scale,
            available_scaling: 1.0,
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("reference_scale", self.reference_scale),
            ("objective_scale", self.objective_scale),
            ("available_scaling", self.available_scaling),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::Scale { name, value });
            }
        }
        Ok(())
    }
}

/// Checks that the allocated investment matches the available investment.
///
/// Produces the normalized per-year residual, usable as an equality
/// constraint, and a smooth scalar penalty on its magnitude relative to what
/// was available.
#[derive(Clone, Debug)]
pub struct ConservationMonitor {
    settings: ConservationSettings,
}

impl ConservationMonitor {
    /// Creates a monitor, rejecting zero, negative or non-finite scales
    pub fn new(settings: ConservationSettings) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// The normalization constants
    pub fn settings(&self) -> &ConservationSettings {
        &self.settings
    }

    /// Compare `allocated` against `available`.
    ///
    /// Both trajectories must share the same years.
    pub fn evaluate(
        &self,
        ctx: &mut EvaluationContext,
        available: &Trajectory,
        allocated: &Trajectory,
    ) -> Result<ConservationOutcome, AlignmentError> {
        allocated.align_to(available, || "investment conservation".into(), "the available investment")?;
        available.align_to(allocated, || "investment conservation".into(), "the allocated investment")?;

        let ConservationSettings {
            reference_scale,
            objective_scale,
            available_scaling,
        } = self.settings;
        let tolerances = *ctx.tolerances();
        let m = available.len();

        let mut residual = Vec::with_capacity(m);
        let mut objective = 0.0;
        let mut d_available = Vec::with_capacity(m);
        let mut d_allocated = Vec::with_capacity(m);

        for ((year, a), b) in available.iter().zip(allocated.values()) {
            let scaled = a * available_scaling;
            let delta = scaled - b;
            residual.push(delta / reference_scale);

            let denominator = floor_denominator(
                scaled,
                tolerances.denominator_floor,
                ctx.diagnostics_mut(),
                || format!("available investment @ {year}"),
            );
            let s = smoothed_abs(delta, tolerances.smoothing_epsilon);
            let ds = smoothed_abs_derivative(delta, tolerances.smoothing_epsilon);
            let f = denominator.value;

            objective += s / f / objective_scale;
            d_available.push(
                (ds * available_scaling / f
                    - s * denominator.derivative() * available_scaling / (f * f))
                    / objective_scale,
            );
            d_allocated.push(-ds / f / objective_scale);
        }

        event!(
            Level::DEBUG,
            years = m,
            objective,
            "evaluated investment conservation"
        );

        let partials = vec![
            Partial::new(
                VariableId::ConservationResidual,
                VariableId::AvailableInvestment,
                DerivativeBlock::diagonal(vec![available_scaling / reference_scale; m]),
            ),
            Partial::new(
                VariableId::ConservationResidual,
                VariableId::AllocatedInvestment,
                DerivativeBlock::diagonal(vec![-1.0 / reference_scale; m]),
            ),
            Partial::new(
                VariableId::ConservationObjective,
                VariableId::AvailableInvestment,
                DerivativeBlock::row(d_available),
            ),
            Partial::new(
                VariableId::ConservationObjective,
                VariableId::AllocatedInvestment,
                DerivativeBlock::row(d_allocated),
            ),
        ];

        Ok(ConservationOutcome {
            residual: available.with_values(residual),
            objective,
            partials,
        })
    }
}

/// The constraint and penalty of one evaluation.
#[derive(Clone, Debug)]
pub struct ConservationOutcome {
    residual: Trajectory,
    objective: f64,
    partials: Vec<Partial>,
}

impl ConservationOutcome {
    /// `(available − allocated) / reference_scale`, per year
    pub fn residual(&self) -> &Trajectory {
        &self.residual
    }

    /// The smooth penalty on the residual magnitude
    pub fn objective(&self) -> f64 {
        self.objective
    }
}

impl LocalSensitivities for ConservationOutcome {
    fn partials(&self) -> Vec<Partial> {
        self.partials.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ets_core::models::{RunConfig, Tolerances};
    use rstest::{fixture, rstest};

    #[fixture]
    fn ctx() -> EvaluationContext {
        EvaluationContext::new(RunConfig::new(2020, 2023, 1).unwrap())
    }

    #[fixture]
    fn monitor() -> ConservationMonitor {
        ConservationMonitor::new(ConservationSettings::new(100.0, 2.0)).unwrap()
    }

    #[rstest]
    fn test_balanced_investment_is_exactly_zero(mut ctx: EvaluationContext, monitor: ConservationMonitor) {
        let available = ctx.trajectory(vec![10.0, 20.0, 30.0, 40.0]);
        let outcome = monitor.evaluate(&mut ctx, &available, &available.clone()).unwrap();

        assert!(outcome.residual().values().iter().all(|&r| r == 0.0));
        assert_eq!(outcome.objective(), 0.0);
        assert_eq!(ctx.diagnostics().degeneracy_count(), 0);
    }

    #[rstest]
    fn test_residual_and_objective(mut ctx: EvaluationContext, monitor: ConservationMonitor) {
        let available = ctx.trajectory(vec![10.0, 20.0, 30.0, 40.0]);
        let allocated = ctx.trajectory(vec![12.0, 20.0, 27.0, 40.0]);
        let outcome = monitor.evaluate(&mut ctx, &available, &allocated).unwrap();

        assert_eq!(outcome.residual().values(), &[-0.02, 0.0, 0.03, 0.0]);
        // |−2| / 10 + |3| / 30, halved
        assert_abs_diff_eq!(outcome.objective(), 0.15, epsilon = 1e-12);
    }

    #[rstest]
    fn test_objective_gradient_matches_difference_quotient(
        mut ctx: EvaluationContext,
        monitor: ConservationMonitor,
    ) {
        let available = ctx.trajectory(vec![10.0, 20.0, 30.0, 40.0]);
        let allocated = ctx.trajectory(vec![12.0, 19.0, 27.0, 41.5]);
        let outcome = monitor.evaluate(&mut ctx, &available, &allocated).unwrap();
        let partials = outcome.partials();

        let h = 1e-6;
        for k in 0..4 {
            let mut up = available.values().to_vec();
            let mut down = up.clone();
            up[k] += h;
            down[k] -= h;
            let f = |values: Vec<f64>, ctx: &mut EvaluationContext| {
                let shifted = available.with_values(values);
                monitor.evaluate(ctx, &shifted, &allocated).unwrap().objective()
            };
            let fd = (f(up, &mut ctx) - f(down, &mut ctx)) / (2.0 * h);
            assert_abs_diff_eq!(partials[2].block.get(0, k), fd, epsilon = 1e-6);

            let mut up = allocated.values().to_vec();
            let mut down = up.clone();
            up[k] += h;
            down[k] -= h;
            let g = |values: Vec<f64>, ctx: &mut EvaluationContext| {
                let shifted = allocated.with_values(values);
                monitor.evaluate(ctx, &available, &shifted).unwrap().objective()
            };
            let fd = (g(up, &mut ctx) - g(down, &mut ctx)) / (2.0 * h);
            assert_abs_diff_eq!(partials[3].block.get(0, k), fd, epsilon = 1e-6);
        }
    }

    #[rstest]
    fn test_zero_available_is_floored(mut ctx: EvaluationContext, monitor: ConservationMonitor) {
        let available = ctx.trajectory(vec![0.0, 20.0, 30.0, 40.0]);
        let allocated = ctx.trajectory(vec![0.0, 20.0, 30.0, 40.0]);
        let outcome = monitor.evaluate(&mut ctx, &available, &allocated).unwrap();

        assert!(outcome.objective().is_finite());
        assert_eq!(ctx.diagnostics().degeneracy_count(), 1);
        assert!(ctx.diagnostics().degeneracies()[0].location.contains("2020"));
    }

    #[test]
    fn test_floored_available_gradient_uses_the_constant_floor() {
        let tolerances = Tolerances {
            denominator_floor: 5.0,
            ..Default::default()
        };
        let mut ctx =
            EvaluationContext::new(RunConfig::with_tolerances(2020, 2023, 1, tolerances).unwrap());
        let monitor = ConservationMonitor::new(ConservationSettings {
            available_scaling: 2.0,
            ..ConservationSettings::new(100.0, 2.0)
        })
        .unwrap();
        // scaled available is [2, 20, 30, 40]; 2020 falls below the floor
        let available = ctx.trajectory(vec![1.0, 10.0, 15.0, 20.0]);
        let allocated = ctx.trajectory(vec![3.0, 20.0, 27.0, 40.0]);
        let outcome = monitor.evaluate(&mut ctx, &available, &allocated).unwrap();
        assert_eq!(ctx.diagnostics().degeneracy_count(), 1);

        let epsilon = tolerances.smoothing_epsilon;
        let ds = smoothed_abs_derivative(-1.0, epsilon);
        let partials = outcome.partials();
        assert_eq!(partials[2].block.get(0, 0), ds * 2.0 / 5.0 / 2.0);
        assert_eq!(partials[3].block.get(0, 0), -ds / 5.0 / 2.0);

        let h = 1e-7;
        let f = |a0: f64, ctx: &mut EvaluationContext| {
            let mut values = available.values().to_vec();
            values[0] = a0;
            monitor
                .evaluate(ctx, &available.with_values(values), &allocated)
                .unwrap()
                .objective()
        };
        let fd = (f(1.0 + h, &mut ctx) - f(1.0 - h, &mut ctx)) / (2.0 * h);
        assert_abs_diff_eq!(partials[2].block.get(0, 0), fd, epsilon = 1e-6);
    }

    #[rstest]
    fn test_available_scaling(mut ctx: EvaluationContext) {
        let monitor = ConservationMonitor::new(ConservationSettings {
            available_scaling: 1000.0,
            ..ConservationSettings::new(1.0, 1.0)
        })
        .unwrap();
        let available = ctx.trajectory(vec![1.0; 4]);
        let allocated = ctx.trajectory(vec![1000.0; 4]);
        let outcome = monitor.evaluate(&mut ctx, &available, &allocated).unwrap();

        assert!(outcome.residual().values().iter().all(|&r| r == 0.0));
        assert_eq!(outcome.partials()[0].block, DerivativeBlock::diagonal(vec![1000.0; 4]));
    }

    #[rstest]
    fn test_misaligned_years(mut ctx: EvaluationContext, monitor: ConservationMonitor) {
        let available = ctx.trajectory(vec![1.0; 4]);
        let allocated = Trajectory::new(vec![2020, 2021, 2022, 2030], vec![1.0; 4]).unwrap();
        let err = monitor.evaluate(&mut ctx, &available, &allocated).unwrap_err();
        assert_eq!(err.year, 2030);
    }

    #[test]
    fn test_deserialize_settings_defaults_to_unit_scaling() {
        let raw = r#"{ "reference_scale": 100.0, "objective_scale": 1.0 }"#;
        let settings = serde_json::from_str::<ConservationSettings>(raw).unwrap();
        assert_eq!(settings, ConservationSettings::new(100.0, 1.0));
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(1.0, f64::NAN)]
    #[case(-5.0, 1.0)]
    fn test_invalid_scales(#[case] reference: f64, #[case] objective: f64) {
        assert!(matches!(
            ConservationMonitor::new(ConservationSettings::new(reference, objective)),
            Err(ConfigurationError::Scale { .. })
        ));
    }
}
