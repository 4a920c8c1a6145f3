use approx::assert_abs_diff_eq;
use ets_core::{
    models::{
        CarrierId, ControlKey, DesignSpace, DesignSpaceEntry, Map, RunConfig, TechnologyId,
        Trajectory, VariableId,
    },
    ports::GradientQuery,
};
use ets_solver::{ConservationSettings, InvestmentChain, InvestmentScenario};
use rstest::*;

const H: f64 = 1e-6;

fn methanation() -> ControlKey {
    ControlKey::technology("methane", "Methanation")
}

fn fossil_gas() -> ControlKey {
    ControlKey::technology("methane", "FossilGas")
}

fn electrolysis() -> ControlKey {
    ControlKey::technology("hydrogen", "Electrolysis")
}

fn hydrogen_mix() -> ControlKey {
    ControlKey::carrier("hydrogen")
}

#[fixture]
pub fn config() -> RunConfig {
    RunConfig::new(2020, 2025, 1).unwrap()
}

#[fixture]
pub fn chain() -> InvestmentChain {
    let space: DesignSpace = [
        (
            methanation(),
            DesignSpaceEntry {
                value: vec![0.2, 0.3, 0.4, 0.5],
                activated: vec![false, true, true, true],
            },
        ),
        (fossil_gas(), DesignSpaceEntry::activated(vec![0.8, 0.7, 0.6, 0.5])),
        (electrolysis(), DesignSpaceEntry::activated(vec![0.6, 0.7])),
        (hydrogen_mix(), DesignSpaceEntry::activated(vec![0.3, 0.4, 0.5])),
    ]
    .into_iter()
    .collect();
    InvestmentChain::new(space, ConservationSettings::new(100.0, 2.0)).unwrap()
}

#[fixture]
pub fn scenario(config: RunConfig, chain: InvestmentChain) -> InvestmentScenario {
    let years = config.years();
    InvestmentScenario {
        design: chain.variables().space().initial_design_vector(),
        carrier_totals: [(CarrierId::from("methane"), Trajectory::constant(&years, 100.0))]
            .into_iter()
            .collect(),
        available: Trajectory::new(
            years.clone(),
            years.iter().map(|&y| 280.0 + 5.0 * (y - 2020) as f64).collect(),
        )
        .unwrap(),
    }
}

fn objective(chain: &InvestmentChain, config: &RunConfig, scenario: &InvestmentScenario) -> f64 {
    chain.evaluate(config, scenario).unwrap().conservation().objective()
}

fn residual(chain: &InvestmentChain, config: &RunConfig, scenario: &InvestmentScenario) -> Vec<f64> {
    chain
        .evaluate(config, scenario)
        .unwrap()
        .conservation()
        .residual()
        .values()
        .to_vec()
}

#[rstest]
fn allocates_every_technology(config: RunConfig, chain: InvestmentChain, scenario: InvestmentScenario) {
    let evaluation = chain.evaluate(&config, &scenario).unwrap();

    assert_eq!(evaluation.allocations().len(), 2);
    let hydrogen = &evaluation.carrier_split().totals()[&CarrierId::from("hydrogen")];
    assert_abs_diff_eq!(hydrogen.values()[0], 0.3 * 280.0, epsilon = 1e-9);
    assert_abs_diff_eq!(hydrogen.values()[5], 0.5 * 305.0, epsilon = 1e-9);

    let methane = &evaluation.allocations()[0];
    assert_eq!(methane.carrier().as_str(), "methane");
    let fossil = &methane.investments()[&TechnologyId::from("FossilGas")];
    assert_abs_diff_eq!(fossil.values()[0], 80.0, epsilon = 1e-9);

    let sum: f64 = evaluation
        .allocations()
        .iter()
        .flat_map(|allocation| allocation.investments().values())
        .map(|investment| investment.values()[2])
        .sum();
    assert_abs_diff_eq!(evaluation.allocated().values()[2], sum, epsilon = 1e-9);
    assert_eq!(evaluation.diagnostics().degeneracy_count(), 0);
}

#[rstest]
#[case(methanation())]
#[case(fossil_gas())]
#[case(electrolysis())]
#[case(hydrogen_mix())]
fn objective_gradient_matches_difference_quotient(
    config: RunConfig,
    chain: InvestmentChain,
    scenario: InvestmentScenario,
    #[case] key: ControlKey,
) {
    let evaluation = chain.evaluate(&config, &scenario).unwrap();
    let gradient = evaluation
        .gradient(&VariableId::ConservationObjective, &VariableId::Control(key.clone()))
        .unwrap();
    let activated = scenario.design[&key].len();
    assert_eq!(gradient.shape(), (1, activated));

    for k in 0..activated {
        let mut up = scenario.clone();
        let mut down = scenario.clone();
        up.design.get_mut(&key).unwrap()[k] += H;
        down.design.get_mut(&key).unwrap()[k] -= H;
        let fd = (objective(&chain, &config, &up) - objective(&chain, &config, &down)) / (2.0 * H);
        assert_abs_diff_eq!(gradient.get(0, k), fd, epsilon = 1e-6);
    }
}

#[rstest]
fn residual_gradient_matches_difference_quotient(
    config: RunConfig,
    chain: InvestmentChain,
    scenario: InvestmentScenario,
) {
    let key = fossil_gas();
    let evaluation = chain.evaluate(&config, &scenario).unwrap();
    let gradient = evaluation
        .gradient(&VariableId::ConservationResidual, &VariableId::Control(key.clone()))
        .unwrap();
    assert_eq!(gradient.shape(), (6, 4));

    for k in 0..4 {
        let mut up = scenario.clone();
        let mut down = scenario.clone();
        up.design.get_mut(&key).unwrap()[k] += H;
        down.design.get_mut(&key).unwrap()[k] -= H;
        let (r_up, r_down) = (residual(&chain, &config, &up), residual(&chain, &config, &down));
        for y in 0..6 {
            let fd = (r_up[y] - r_down[y]) / (2.0 * H);
            assert_abs_diff_eq!(gradient.get(y, k), fd, epsilon = 1e-6);
        }
    }
}

#[rstest]
fn available_investment_paths_are_summed(
    config: RunConfig,
    chain: InvestmentChain,
    scenario: InvestmentScenario,
) {
    // available feeds the objective directly and through the hydrogen total
    let evaluation = chain.evaluate(&config, &scenario).unwrap();
    let gradient = evaluation
        .gradient(&VariableId::ConservationObjective, &VariableId::AvailableInvestment)
        .unwrap();
    assert_eq!(gradient.shape(), (1, 6));

    for k in 0..6 {
        let mut up = scenario.clone();
        let mut down = scenario.clone();
        let mut values = scenario.available.values().to_vec();
        values[k] += H;
        up.available = scenario.available.with_values(values.clone());
        values[k] -= 2.0 * H;
        down.available = scenario.available.with_values(values);
        let fd = (objective(&chain, &config, &up) - objective(&chain, &config, &down)) / (2.0 * H);
        assert_abs_diff_eq!(gradient.get(0, k), fd, epsilon = 1e-6);
    }
}

#[rstest]
fn explicit_total_overrides_carrier_mix(
    config: RunConfig,
    chain: InvestmentChain,
    mut scenario: InvestmentScenario,
) {
    scenario
        .carrier_totals
        .insert(CarrierId::from("hydrogen"), Trajectory::constant(&config.years(), 50.0));
    let evaluation = chain.evaluate(&config, &scenario).unwrap();

    assert!(evaluation.carrier_split().totals().is_empty());
    let gradient = evaluation
        .gradient(&VariableId::ConservationObjective, &VariableId::Control(hydrogen_mix()))
        .unwrap();
    assert!(gradient.is_zero());
}

#[rstest]
fn balanced_scenario_has_zero_objective(config: RunConfig, chain: InvestmentChain, scenario: InvestmentScenario) {
    let first = chain.evaluate(&config, &scenario).unwrap();
    let balanced = InvestmentScenario {
        available: first.allocated().clone(),
        carrier_totals: [
            (CarrierId::from("methane"), Trajectory::constant(&config.years(), 100.0)),
            (
                CarrierId::from("hydrogen"),
                first.carrier_split().totals()[&CarrierId::from("hydrogen")].clone(),
            ),
        ]
        .into_iter()
        .collect::<Map<_, _>>(),
        ..scenario
    };

    let evaluation = chain.evaluate(&config, &balanced).unwrap();
    assert!(evaluation.conservation().residual().values().iter().all(|&r| r == 0.0));
    assert_eq!(evaluation.conservation().objective(), 0.0);
}

#[rstest]
fn scenarios_evaluate_independently(config: RunConfig, chain: InvestmentChain, scenario: InvestmentScenario) {
    let mut shifted = scenario.clone();
    shifted.available = scenario.available.map(|a| a * 1.5);
    let scenarios = vec![scenario.clone(), shifted.clone(), scenario];

    let results = chain.evaluate_all(&config, &scenarios);
    assert_eq!(results.len(), 3);
    let objectives: Vec<f64> = results
        .into_iter()
        .map(|result| result.unwrap().conservation().objective())
        .collect();
    assert_eq!(objectives[0], objectives[2]);
    assert_eq!(objectives[1], objective(&chain, &config, &shifted));
    assert_ne!(objectives[0], objectives[1]);
}

#[rstest]
fn unknown_design_key_is_reported(config: RunConfig, chain: InvestmentChain, mut scenario: InvestmentScenario) {
    scenario.design.insert(ControlKey::named("ccs_percentage"), vec![0.1]);
    let err = chain.evaluate(&config, &scenario).unwrap_err();
    assert!(err.to_string().contains("ccs_percentage"));
}
