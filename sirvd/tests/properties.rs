use sirvd::math::ode::integrate_fixed;
use sirvd::model::sirvd::state_index;
use sirvd::{
    Compartment, ModelParameters, SirvdError, SirvdModel, SirvdState, SolverOptions, Trajectory, VaccinationStart,
};

fn daily(end: usize) -> Vec<f64> {
    (0..=end).map(|d| d as f64).collect()
}

fn single_group(eta: f64, start: VaccinationStart) -> ModelParameters {
    ModelParameters::new(
        vec![vec![0.3]],
        1.0 / 15.0,
        vec![0.0001],
        1.0 / 180.0,
        1.0 / 270.0,
        vec![eta],
        vec![start],
    )
    .expect("valid params")
}

fn three_groups(start: Vec<VaccinationStart>) -> ModelParameters {
    ModelParameters::new(
        vec![
            vec![0.20, 0.05, 0.02],
            vec![0.05, 0.25, 0.04],
            vec![0.02, 0.04, 0.15],
        ],
        1.0 / 10.0,
        vec![0.0001, 0.001, 0.02],
        1.0 / 180.0,
        1.0 / 270.0,
        vec![0.01, 0.02, 0.015],
        start,
    )
    .expect("valid params")
}

fn three_group_state() -> SirvdState {
    SirvdState::from_group_fractions(&[
        [0.99, 0.01, 0.0, 0.0, 0.0],
        [0.98, 0.02, 0.0, 0.0, 0.0],
        [0.95, 0.01, 0.04, 0.0, 0.0],
    ])
    .expect("valid state")
}

fn run(params: ModelParameters, x0: &SirvdState, obs: &[f64]) -> Trajectory {
    SirvdModel::new(params)
        .simulate(x0, obs, &SolverOptions::default())
        .expect("integration succeeds")
}

#[test]
fn sample_scenario_rises_peaks_and_decays() {
    let x0 = SirvdState::from_group_fractions(&[[0.99, 0.01, 0.0, 0.0, 0.0]]).expect("valid state");
    let traj = run(single_group(0.0, VaccinationStart::Never), &x0, &daily(30));
    assert_eq!(traj.len(), 31);
    assert_eq!(traj.times()[30], 30.0);

    let view = traj.view();
    let i = view.series(0, Compartment::Infectious).expect("group 0");
    assert!(i[1] > i[0], "I should rise initially: {} -> {}", i[0], i[1]);
    let (t_peak, i_peak) = view.peak(0, Compartment::Infectious).expect("group 0").expect("non-empty");
    assert!(t_peak > 0.0 && t_peak < 30.0, "peak at {t_peak}");
    assert!(i[30] < i_peak);

    let d = view.series(0, Compartment::Deceased).expect("group 0");
    assert_eq!(d[0], 0.0);
    assert!(d[30] > 0.0);

    for (t, y) in traj.iter() {
        let total: f64 = y.iter().sum();
        assert!((total - 1.0).abs() < 1e-6, "t={t}: total={total}");
    }
}

#[test]
fn group_totals_are_conserved_and_deceased_is_monotone() {
    let start = vec![
        VaccinationStart::Day(12.5),
        VaccinationStart::Never,
        VaccinationStart::Day(40.0),
    ];
    let traj = run(three_groups(start), &three_group_state(), &daily(120));
    assert!(traj.max_conservation_drift() < 1e-6);
    assert!(traj.negative_excursions(1e-9).is_empty());

    let view = traj.view();
    for g in 0..3 {
        let d = view.series(g, Compartment::Deceased).expect("group");
        for w in d.windows(2) {
            assert!(w[1] >= w[0], "group {g}: D decreased {} -> {}", w[0], w[1]);
        }
    }
}

#[test]
fn vaccination_is_gated_by_start_instant() {
    let start = vec![
        VaccinationStart::Day(12.5),
        VaccinationStart::Never,
        VaccinationStart::Day(40.0),
    ];
    let params = three_groups(start);
    let model = SirvdModel::new(params.clone());
    let traj = model
        .simulate(&three_group_state(), &daily(60), &SolverOptions::default())
        .expect("integration succeeds");
    let view = traj.view();

    // Never-vaccinated group: V stays at its initial value.
    let v1 = view.series(1, Compartment::Vaccinated).expect("group 1");
    assert!(v1.iter().all(|v| *v == 0.0));

    // Before its start the engine reports no vaccination flow at all.
    for (t, y) in traj.iter() {
        let dy = model.derivative(t, y);
        if t < 12.5 {
            assert_eq!(dy[state_index(3, Compartment::Vaccinated, 0)], 0.0, "t={t}");
        }
        if t < 40.0 {
            assert_eq!(dy[state_index(3, Compartment::Vaccinated, 2)], 0.0, "t={t}");
        }
    }

    let v0 = view.series(0, Compartment::Vaccinated).expect("group 0");
    let v2 = view.series(2, Compartment::Vaccinated).expect("group 2");
    assert_eq!(v0[12], 0.0);
    assert!(v0[13] > 0.0);
    assert_eq!(v2[40], 0.0);
    assert!(v2[41] > 0.0);
}

#[test]
fn uncoupled_identical_groups_stay_identical() {
    let n = 3;
    let beta: Vec<Vec<f64>> = (0..n)
        .map(|g| (0..n).map(|h| if g == h { 0.25 } else { 0.0 }).collect())
        .collect();
    let params = ModelParameters::new(
        beta,
        1.0 / 12.0,
        vec![0.001; n],
        1.0 / 180.0,
        1.0 / 270.0,
        vec![0.005; n],
        vec![VaccinationStart::Day(20.0); n],
    )
    .expect("valid params");
    let x0 = SirvdState::from_group_fractions(&vec![[0.97, 0.03, 0.0, 0.0, 0.0]; n]).expect("valid state");
    let traj = run(params, &x0, &daily(90));

    let view = traj.view();
    let reference = view.compartment_series(0).expect("group 0");
    for g in 1..n {
        assert_eq!(view.compartment_series(g).expect("group"), reference, "group {g}");
    }
}

#[test]
fn no_disease_stays_disease_free() {
    let n = 2;
    let params = ModelParameters::new(
        vec![vec![0.0; n]; n],
        1.0 / 15.0,
        vec![0.01; n],
        1.0 / 180.0,
        1.0 / 270.0,
        vec![0.02; n],
        vec![VaccinationStart::Day(5.0), VaccinationStart::Never],
    )
    .expect("valid params");
    let x0 = SirvdState::from_group_fractions(&[[0.8, 0.0, 0.2, 0.0, 0.0], [0.9, 0.0, 0.1, 0.0, 0.0]])
        .expect("valid state");
    let traj = run(params, &x0, &daily(60));

    let view = traj.view();
    for g in 0..n {
        assert!(view.series(g, Compartment::Infectious).expect("group").iter().all(|v| *v == 0.0));
        assert!(view.series(g, Compartment::Deceased).expect("group").iter().all(|v| *v == 0.0));
    }

    // Waning moves recovered back to susceptible; vaccination only in group 0.
    let r1 = view.series(1, Compartment::Recovered).expect("group 1");
    let s1 = view.series(1, Compartment::Susceptible).expect("group 1");
    assert!(r1[60] < r1[0]);
    assert!(s1[60] > s1[0]);
    assert!(view.series(0, Compartment::Vaccinated).expect("group 0")[60] > 0.0);
}

#[test]
fn repeated_runs_are_bit_identical() {
    let start = vec![VaccinationStart::Day(7.25); 3];
    let a = run(three_groups(start.clone()), &three_group_state(), &daily(45));
    let b = run(three_groups(start), &three_group_state(), &daily(45));
    assert_eq!(a.times(), b.times());
    assert_eq!(a.states(), b.states());
    assert_eq!(a.stats(), b.stats());
}

#[test]
fn adaptive_matches_fine_rk4_across_switch() {
    let tau = 10.0;
    let x0 = three_group_state();
    let traj = run(three_groups(vec![VaccinationStart::Day(tau); 3]), &x0, &daily(30));

    // Reference: fine RK4 on each smooth piece with the gate fixed off, then on.
    let off = SirvdModel::new(three_groups(vec![VaccinationStart::Never; 3]));
    let on = SirvdModel::new(three_groups(vec![VaccinationStart::Day(0.0); 3]));
    let first = integrate_fixed(&off, &x0.y, 0.0, tau, 0.005);
    let (_, y_tau) = first.last().expect("non-empty").clone();
    let second = integrate_fixed(&on, &y_tau, tau, 30.0, 0.005);
    let (t_end, y_ref) = second.last().expect("non-empty");
    assert!((t_end - 30.0).abs() < 1e-9);

    let y_tau_adaptive = &traj.states()[10];
    for (k, (a, b)) in y_tau_adaptive.iter().zip(&y_tau).enumerate() {
        assert!((a - b).abs() < 1e-7, "component {k} at tau: {a} vs {b}");
    }
    let y_end = &traj.states()[30];
    for (k, (a, b)) in y_end.iter().zip(y_ref).enumerate() {
        assert!((a - b).abs() < 1e-6, "component {k} at end: {a} vs {b}");
    }
}

#[test]
fn exhausted_step_budget_is_reported() {
    let opts = SolverOptions {
        max_steps: 3,
        ..SolverOptions::default()
    };
    let err = SirvdModel::new(three_groups(vec![VaccinationStart::Never; 3]))
        .simulate(&three_group_state(), &daily(365), &opts)
        .expect_err("budget too small");
    assert!(matches!(err, SirvdError::IntegrationFailure { .. }), "{err}");
}

#[test]
fn mismatched_initial_state_is_rejected() {
    let x0 = SirvdState::from_group_fractions(&[[1.0, 0.0, 0.0, 0.0, 0.0]]).expect("valid state");
    let err = SirvdModel::new(three_groups(vec![VaccinationStart::Never; 3]))
        .simulate(&x0, &daily(5), &SolverOptions::default())
        .expect_err("group count mismatch");
    assert!(matches!(err, SirvdError::InvalidInitialState(_)), "{err}");
}
