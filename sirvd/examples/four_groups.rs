use sirvd::diagnostics::reproduction_number;
use sirvd::{compare_strategies, Compartment, ScenarioConfig, VaccinationStrategy};

fn main() -> anyhow::Result<()> {
    // Four age groups over one year, weighted by an illustrative population split.
    let mut cfg = ScenarioConfig::four_age_groups()?;
    cfg.group_weights = Some(vec![0.20, 0.12, 0.52, 0.16]);

    let x0 = cfg.initial_state()?;
    let r0 = reproduction_number(&cfg.params, &x0)?;
    eprintln!("R0 at t=0: {:.3}", r0);

    let strategies = VaccinationStrategy::presets(cfg.groups.len());
    let results = compare_strategies(&cfg, &strategies)?;

    println!("strategy,day,total_S,total_I,total_R,total_V,total_D");
    for (name, traj) in &results {
        let population = traj.view().population_series(cfg.group_weights.as_deref())?;
        for (t, p) in traj.times().iter().zip(&population) {
            println!("{},{:.0},{:.6},{:.6},{:.6},{:.6},{:.6}", name, t, p.s, p.i, p.r, p.v, p.d);
        }
    }

    for (name, traj) in &results {
        let view = traj.view();
        let senior = cfg.groups.len() - 1;
        let deceased = view.series(senior, Compartment::Deceased)?;
        let peak = view.peak(senior, Compartment::Infectious)?;
        eprintln!(
            "{name}: senior deceased at end {:.5}, infectious peak {:?}",
            deceased.last().copied().unwrap_or(0.0),
            peak
        );
    }

    Ok(())
}
