use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::model::sirvd::{state_index, Compartment};
use crate::trajectory::Trajectory;

/// Write every sampled state as one CSV row: `t` followed by one column per
/// compartment and group, named `S_<group>`, `I_<group>`, ...
pub fn write_trajectory_csv(path: impl AsRef<Path>, groups: &[String], traj: &Trajectory) -> anyhow::Result<()> {
    let path = path.as_ref();
    let n = traj.n_groups();
    anyhow::ensure!(
        groups.len() == n,
        "{} group names for a trajectory of {n} groups",
        groups.len()
    );

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("create trajectory CSV failed (path={})", path.display()))?;

    let mut header = vec!["t".to_string()];
    for c in Compartment::ALL {
        for name in groups {
            header.push(format!("{}_{}", c.label(), name));
        }
    }
    wtr.write_record(&header)?;

    for (t, y) in traj.iter() {
        let mut row = Vec::with_capacity(header.len());
        row.push(t.to_string());
        for c in Compartment::ALL {
            for g in 0..n {
                row.push(y[state_index(n, c, g)].to_string());
            }
        }
        wtr.write_record(&row)
            .with_context(|| format!("write trajectory row failed at t={t}"))?;
    }
    wtr.flush().context("flush trajectory CSV failed")?;
    Ok(())
}

/// Write a plain-text run summary to `<out_dir>/sirvd_<run_id>.txt`: a
/// `key=value` header followed by the whole-population fractions at every
/// instant.
pub fn write_run_summary(
    out_dir: impl AsRef<Path>,
    run_id: &str,
    groups: &[String],
    traj: &Trajectory,
    weights: Option<&[f64]>,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir.as_ref()).context("create report dir failed")?;
    let path = out_dir.as_ref().join(format!("sirvd_{}.txt", run_id));
    let mut f = std::fs::File::create(&path)
        .with_context(|| format!("create summary file failed (path={:?})", path))?;

    let population = traj
        .view()
        .population_series(weights)
        .context("aggregate population series failed")?;

    writeln!(f, "run_id={}", run_id)?;
    writeln!(f, "groups={}", groups.join(","))?;
    writeln!(f, "samples={}", traj.len())?;
    writeln!(f, "max_conservation_drift={:.3e}", traj.max_conservation_drift())?;
    writeln!(f)?;
    writeln!(f, "t,S,I,R,V,D")?;
    for (t, p) in traj.times().iter().zip(&population) {
        writeln!(f, "{:.2},{:.6},{:.6},{:.6},{:.6},{:.6}", t, p.s, p.i, p.r, p.v, p.d)?;
    }

    Ok(path)
}
