use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ensure, Result, SirvdError};
use crate::math::rk45::SolverOptions;
use crate::model::params::{ModelParameters, VaccinationStart};
use crate::model::sirvd::{SirvdModel, SirvdState, N_COMPARTMENTS};
use crate::trajectory::Trajectory;

/// Instants at which a run is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationGrid {
    /// Explicit, strictly increasing instants.
    Instants(Vec<f64>),
    /// `start, start + step, ...` up to and including `end`.
    Uniform { start: f64, end: f64, step: f64 },
}

impl ObservationGrid {
    /// Daily grid over `[start, end]`.
    pub fn daily(start: f64, end: f64) -> Self {
        ObservationGrid::Uniform { start, end, step: 1.0 }
    }

    pub fn instants(&self) -> Result<Vec<f64>> {
        match self {
            ObservationGrid::Instants(v) => Ok(v.clone()),
            ObservationGrid::Uniform { start, end, step } => {
                ensure!(
                    start.is_finite() && end.is_finite() && end >= start,
                    SirvdError::observations(format!("uniform grid needs start <= end, got [{start}, {end}]"))
                );
                ensure!(
                    step.is_finite() && *step > 0.0,
                    SirvdError::observations(format!("uniform grid step must be > 0, got {step}"))
                );
                let n = ((end - start) / step + 1e-9).floor() as usize;
                let mut out: Vec<f64> = (0..=n).map(|i| start + i as f64 * step).collect();
                // Snap the last point onto `end`, or append `end` when the
                // step does not divide the span.
                if let Some(last) = out.last_mut() {
                    if (end - *last).abs() <= 1e-9 * step {
                        *last = *end;
                    } else {
                        out.push(*end);
                    }
                }
                Ok(out)
            }
        }
    }
}

/// Everything one run needs: groups, parameters, initial state, sampling and
/// solver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub groups: Vec<String>,
    pub params: ModelParameters,
    /// Per-group `[S, I, R, V, D]` fractions.
    pub initial: Vec<[f64; N_COMPARTMENTS]>,
    pub observations: ObservationGrid,
    #[serde(default)]
    pub solver: SolverOptions,
    /// Population share of each group, used for whole-population series.
    #[serde(default)]
    pub group_weights: Option<Vec<f64>>,
}

impl ScenarioConfig {
    /// Four age groups (children, teenagers, adults, senior), one year sampled
    /// daily, 1% of every group initially infectious, no vaccination.
    pub fn four_age_groups() -> Result<Self> {
        let params = ModelParameters::new(
            vec![
                vec![0.05, 0.01, 0.04, 0.008],
                vec![0.01, 0.09, 0.08, 0.008],
                vec![0.04, 0.08, 0.1, 0.02],
                vec![0.008, 0.008, 0.02, 0.03],
            ],
            1.0 / 15.0,
            // case fatality per group
            vec![0.00009, 0.00005, 0.00688, 0.15987],
            // six months of post-infection immunity
            1.0 / 180.0,
            // nine months of vaccine immunity
            1.0 / 270.0,
            vec![0.01; 4],
            vec![VaccinationStart::Never; 4],
        )?;
        Ok(Self {
            groups: ["children", "teenagers", "adults", "senior"].map(String::from).to_vec(),
            params,
            initial: vec![[0.99, 0.01, 0.0, 0.0, 0.0]; 4],
            observations: ObservationGrid::daily(0.0, 365.0),
            solver: SolverOptions::default(),
            group_weights: None,
        })
    }

    pub fn check(&self) -> Result<()> {
        let n = self.params.n_groups();
        ensure!(
            self.groups.len() == n,
            SirvdError::params(format!("{} group names for {n} groups", self.groups.len()))
        );
        ensure!(
            self.initial.len() == n,
            SirvdError::initial_state(format!("{} initial rows for {n} groups", self.initial.len()))
        );
        if let Some(w) = &self.group_weights {
            ensure!(
                w.len() == n,
                SirvdError::options(format!("group_weights.len()={} != n_groups={n}", w.len()))
            );
        }
        Ok(())
    }

    pub fn initial_state(&self) -> Result<SirvdState> {
        SirvdState::from_group_fractions(&self.initial)
    }

    /// Same scenario under a different vaccination strategy.
    pub fn with_strategy(&self, strategy: &VaccinationStrategy) -> Result<Self> {
        Ok(Self {
            params: strategy.apply(&self.params)?,
            ..self.clone()
        })
    }
}

/// Named vaccination plan: per-group start instants and, optionally, rates
/// replacing the base scenario's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaccinationStrategy {
    pub name: String,
    pub start: Vec<VaccinationStart>,
    #[serde(default)]
    pub eta: Option<Vec<f64>>,
}

impl VaccinationStrategy {
    pub fn apply(&self, params: &ModelParameters) -> Result<ModelParameters> {
        params.with_vaccination(self.start.clone(), self.eta.clone())
    }

    /// The standard comparison set for `n_groups` groups ordered youngest
    /// first: no vaccination, youngest first, oldest first (30 days apart),
    /// and everyone from day 0 at a quarter of the default rate.
    pub fn presets(n_groups: usize) -> Vec<Self> {
        let staggered = |g: usize| VaccinationStart::Day(30.0 * g as f64);
        vec![
            Self {
                name: "no_vaccination".into(),
                start: vec![VaccinationStart::Never; n_groups],
                eta: None,
            },
            Self {
                name: "ascending_order".into(),
                start: (0..n_groups).map(staggered).collect(),
                eta: None,
            },
            Self {
                name: "descending_order".into(),
                start: (0..n_groups).rev().map(staggered).collect(),
                eta: None,
            },
            Self {
                name: "same_time".into(),
                start: vec![VaccinationStart::Day(0.0); n_groups],
                eta: Some(vec![0.0025; n_groups]),
            },
        ]
    }
}

/// Run one scenario to completion.
pub fn run_scenario(cfg: &ScenarioConfig) -> Result<Trajectory> {
    cfg.check()?;
    let x0 = cfg.initial_state()?;
    let observations = cfg.observations.instants()?;
    let model = SirvdModel::new(cfg.params.clone());
    let traj = model.simulate(&x0, &observations, &cfg.solver)?;
    info!(
        groups = cfg.groups.len(),
        samples = traj.len(),
        accepted = traj.stats().accepted,
        rejected = traj.stats().rejected,
        "scenario finished"
    );
    Ok(traj)
}

/// Run `base` once per strategy, in parallel. Each run owns its own
/// parameter set; results are keyed by strategy name.
pub fn compare_strategies(
    base: &ScenarioConfig,
    strategies: &[VaccinationStrategy],
) -> Result<BTreeMap<String, Trajectory>> {
    let mut seen = std::collections::BTreeSet::new();
    for s in strategies {
        ensure!(
            seen.insert(s.name.as_str()),
            SirvdError::params(format!("duplicate strategy name '{}'", s.name))
        );
    }

    strategies
        .par_iter()
        .map(|strategy| -> Result<(String, Trajectory)> {
            let cfg = base.with_strategy(strategy)?;
            let traj = run_scenario(&cfg)?;
            info!(strategy = %strategy.name, "strategy finished");
            Ok((strategy.name.clone(), traj))
        })
        .collect()
}
