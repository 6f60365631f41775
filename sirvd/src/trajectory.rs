use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ensure, Result, SirvdError};
use crate::math::rk45::StepStats;
use crate::model::sirvd::{state_index, Compartment, N_COMPARTMENTS};

/// Sampled solution of one run: the state at every requested instant.
///
/// States use the block layout of [`Compartment`]: all groups' S, then all
/// groups' I, and so on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    n_groups: usize,
    times: Vec<f64>,
    states: Vec<Vec<f64>>,
    stats: StepStats,
}

/// One group's compartment fractions at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompartmentValues {
    pub s: f64,
    pub i: f64,
    pub r: f64,
    pub v: f64,
    pub d: f64,
}

impl CompartmentValues {
    pub fn get(&self, c: Compartment) -> f64 {
        match c {
            Compartment::Susceptible => self.s,
            Compartment::Infectious => self.i,
            Compartment::Recovered => self.r,
            Compartment::Vaccinated => self.v,
            Compartment::Deceased => self.d,
        }
    }

    pub fn total(&self) -> f64 {
        self.s + self.i + self.r + self.v + self.d
    }
}

/// A compartment value found below zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Excursion {
    pub t: f64,
    pub group: usize,
    pub compartment: Compartment,
    pub value: f64,
}

impl Trajectory {
    /// Builds a trajectory from raw samples, checking shapes and time order.
    pub fn from_samples(n_groups: usize, times: Vec<f64>, states: Vec<Vec<f64>>) -> Result<Self> {
        Self::with_stats(n_groups, times, states, StepStats::default())
    }

    pub(crate) fn with_stats(
        n_groups: usize,
        times: Vec<f64>,
        states: Vec<Vec<f64>>,
        stats: StepStats,
    ) -> Result<Self> {
        ensure!(n_groups > 0, SirvdError::observations("trajectory needs at least one group"));
        ensure!(
            times.len() == states.len(),
            SirvdError::observations(format!("{} instants but {} states", times.len(), states.len()))
        );
        ensure!(
            times.windows(2).all(|w| w[1] > w[0]),
            SirvdError::observations("instants must be strictly increasing")
        );
        let width = N_COMPARTMENTS * n_groups;
        ensure!(
            states.iter().all(|y| y.len() == width),
            SirvdError::observations(format!("every state must have {width} entries"))
        );
        Ok(Self {
            n_groups,
            times,
            states,
            stats,
        })
    }

    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[Vec<f64>] {
        &self.states
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> {
        self.times.iter().copied().zip(self.states.iter().map(Vec::as_slice))
    }

    pub fn view(&self) -> TrajectoryView<'_> {
        TrajectoryView { traj: self }
    }

    /// Largest deviation of any group's compartment total from its value at
    /// the first instant.
    pub fn max_conservation_drift(&self) -> f64 {
        let Some(first) = self.states.first() else {
            return 0.0;
        };
        let n = self.n_groups;
        let group_total = |y: &[f64], g: usize| -> f64 {
            Compartment::ALL.iter().map(|c| y[state_index(n, *c, g)]).sum()
        };
        let mut worst = 0.0f64;
        for y in &self.states {
            for g in 0..n {
                worst = worst.max((group_total(y, g) - group_total(first, g)).abs());
            }
        }
        worst
    }

    /// Every compartment value below `-tolerance`. Values are reported, never
    /// clamped.
    pub fn negative_excursions(&self, tolerance: f64) -> Vec<Excursion> {
        let n = self.n_groups;
        let mut out = Vec::new();
        for (t, y) in self.iter() {
            for c in Compartment::ALL {
                for g in 0..n {
                    let value = y[state_index(n, c, g)];
                    if value < -tolerance {
                        out.push(Excursion {
                            t,
                            group: g,
                            compartment: c,
                            value,
                        });
                    }
                }
            }
        }
        if !out.is_empty() {
            warn!(count = out.len(), tolerance, "negative compartment values in trajectory");
        }
        out
    }
}

/// Per-group projections of a [`Trajectory`].
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryView<'a> {
    traj: &'a Trajectory,
}

impl<'a> TrajectoryView<'a> {
    fn check_group(&self, group: usize) -> Result<()> {
        ensure!(
            group < self.traj.n_groups,
            SirvdError::GroupOutOfRange {
                group,
                n_groups: self.traj.n_groups,
            }
        );
        Ok(())
    }

    fn values_at(&self, y: &[f64], group: usize) -> CompartmentValues {
        let n = self.traj.n_groups;
        CompartmentValues {
            s: y[state_index(n, Compartment::Susceptible, group)],
            i: y[state_index(n, Compartment::Infectious, group)],
            r: y[state_index(n, Compartment::Recovered, group)],
            v: y[state_index(n, Compartment::Vaccinated, group)],
            d: y[state_index(n, Compartment::Deceased, group)],
        }
    }

    /// `(S, I, R, V, D)` of `group` at every sampled instant.
    pub fn compartment_series(&self, group: usize) -> Result<Vec<CompartmentValues>> {
        self.check_group(group)?;
        Ok(self.traj.states.iter().map(|y| self.values_at(y, group)).collect())
    }

    /// A single compartment of `group` at every sampled instant.
    pub fn series(&self, group: usize, compartment: Compartment) -> Result<Vec<f64>> {
        self.check_group(group)?;
        let n = self.traj.n_groups;
        let idx = state_index(n, compartment, group);
        Ok(self.traj.states.iter().map(|y| y[idx]).collect())
    }

    /// Whole-population fractions, weighting each group by its population
    /// share. `None` weighs all groups equally.
    pub fn population_series(&self, weights: Option<&[f64]>) -> Result<Vec<CompartmentValues>> {
        let n = self.traj.n_groups;
        let w: Vec<f64> = match weights {
            Some(w) => {
                ensure!(
                    w.len() == n,
                    SirvdError::options(format!("weights.len()={} != n_groups={n}", w.len()))
                );
                ensure!(
                    w.iter().all(|x| x.is_finite() && *x >= 0.0),
                    SirvdError::options("weights must be finite and >= 0")
                );
                let sum: f64 = w.iter().sum();
                ensure!(sum > 0.0, SirvdError::options("weights must not all be zero"));
                w.iter().map(|x| x / sum).collect()
            }
            None => vec![1.0 / n as f64; n],
        };

        Ok(self
            .traj
            .states
            .iter()
            .map(|y| {
                let mut acc = CompartmentValues {
                    s: 0.0,
                    i: 0.0,
                    r: 0.0,
                    v: 0.0,
                    d: 0.0,
                };
                for (g, wg) in w.iter().enumerate() {
                    let v = self.values_at(y, g);
                    acc.s += wg * v.s;
                    acc.i += wg * v.i;
                    acc.r += wg * v.r;
                    acc.v += wg * v.v;
                    acc.d += wg * v.d;
                }
                acc
            })
            .collect())
    }

    /// Instant and value of the sampled maximum of one compartment.
    pub fn peak(&self, group: usize, compartment: Compartment) -> Result<Option<(f64, f64)>> {
        let series = self.series(group, compartment)?;
        Ok(self
            .traj
            .times
            .iter()
            .copied()
            .zip(series)
            .fold(None, |best: Option<(f64, f64)>, (t, v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((t, v)),
            }))
    }

    /// First sampled instant at or after the compartment's peak where it is
    /// below `threshold`, i.e. when the wave in that group has died out.
    pub fn extinction_instant(&self, group: usize, compartment: Compartment, threshold: f64) -> Result<Option<f64>> {
        let series = self.series(group, compartment)?;
        let Some((t_peak, _)) = self.peak(group, compartment)? else {
            return Ok(None);
        };
        Ok(self
            .traj
            .times
            .iter()
            .copied()
            .zip(series)
            .find(|(t, v)| *t >= t_peak && *v < threshold)
            .map(|(t, _)| t))
    }
}
