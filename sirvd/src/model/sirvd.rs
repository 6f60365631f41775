use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ensure, Result, SirvdError};
use crate::math::ode::OdeSystem;
use crate::math::rk45::{integrate, SolverOptions};
use crate::model::params::ModelParameters;
use crate::model::vaccination::VaccinationGate;
use crate::trajectory::Trajectory;

pub const N_COMPARTMENTS: usize = 5;

/// Disease states, in the order their blocks appear in the state vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compartment {
    Susceptible,
    Infectious,
    Recovered,
    Vaccinated,
    Deceased,
}

impl Compartment {
    pub const ALL: [Compartment; N_COMPARTMENTS] = [
        Compartment::Susceptible,
        Compartment::Infectious,
        Compartment::Recovered,
        Compartment::Vaccinated,
        Compartment::Deceased,
    ];

    /// Position of this compartment's block in the state vector.
    pub fn block(self) -> usize {
        match self {
            Compartment::Susceptible => 0,
            Compartment::Infectious => 1,
            Compartment::Recovered => 2,
            Compartment::Vaccinated => 3,
            Compartment::Deceased => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Compartment::Susceptible => "S",
            Compartment::Infectious => "I",
            Compartment::Recovered => "R",
            Compartment::Vaccinated => "V",
            Compartment::Deceased => "D",
        }
    }
}

/// Index of `(compartment, group)` in a state vector.
///
/// Layout: S_0..S_{G-1} | I_0..I_{G-1} | R_0.. | V_0.. | D_0..
#[inline]
pub fn state_index(n_groups: usize, c: Compartment, g: usize) -> usize {
    c.block() * n_groups + g
}

/// Initial state, as fractions of each group's population.
#[derive(Debug, Clone, PartialEq)]
pub struct SirvdState {
    pub y: Vec<f64>,
}

impl SirvdState {
    /// Builds the flat state from per-group `[S, I, R, V, D]` fractions.
    pub fn from_group_fractions(fractions: &[[f64; N_COMPARTMENTS]]) -> Result<Self> {
        let n = fractions.len();
        ensure!(n > 0, SirvdError::initial_state("at least one group is required"));
        let mut y = vec![0.0; N_COMPARTMENTS * n];
        for (g, row) in fractions.iter().enumerate() {
            for c in Compartment::ALL {
                y[state_index(n, c, g)] = row[c.block()];
            }
        }
        Self::from_flat(n, y)
    }

    /// Validates an already laid out state vector.
    pub fn from_flat(n_groups: usize, y: Vec<f64>) -> Result<Self> {
        ensure!(
            y.len() == N_COMPARTMENTS * n_groups,
            SirvdError::initial_state(format!(
                "state has {} entries, expected {} for {n_groups} groups",
                y.len(),
                N_COMPARTMENTS * n_groups
            ))
        );
        for c in Compartment::ALL {
            for g in 0..n_groups {
                let v = y[state_index(n_groups, c, g)];
                ensure!(
                    v.is_finite() && (0.0..=1.0).contains(&v),
                    SirvdError::initial_state(format!(
                        "{}[{g}] = {v} is not a fraction in [0, 1]",
                        c.label()
                    ))
                );
            }
        }
        Ok(Self { y })
    }

    pub fn n_groups(&self) -> usize {
        self.y.len() / N_COMPARTMENTS
    }

    pub fn get(&self, c: Compartment, g: usize) -> f64 {
        self.y[state_index(self.n_groups(), c, g)]
    }
}

/// Multi-group SIRVD model with cross-group transmission and time-gated
/// vaccination.
#[derive(Debug, Clone)]
pub struct SirvdModel {
    params: ModelParameters,
}

impl SirvdModel {
    pub fn new(params: ModelParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    pub fn n_groups(&self) -> usize {
        self.params.n_groups()
    }

    pub fn state_size(&self) -> usize {
        N_COMPARTMENTS * self.n_groups()
    }

    /// Rate of change of `y` at time `t`, written into `dy`.
    ///
    /// The five derivatives of a group sum to zero, so group totals are
    /// conserved. Deceased only ever grows.
    pub fn deriv(&self, t: f64, y: &[f64], dy: &mut [f64]) {
        self.deriv_gated(t, y, dy)
    }

    /// Same as [`SirvdModel::deriv`], returning a fresh vector.
    pub fn derivative(&self, t: f64, y: &[f64]) -> Vec<f64> {
        let mut dy = vec![0.0; y.len()];
        self.deriv(t, y, &mut dy);
        dy
    }

    /// Right-hand side with the vaccination gate evaluated at `t_gate`.
    /// Nothing else in the model depends on time.
    fn deriv_gated(&self, t_gate: f64, y: &[f64], dy: &mut [f64]) {
        let p = &self.params;
        let n = p.n_groups();
        let gate = VaccinationGate::new(p);
        let idx = |c, g| state_index(n, c, g);
        let infectious = &y[idx(Compartment::Infectious, 0)..idx(Compartment::Infectious, 0) + n];

        for g in 0..n {
            let s = y[idx(Compartment::Susceptible, g)];
            let i = y[idx(Compartment::Infectious, g)];
            let r = y[idx(Compartment::Recovered, g)];
            let v = y[idx(Compartment::Vaccinated, g)];

            // Force of infection on g mixes every group's infectious fraction
            // through row g of beta.
            let pressure: f64 = p.beta()[g].iter().zip(infectious).map(|(b, ih)| b * ih).sum();
            let new_infections = s * pressure;
            let eta = gate.effective_rate(t_gate, g);
            let recoveries = p.gamma() * i;
            let deaths = p.mu()[g] * i;
            let waned_r = p.phi() * r;
            let waned_v = p.rho() * v;
            let vaccinations = eta * s;

            dy[idx(Compartment::Susceptible, g)] = waned_r - vaccinations + waned_v - new_infections;
            dy[idx(Compartment::Infectious, g)] = new_infections - recoveries - deaths;
            dy[idx(Compartment::Recovered, g)] = recoveries - waned_r;
            dy[idx(Compartment::Vaccinated, g)] = vaccinations - waned_v;
            dy[idx(Compartment::Deceased, g)] = deaths;
        }
    }

    /// Integrate from the first to the last of `observations`, sampling the
    /// state at each of them.
    ///
    /// Every vaccination start instant inside the run is a step boundary
    /// unless `opts.stop_at_discontinuities` is off. Values are returned as
    /// computed; drift of the group totals is logged, never corrected.
    pub fn simulate(&self, x0: &SirvdState, observations: &[f64], opts: &SolverOptions) -> Result<Trajectory> {
        let n = self.n_groups();
        ensure!(
            x0.n_groups() == n && x0.y.len() == self.state_size(),
            SirvdError::initial_state(format!(
                "initial state has {} groups, parameters have {n}",
                x0.n_groups()
            ))
        );
        let (t_start, t_end) = match (observations.first(), observations.last()) {
            (Some(a), Some(b)) => (*a, *b),
            _ => return Err(SirvdError::observations("no observation instants")),
        };

        let samples = integrate(self, t_start, t_end, observations, &x0.y, opts)?;
        debug!(
            n_groups = n,
            samples = samples.t.len(),
            accepted = samples.stats.accepted,
            rejected = samples.stats.rejected,
            "simulation finished"
        );

        let traj = Trajectory::with_stats(n, samples.t, samples.y, samples.stats)?;
        let drift = traj.max_conservation_drift();
        let drift_tolerance = 1e3 * (opts.atol + opts.rtol);
        if drift > drift_tolerance {
            warn!(drift, drift_tolerance, "group totals drifted during integration");
        }
        Ok(traj)
    }
}

impl OdeSystem for SirvdModel {
    fn ndim(&self) -> usize {
        self.state_size()
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        self.deriv(t, y, dydt)
    }

    fn discontinuities(&self, t0: f64, t1: f64) -> Vec<f64> {
        VaccinationGate::new(&self.params).switch_instants(t0, t1)
    }

    fn rhs_on_piece(&self, _t: f64, piece: (f64, f64), y: &[f64], dydt: &mut [f64]) {
        // No switch lies strictly inside the piece, so its midpoint sees the
        // gate state of the whole open interval.
        self.deriv_gated(0.5 * (piece.0 + piece.1), y, dydt)
    }
}
