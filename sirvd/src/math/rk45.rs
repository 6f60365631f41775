//! Adaptive Dormand–Prince 5(4) integrator with dense output.
//!
//! - PI step-size control on a mixed absolute/relative RMS error norm.
//! - Samples are produced at caller-given instants only, from the
//!   4th-order continuous extension of each accepted step, so sampling never
//!   changes the accepted-step sequence.
//! - Discontinuities reported by [`OdeSystem::discontinuities`] become
//!   mandatory step boundaries; the FSAL derivative is recomputed on the far
//!   side of each one.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ensure, Result, SirvdError};
use crate::math::ode::OdeSystem;

/// Configuration for the adaptive integrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// Initial step size; 0.0 picks one from the initial derivative.
    pub h_initial: f64,
    /// Smallest step the controller may shrink to before giving up.
    pub h_min: f64,
    /// Largest step the controller may grow to.
    pub h_max: f64,
    /// Budget of attempted steps (accepted + rejected) per call.
    pub max_steps: usize,
    /// Stop and restart at every discontinuity of the right-hand side.
    /// When false only error control reacts to the jumps.
    pub stop_at_discontinuities: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-10,
            h_initial: 0.0,
            h_min: 1e-12,
            h_max: f64::MAX,
            max_steps: 1_000_000,
            stop_at_discontinuities: true,
        }
    }
}

impl SolverOptions {
    /// Defaults with both tolerances replaced.
    pub fn with_tolerance(rtol: f64, atol: f64) -> Self {
        Self {
            rtol,
            atol,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.rtol.is_finite() && self.rtol > 0.0,
            SirvdError::options(format!("rtol must be finite and > 0, got {}", self.rtol))
        );
        ensure!(
            self.atol.is_finite() && self.atol > 0.0,
            SirvdError::options(format!("atol must be finite and > 0, got {}", self.atol))
        );
        ensure!(
            self.h_initial.is_finite() && self.h_initial >= 0.0,
            SirvdError::options("h_initial must be finite and >= 0")
        );
        ensure!(
            self.h_min.is_finite() && self.h_min > 0.0,
            SirvdError::options("h_min must be finite and > 0")
        );
        ensure!(
            self.h_max > self.h_min,
            SirvdError::options("h_max must be greater than h_min")
        );
        ensure!(self.max_steps > 0, SirvdError::options("max_steps must be > 0"));
        Ok(())
    }
}

/// Step bookkeeping of one integration call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    pub accepted: usize,
    pub rejected: usize,
    pub rhs_evals: usize,
}

/// States at the requested instants.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    pub t: Vec<f64>,
    pub y: Vec<Vec<f64>>,
    pub stats: StepStats,
}

// Dormand–Prince nodes
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

// Stage coefficients
const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (advancing solution)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// 5th minus embedded 4th-order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

// Continuous extension
const D1: f64 = -12715105075.0 / 11282082432.0;
const D3: f64 = 87487479700.0 / 32700410799.0;
const D4: f64 = -10690763975.0 / 1880347072.0;
const D5: f64 = 701980252875.0 / 199316789632.0;
const D6: f64 = -1453857185.0 / 822651844.0;
const D7: f64 = 69997945.0 / 29380423.0;

// Step-size controller
const SAFETY: f64 = 0.9;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;
const PI_BETA: f64 = 0.04;

fn check_observations(t_start: f64, t_end: f64, observations: &[f64]) -> Result<()> {
    ensure!(
        t_start.is_finite() && t_end.is_finite() && t_end >= t_start,
        SirvdError::observations(format!("need finite t_start <= t_end, got [{t_start}, {t_end}]"))
    );
    let (first, last) = match (observations.first(), observations.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(SirvdError::observations("no observation instants")),
    };
    ensure!(
        first == t_start && last == t_end,
        SirvdError::observations(format!(
            "instants must start at t_start={t_start} and end at t_end={t_end}, got [{first}, {last}]"
        ))
    );
    for w in observations.windows(2) {
        ensure!(
            w[1].is_finite() && w[1] > w[0],
            SirvdError::observations(format!("instants must be strictly increasing ({} then {})", w[0], w[1]))
        );
    }
    Ok(())
}

fn error_norm(err: &[f64], y: &[f64], y_new: &[f64], opts: &SolverOptions) -> f64 {
    let n = err.len();
    let mut sum: f64 = 0.0;
    for i in 0..n {
        let sc = opts.atol + opts.rtol * y[i].abs().max(y_new[i].abs());
        sum += (err[i] / sc) * (err[i] / sc);
    }
    (sum / n as f64).sqrt()
}

fn initial_step(f0: &[f64], y0: &[f64], span: f64, opts: &SolverOptions) -> f64 {
    if opts.h_initial > 0.0 {
        return opts.h_initial.min(span);
    }
    let zero = vec![0.0; y0.len()];
    let d0 = error_norm(y0, y0, &zero, opts);
    let d1 = error_norm(f0, y0, &zero, opts);
    let h = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
    h.max(opts.h_min).min(opts.h_max).min(span)
}

/// `f(t, y)` on a smooth piece when one is known, otherwise at the stage's
/// own time.
fn eval<S: OdeSystem + ?Sized>(sys: &S, t: f64, piece: Option<(f64, f64)>, y: &[f64], dydt: &mut [f64]) {
    match piece {
        Some(piece) => sys.rhs_on_piece(t, piece, y, dydt),
        None => sys.rhs(t, y, dydt),
    }
}

struct Stages {
    k: [Vec<f64>; 7],
    y_tmp: Vec<f64>,
    y_new: Vec<f64>,
    err: Vec<f64>,
}

impl Stages {
    fn new(n: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![0.0; n]),
            y_tmp: vec![0.0; n],
            y_new: vec![0.0; n],
            err: vec![0.0; n],
        }
    }

    /// One trial step from `(t, y)` of size `h`; `k[0]` must hold `f(t, y)`.
    /// Fills `y_new`, `k[6] = f(t + h, y_new)` and the local error.
    fn attempt<S: OdeSystem + ?Sized>(&mut self, sys: &S, piece: Option<(f64, f64)>, t: f64, t_new: f64, h: f64, y: &[f64]) {
        let n = y.len();
        let [k1, k2, k3, k4, k5, k6, k7] = &mut self.k;
        let y_tmp = &mut self.y_tmp;

        for i in 0..n {
            y_tmp[i] = y[i] + h * A21 * k1[i];
        }
        eval(sys, t + C2 * h, piece, y_tmp, k2);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
        }
        eval(sys, t + C3 * h, piece, y_tmp, k3);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        eval(sys, t + C4 * h, piece, y_tmp, k4);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        eval(sys, t + C5 * h, piece, y_tmp, k5);

        for i in 0..n {
            y_tmp[i] = y[i] + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        eval(sys, t_new, piece, y_tmp, k6);

        for i in 0..n {
            self.y_new[i] = y[i] + h * (B1 * k1[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i]);
        }
        eval(sys, t_new, piece, &self.y_new, k7);

        for i in 0..n {
            self.err[i] = h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
        }
    }

    /// Continuous extension at `theta = (t - t_old) / h` in `[0, 1]`.
    fn dense(&self, y: &[f64], h: f64, theta: f64) -> Vec<f64> {
        let [k1, _, k3, k4, k5, k6, k7] = &self.k;
        let theta1 = 1.0 - theta;
        (0..y.len())
            .map(|i| {
                let ydiff = self.y_new[i] - y[i];
                let bspl = h * k1[i] - ydiff;
                let r4 = ydiff - h * k7[i] - bspl;
                let r5 = h * (D1 * k1[i] + D3 * k3[i] + D4 * k4[i] + D5 * k5[i] + D6 * k6[i] + D7 * k7[i]);
                y[i] + theta * (ydiff + theta1 * (bspl + theta * (r4 + theta1 * r5)))
            })
            .collect()
    }
}

/// Integrate `sys` from `t_start` to `t_end`, returning the state at each of
/// `observations`.
///
/// `observations` must be strictly increasing, start at `t_start` and end at
/// `t_end`. Instants that coincide with a step end (every discontinuity and
/// `t_end` are step ends) get the step's own solution; all others come from
/// the continuous extension of the step that contains them.
///
/// # Errors
///
/// `InvalidOptions`, `InvalidObservations` and `InvalidInitialState` for bad
/// inputs; `IntegrationFailure` when the step size would drop below
/// `h_min` without meeting the tolerance, or the step budget runs out.
pub fn integrate<S: OdeSystem + ?Sized>(
    sys: &S,
    t_start: f64,
    t_end: f64,
    observations: &[f64],
    y0: &[f64],
    opts: &SolverOptions,
) -> Result<Samples> {
    opts.validate()?;
    check_observations(t_start, t_end, observations)?;
    let n = sys.ndim();
    ensure!(
        y0.len() == n,
        SirvdError::initial_state(format!("y0.len()={} != ndim()={n}", y0.len()))
    );
    ensure!(
        y0.iter().all(|v| v.is_finite()),
        SirvdError::initial_state("y0 contains non-finite values")
    );

    let mut samples = Samples {
        t: Vec::with_capacity(observations.len()),
        y: Vec::with_capacity(observations.len()),
        stats: StepStats::default(),
    };
    samples.t.push(t_start);
    samples.y.push(y0.to_vec());
    let mut next_obs = 1;

    let span = t_end - t_start;
    if span == 0.0 {
        return Ok(samples);
    }

    let mut boundaries = if opts.stop_at_discontinuities {
        sys.discontinuities(t_start, t_end)
    } else {
        Vec::new()
    };
    boundaries.push(t_end);

    let mut st = Stages::new(n);
    let mut t = t_start;
    let mut y = y0.to_vec();
    let mut h = 0.0;
    let mut attempts = 0usize;

    for &piece_end in &boundaries {
        // Without stops a switch may fall inside the piece, so stages are
        // evaluated at their own time.
        let piece = opts.stop_at_discontinuities.then_some((t, piece_end));
        eval(sys, t, piece, &y, &mut st.k[0]);
        samples.stats.rhs_evals += 1;
        if h == 0.0 {
            h = initial_step(&st.k[0], &y, span, opts);
        }
        let mut err_old: f64 = 1e-4;
        let mut last_rejected = false;

        debug!(from = t, to = piece_end, h, "integrating piece");

        while t < piece_end {
            if attempts >= opts.max_steps {
                return Err(SirvdError::integration(
                    t,
                    h,
                    format!("step budget of {} exhausted before t_end={t_end}", opts.max_steps),
                ));
            }
            attempts += 1;

            h = h.min(opts.h_max);
            let landing = t + h >= piece_end;
            let h_step = if landing { piece_end - t } else { h };
            let t_new = if landing { piece_end } else { t + h_step };
            if t_new == t {
                return Err(SirvdError::integration(t, h_step, "step size underflows the time resolution"));
            }

            st.attempt(sys, piece, t, t_new, h_step, &y);
            samples.stats.rhs_evals += 6;
            let err = error_norm(&st.err, &y, &st.y_new, opts);

            if err.is_finite() && err <= 1.0 {
                while next_obs < observations.len() && observations[next_obs] <= t_new {
                    let at = observations[next_obs];
                    let value = if at == t_new {
                        st.y_new.clone()
                    } else {
                        st.dense(&y, h_step, (at - t) / h_step)
                    };
                    samples.t.push(at);
                    samples.y.push(value);
                    next_obs += 1;
                }

                t = t_new;
                y.copy_from_slice(&st.y_new);
                let [k1, .., k7] = &mut st.k;
                std::mem::swap(k1, k7);
                samples.stats.accepted += 1;

                let err_c = err.max(1e-10);
                let mut factor = SAFETY * err_c.powf(-0.2 + 0.75 * PI_BETA) * err_old.powf(PI_BETA);
                factor = factor.clamp(FAC_MIN, FAC_MAX);
                if last_rejected {
                    factor = factor.min(1.0);
                }
                err_old = err.max(1e-4);
                last_rejected = false;
                // A landing step may be artificially short; grow from the
                // controller's step rather than from it.
                h = if landing { h.max(h_step * factor) } else { h_step * factor };
            } else {
                samples.stats.rejected += 1;
                last_rejected = true;
                let factor = if err.is_finite() {
                    (SAFETY * err.powf(-0.2)).clamp(FAC_MIN, 1.0)
                } else {
                    FAC_MIN
                };
                h = h_step * factor;
                if h < opts.h_min {
                    return Err(SirvdError::integration(
                        t,
                        h,
                        format!("step size fell below h_min={:e} (error norm {err:.3e})", opts.h_min),
                    ));
                }
            }
        }
    }

    debug!(
        accepted = samples.stats.accepted,
        rejected = samples.stats.rejected,
        rhs_evals = samples.stats.rhs_evals,
        "integration finished"
    );
    Ok(samples)
}
