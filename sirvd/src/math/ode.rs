/// Right-hand side of an ODE system `dy/dt = f(t, y)`.
pub trait OdeSystem {
    /// Number of state variables.
    fn ndim(&self) -> usize;

    /// Evaluate `f(t, y)` into `dydt`. `y` and `dydt` have length `ndim()`.
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);

    /// Instants in the open interval `(t0, t1)` where `f` jumps in `t`.
    fn discontinuities(&self, _t0: f64, _t1: f64) -> Vec<f64> {
        Vec::new()
    }

    /// Evaluate `f` on the smooth piece spanning `piece = (a, b)`, with the
    /// time-switched terms held at their value on the open interval.
    ///
    /// Adaptive integration calls this between consecutive discontinuities so
    /// that stages landing exactly on `b` see the left limit of `f`.
    fn rhs_on_piece(&self, t: f64, _piece: (f64, f64), y: &[f64], dydt: &mut [f64]) {
        self.rhs(t, y, dydt)
    }
}

/// Adapts a plain closure to [`OdeSystem`].
pub struct FnSystem<F> {
    ndim: usize,
    f: F,
}

impl<F> FnSystem<F>
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    pub fn new(ndim: usize, f: F) -> Self {
        Self { ndim, f }
    }
}

impl<F> OdeSystem for FnSystem<F>
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    fn ndim(&self) -> usize {
        self.ndim
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        (self.f)(t, y, dydt)
    }
}

/// Workspace for allocation-free RK4 steps
pub struct Rk4Workspace {
    pub k1: Vec<f64>,
    pub k2: Vec<f64>,
    pub k3: Vec<f64>,
    pub k4: Vec<f64>,
    pub ytmp: Vec<f64>,
}

impl Rk4Workspace {
    pub fn new(n: usize) -> Self {
        Self {
            k1: vec![0.0; n],
            k2: vec![0.0; n],
            k3: vec![0.0; n],
            k4: vec![0.0; n],
            ytmp: vec![0.0; n],
        }
    }

    pub fn resize(&mut self, n: usize) {
        if self.k1.len() != n {
            self.k1.resize(n, 0.0);
            self.k2.resize(n, 0.0);
            self.k3.resize(n, 0.0);
            self.k4.resize(n, 0.0);
            self.ytmp.resize(n, 0.0);
        }
    }
}

/// Classical fixed-step RK4 step using a preallocated workspace.
pub fn rk4_step<S: OdeSystem + ?Sized>(sys: &S, y: &mut [f64], t: f64, dt: f64, ws: &mut Rk4Workspace) {
    let n = y.len();
    ws.resize(n);

    let (k1, k2, k3, k4, ytmp) = (&mut ws.k1, &mut ws.k2, &mut ws.k3, &mut ws.k4, &mut ws.ytmp);

    sys.rhs(t, y, k1);

    for i in 0..n {
        ytmp[i] = y[i] + 0.5 * dt * k1[i];
    }
    sys.rhs(t + 0.5 * dt, ytmp, k2);

    for i in 0..n {
        ytmp[i] = y[i] + 0.5 * dt * k2[i];
    }
    sys.rhs(t + 0.5 * dt, ytmp, k3);

    for i in 0..n {
        ytmp[i] = y[i] + dt * k3[i];
    }
    sys.rhs(t + dt, ytmp, k4);

    for i in 0..n {
        y[i] += (dt / 6.0) * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
}

/// Fixed-step RK4 from `t0` to `t1`, recording every step.
///
/// No error control: this is the reference the adaptive integrator is checked
/// against, with `dt` chosen small by the caller.
pub fn integrate_fixed<S: OdeSystem + ?Sized>(sys: &S, y0: &[f64], t0: f64, t1: f64, dt: f64) -> Vec<(f64, Vec<f64>)> {
    let mut ws = Rk4Workspace::new(y0.len());
    let mut y = y0.to_vec();
    let mut t = t0;
    let mut out = vec![(t, y.clone())];
    while t < t1 - 1e-12 {
        let h = dt.min(t1 - t);
        rk4_step(sys, &mut y, t, h, &mut ws);
        t += h;
        out.push((t, y.clone()));
    }
    out
}
