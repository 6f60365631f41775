/// `out = a * x` for a square matrix stored as rows.
pub fn mat_vec(a: &[Vec<f64>], x: &[f64], out: &mut [f64]) {
    for (o, row) in out.iter_mut().zip(a) {
        *o = row.iter().zip(x).map(|(aij, xj)| aij * xj).sum();
    }
}

/// Power iteration estimate of the spectral radius (dominant eigenvalue) of a
/// non-negative square matrix.
///
/// Returns 0.0 for the empty or all-zero matrix.
pub fn spectral_radius_power_iteration(a: &[Vec<f64>], max_iter: usize, tol: f64) -> f64 {
    let n = a.len();
    assert!(a.iter().all(|row| row.len() == n), "Matrix must be square");
    if n == 0 {
        return 0.0;
    }

    let mut x = vec![1.0 / (n as f64).sqrt(); n];
    let mut y = vec![0.0; n];
    let mut lambda_old = 0.0;

    for _ in 0..max_iter {
        mat_vec(a, &x, &mut y);
        // Rayleigh quotient; x has unit norm
        let lambda: f64 = y.iter().zip(&x).map(|(yi, xi)| yi * xi).sum();

        let norm = y.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            return 0.0;
        }
        for (xi, yi) in x.iter_mut().zip(&y) {
            *xi = yi / norm;
        }
        if (lambda - lambda_old).abs() < tol {
            return lambda;
        }
        lambda_old = lambda;
    }
    lambda_old
}
