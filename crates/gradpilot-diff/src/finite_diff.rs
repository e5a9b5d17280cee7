//! Finite-difference derivatives, used to validate tape gradients.

use crate::DMat;

/// Central-difference gradient of a scalar function.
pub fn central_gradient<F>(f: F, x: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut shifted = x.to_vec();
    let inv_2eps = 1.0 / (2.0 * eps);
    (0..x.len())
        .map(|i| {
            shifted[i] = x[i] + eps;
            let plus = f(&shifted);
            shifted[i] = x[i] - eps;
            let minus = f(&shifted);
            shifted[i] = x[i];
            (plus - minus) * inv_2eps
        })
        .collect()
}

/// Central-difference Jacobian of a vector function: `J[(i, j)] = ∂fᵢ/∂xⱼ`.
pub fn central_jacobian<F>(f: F, x: &[f64], eps: f64) -> DMat
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n_out = f(x).len();
    let mut jac = DMat::zeros(n_out, x.len());
    let mut shifted = x.to_vec();
    let inv_2eps = 1.0 / (2.0 * eps);

    for j in 0..x.len() {
        shifted[j] = x[j] + eps;
        let plus = f(&shifted);
        shifted[j] = x[j] - eps;
        let minus = f(&shifted);
        shifted[j] = x[j];
        for i in 0..n_out {
            jac[(i, j)] = (plus[i] - minus[i]) * inv_2eps;
        }
    }

    jac
}

/// Largest elementwise relative error `|a - b| / max(|a|, |b|, floor)`.
///
/// `floor` keeps components that are both near zero from dominating.
pub fn max_relative_error(a: &[f64], b: &[f64], floor: f64) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs() / x.abs().max(y.abs()).max(floor))
        .fold(0.0, f64::max)
}
