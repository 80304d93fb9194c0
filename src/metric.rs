//! The isotropic metric seam.
//!
//! Everything the solver needs from the geometry is two pure functions: the
//! scalar coefficient \(c(x)\) that scales Euclidean length at a point, and
//! its spatial gradient \(\nabla c(x)\). This module makes that seam a trait
//! so the polymorphism is explicit at call sites, plus the stock metrics used
//! throughout the tests and a finite-difference check for custom metrics.
//!
//! Contract: the coefficient must be strictly positive and finite wherever
//! the solver evaluates it, and the gradient must actually be the gradient of
//! the coefficient. The solver enforces the first rule at every evaluation;
//! the second is the caller's obligation (see
//! [`central_difference_gradient`] for a diagnostic).

use ndarray::{Array1, ArrayView1};

/// A conformally flat metric: \(ds = c(x)\,\lVert dx \rVert\).
pub trait IsotropicMetric {
    /// The scalar coefficient \(c(x)\). Must be positive and finite on the
    /// region the curve can reach.
    fn coefficient(&self, x: &ArrayView1<f64>) -> f64;

    /// The gradient \(\nabla c(x)\), same dimension as `x`.
    fn gradient(&self, x: &ArrayView1<f64>) -> Array1<f64>;
}

/// Flat space: coefficient 1 everywhere, so length is Euclidean length.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMetric;

impl IsotropicMetric for EuclideanMetric {
    fn coefficient(&self, _x: &ArrayView1<f64>) -> f64 {
        1.0
    }

    fn gradient(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        Array1::zeros(x.len())
    }
}

/// The exponential family \(c(x) = \exp(-\langle n, x \rangle)\) for a fixed
/// direction vector `n`.
///
/// Length shrinks exponentially along `n`, so geodesics bow toward that
/// half-space; the closed-form solutions make this the standard regression
/// metric.
#[derive(Debug, Clone)]
pub struct ExpMetric {
    pub n: Array1<f64>,
}

impl ExpMetric {
    pub fn new(n: Array1<f64>) -> Self {
        Self { n }
    }
}

impl IsotropicMetric for ExpMetric {
    fn coefficient(&self, x: &ArrayView1<f64>) -> f64 {
        debug_assert_eq!(x.len(), self.n.len());
        let mut dot = 0.0f64;
        for k in 0..self.n.len() {
            dot += self.n[k] * x[k];
        }
        (-dot).exp()
    }

    fn gradient(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        let c = self.coefficient(x);
        let mut g = Array1::zeros(self.n.len());
        for k in 0..self.n.len() {
            g[k] = -self.n[k] * c;
        }
        g
    }
}

/// Adapter for metrics supplied as a pair of plain closures.
#[derive(Debug, Clone)]
pub struct FnMetric<F, G> {
    coefficient: F,
    gradient: G,
}

impl<F, G> FnMetric<F, G>
where
    F: Fn(&ArrayView1<f64>) -> f64,
    G: Fn(&ArrayView1<f64>) -> Array1<f64>,
{
    pub fn new(coefficient: F, gradient: G) -> Self {
        Self {
            coefficient,
            gradient,
        }
    }
}

impl<F, G> IsotropicMetric for FnMetric<F, G>
where
    F: Fn(&ArrayView1<f64>) -> f64,
    G: Fn(&ArrayView1<f64>) -> Array1<f64>,
{
    fn coefficient(&self, x: &ArrayView1<f64>) -> f64 {
        (self.coefficient)(x)
    }

    fn gradient(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        (self.gradient)(x)
    }
}

/// Central-difference estimate of \(\nabla c\) at `x` with step `eps` per
/// coordinate.
///
/// Diagnostic only: compare against [`IsotropicMetric::gradient`] when wiring
/// up a hand-written metric. Not used by the solver itself.
pub fn central_difference_gradient<M: IsotropicMetric>(
    metric: &M,
    x: &ArrayView1<f64>,
    eps: f64,
) -> Array1<f64> {
    assert!(eps > 0.0 && eps.is_finite());
    let mut probe = x.to_owned();
    let mut g = Array1::zeros(x.len());
    for k in 0..x.len() {
        probe[k] = x[k] + eps;
        let hi = metric.coefficient(&probe.view());
        probe[k] = x[k] - eps;
        let lo = metric.coefficient(&probe.view());
        probe[k] = x[k];
        g[k] = (hi - lo) / (2.0 * eps);
    }
    g
}
