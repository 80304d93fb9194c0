//! Block-local curve relaxation.
//!
//! A polyline's weighted length under an isotropic metric is discretized as
//!
//! \[ L = \sum_i w_i \,\lVert p_{i+1} - p_i \rVert, \qquad
//!    w_i = \tfrac{1}{6}\big(c(p_i) + 4\,c(m_i) + c(p_{i+1})\big), \]
//!
//! with \(m_i\) the segment midpoint: Simpson quadrature of the coefficient
//! along each chord. The same rule is used for the energy, the forces, and
//! [`weighted_length`], so the solver descends exactly the functional it
//! reports.
//!
//! [`relax_block`] runs a few Gauss–Seidel sweeps over the interior of one
//! block. Each node takes a step along the negative discrete Euler–Lagrange
//! force (the derivative of \(L\) in that node, including the
//! \(\nabla c\) terms from the quadrature weights), scaled by the inverse
//! transverse stiffness \(w_{i-1}/\ell_{i-1} + w_i/\ell_i\) and capped at a
//! fraction of the shorter adjacent segment so nodes can never cross. A
//! backtracking guard halves the sweep damping until the block energy is
//! non-increasing, so the energy is monotone per sweep.
//!
//! The contract is: pure function of its inputs, boundary rows never move,
//! fixed sweep and summation order (identical inputs give bit-identical
//! outputs), and metric violations surface as errors rather than NaN.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::metric::IsotropicMetric;

/// Longest allowed node step, as a fraction of the shorter adjacent segment.
const STEP_CAP: f64 = 0.45;

/// Smallest sweep damping tried before the sweep is abandoned as a no-op.
const MIN_DAMPING: f64 = 1.0 / 256.0;

/// Failures from a single block solve.
///
/// The orchestrator wraps these with iteration and block context; see
/// [`crate::Error`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelaxError {
    /// The coefficient was non-positive or non-finite at an evaluated point.
    #[error("metric coefficient must be positive and finite, got {value} at {point:?}")]
    MetricDomain { value: f64, point: Vec<f64> },

    /// A proposed step had a non-finite coordinate. `node` indexes the
    /// block's interior rows.
    #[error("non-finite update for node {node}")]
    NonFiniteUpdate { node: usize },
}

/// Knobs for one local solve.
#[derive(Debug, Clone)]
pub struct BlockRelaxConfig {
    /// Gauss–Seidel sweeps over the block interior per call.
    pub sweeps: usize,
    /// Early exit once the largest node step in a sweep drops below this.
    pub min_step: f64,
}

impl Default for BlockRelaxConfig {
    fn default() -> Self {
        Self {
            sweeps: 8,
            min_step: 1e-12,
        }
    }
}

#[inline]
fn coeff_checked<M: IsotropicMetric>(
    metric: &M,
    x: &ArrayView1<f64>,
) -> Result<f64, RelaxError> {
    let c = metric.coefficient(x);
    if c <= 0.0 || !c.is_finite() {
        return Err(RelaxError::MetricDomain {
            value: c,
            point: x.to_vec(),
        });
    }
    Ok(c)
}

#[inline]
fn chord_len(pts: &ArrayView2<f64>, i: usize, j: usize) -> f64 {
    let mut acc = 0.0f64;
    for k in 0..pts.ncols() {
        let d = pts[[j, k]] - pts[[i, k]];
        acc += d * d;
    }
    acc.sqrt()
}

#[inline]
fn midpoint(pts: &ArrayView2<f64>, i: usize, j: usize, out: &mut Array1<f64>) {
    for k in 0..pts.ncols() {
        out[k] = 0.5 * (pts[[i, k]] + pts[[j, k]]);
    }
}

/// The discretized weighted length of a polyline under `metric`.
///
/// Simpson quadrature of the coefficient along each chord; this is the exact
/// functional [`relax_block`] descends, so it is the right scalar to track
/// across solver iterations. Fewer than two rows have zero length.
pub fn weighted_length<M: IsotropicMetric>(
    points: &ArrayView2<f64>,
    metric: &M,
) -> Result<f64, RelaxError> {
    let mut mid = Array1::zeros(points.ncols());
    let mut acc = 0.0f64;
    for i in 1..points.nrows() {
        midpoint(points, i - 1, i, &mut mid);
        let ca = coeff_checked(metric, &points.row(i - 1))?;
        let cm = coeff_checked(metric, &mid.view())?;
        let cb = coeff_checked(metric, &points.row(i))?;
        let w = (ca + 4.0 * cm + cb) / 6.0;
        acc += w * chord_len(points, i - 1, i);
    }
    Ok(acc)
}

/// One in-place Gauss–Seidel pass over the interior rows `1..=k` of `pts`.
///
/// Returns the largest node step taken. `damping` scales every step.
fn sweep<M: IsotropicMetric>(
    metric: &M,
    pts: &mut Array2<f64>,
    damping: f64,
) -> Result<f64, RelaxError> {
    let interior = pts.nrows() - 2;
    let dim = pts.ncols();
    let mut m0 = Array1::zeros(dim);
    let mut m1 = Array1::zeros(dim);
    let mut force = Array1::zeros(dim);
    let mut max_step = 0.0f64;

    for j in 1..=interior {
        let view = pts.view();
        let l0 = chord_len(&view, j - 1, j);
        let l1 = chord_len(&view, j, j + 1);
        midpoint(&view, j - 1, j, &mut m0);
        midpoint(&view, j, j + 1, &mut m1);

        let c_prev = coeff_checked(metric, &view.row(j - 1))?;
        let c_here = coeff_checked(metric, &view.row(j))?;
        let c_next = coeff_checked(metric, &view.row(j + 1))?;
        let c_m0 = coeff_checked(metric, &m0.view())?;
        let c_m1 = coeff_checked(metric, &m1.view())?;
        let w0 = (c_prev + 4.0 * c_m0 + c_here) / 6.0;
        let w1 = (c_here + 4.0 * c_m1 + c_next) / 6.0;

        let g_here = metric.gradient(&view.row(j));
        let g_m0 = metric.gradient(&m0.view());
        let g_m1 = metric.gradient(&m1.view());

        // dL/dp_j: neighbor pull through the chord norms plus the
        // quadrature-weight terms in grad c
        let mut diag = 0.0f64;
        for t in 0..dim {
            let mut f = 0.0f64;
            if l0 > 0.0 {
                f += w0 * (view[[j, t]] - view[[j - 1, t]]) / l0;
            }
            if l1 > 0.0 {
                f -= w1 * (view[[j + 1, t]] - view[[j, t]]) / l1;
            }
            f += (l0 * (g_here[t] + 2.0 * g_m0[t]) + l1 * (g_here[t] + 2.0 * g_m1[t])) / 6.0;
            force[t] = f;
        }
        if l0 > 0.0 {
            diag += w0 / l0;
        }
        if l1 > 0.0 {
            diag += w1 / l1;
        }
        if diag <= 0.0 {
            // both segments degenerate; nothing to scale a step by
            continue;
        }

        let scale = damping / diag;
        let mut norm2 = 0.0f64;
        for t in 0..dim {
            let step = scale * force[t];
            norm2 += step * step;
        }
        let norm = norm2.sqrt();
        if !norm.is_finite() {
            return Err(RelaxError::NonFiniteUpdate { node: j - 1 });
        }
        if norm == 0.0 {
            continue;
        }

        let cap = STEP_CAP * l0.min(l1);
        let shrink = if norm > cap { cap / norm } else { 1.0 };
        for t in 0..dim {
            pts[[j, t]] -= shrink * scale * force[t];
        }
        max_step = max_step.max(norm.min(cap));
    }
    Ok(max_step)
}

/// Relax the interior of one block between two pinned boundary points.
///
/// `left` and `right` are the borrowed boundary nodes (a neighboring block's
/// edge node or a global anchor); `interior` holds the block's writable
/// nodes, one per row. Returns the relaxed interior, same shape. The
/// boundaries are read, never written.
pub fn relax_block<M: IsotropicMetric>(
    left: &ArrayView1<f64>,
    interior: &ArrayView2<f64>,
    right: &ArrayView1<f64>,
    metric: &M,
    cfg: &BlockRelaxConfig,
) -> Result<Array2<f64>, RelaxError> {
    let k = interior.nrows();
    let dim = left.len();
    debug_assert_eq!(right.len(), dim);
    debug_assert!(k == 0 || interior.ncols() == dim);

    if k == 0 {
        return Ok(Array2::zeros((0, dim)));
    }

    // working copy padded with the boundary rows
    let mut pts = Array2::zeros((k + 2, dim));
    for t in 0..dim {
        pts[[0, t]] = left[t];
        pts[[k + 1, t]] = right[t];
    }
    for i in 0..k {
        for t in 0..dim {
            pts[[i + 1, t]] = interior[[i, t]];
        }
    }

    let mut energy = weighted_length(&pts.view(), metric)?;
    for _ in 0..cfg.sweeps {
        let snapshot = pts.clone();
        let before = energy;
        let slack = 4.0 * f64::EPSILON * before;
        let mut damping = 1.0f64;
        let mut stalled = false;

        let max_step = loop {
            let step = sweep(metric, &mut pts, damping)?;
            let after = weighted_length(&pts.view(), metric)?;
            if after <= before + slack {
                energy = after;
                break step;
            }
            // too greedy for the local curvature; retry gentler
            pts.assign(&snapshot);
            damping *= 0.5;
            if damping < MIN_DAMPING {
                stalled = true;
                break 0.0;
            }
        };

        if stalled || max_step < cfg.min_step {
            break;
        }
    }

    Ok(pts.slice(s![1..=k, ..]).to_owned())
}
