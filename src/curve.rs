//! Polyline curve state.
//!
//! A geodesic candidate is an ordered list of nodes in \(\mathbb{R}^d\) whose
//! first and last entries are the boundary conditions of the problem. The
//! solver owns exactly one [`Curve`] and rewrites its interior wholesale once
//! per iteration; everything handed out of this module is a copy, so workers
//! and callers never alias live solver state.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::{Error, Result};

/// An ordered polyline of `num_nodes` points in \(\mathbb{R}^d\).
///
/// Endpoints are pinned at construction and no operation moves them. Interior
/// points are replaced between iterations, never mutated in place.
#[derive(Debug, Clone)]
pub struct Curve {
    /// Row `i` is node `i`; shape `(num_nodes, dim)`.
    points: Array2<f64>,
}

impl Curve {
    /// Build the initial candidate: endpoints pinned, interior seeded on the
    /// straight chord between them at uniform parametric spacing.
    pub fn new(start: &ArrayView1<f64>, end: &ArrayView1<f64>, num_nodes: usize) -> Result<Self> {
        if start.len() != end.len() {
            return Err(Error::DimensionMismatch {
                left: start.len(),
                right: end.len(),
            });
        }
        if start.is_empty() {
            return Err(Error::Domain("points must have at least one coordinate"));
        }
        if num_nodes < 2 {
            return Err(Error::InvalidNodeCount { got: num_nodes });
        }
        if start.iter().chain(end.iter()).any(|v| !v.is_finite()) {
            return Err(Error::Domain("endpoint coordinates must be finite"));
        }

        let dim = start.len();
        let mut points = Array2::zeros((num_nodes, dim));
        let denom = (num_nodes - 1) as f64;
        for i in 0..num_nodes {
            let t = i as f64 / denom;
            for k in 0..dim {
                points[[i, k]] = (1.0 - t) * start[k] + t * end[k];
            }
        }
        // pin endpoints bit-exactly
        for k in 0..dim {
            points[[0, k]] = start[k];
            points[[num_nodes - 1, k]] = end[k];
        }
        Ok(Self { points })
    }

    /// Total node count, endpoints included.
    pub fn num_nodes(&self) -> usize {
        self.points.nrows()
    }

    /// Coordinate dimension of every node.
    pub fn dim(&self) -> usize {
        self.points.ncols()
    }

    /// View of node `i`. Panics if out of range, like indexing.
    pub fn point(&self, i: usize) -> ArrayView1<'_, f64> {
        self.points.row(i)
    }

    /// Snapshot copy of all nodes, shape `(num_nodes, dim)`.
    ///
    /// The copy is detached: the caller may retain it across iterations and
    /// it will never observe later updates.
    pub fn points(&self) -> Array2<f64> {
        self.points.clone()
    }

    /// Replace all `num_nodes - 2` interior rows at once.
    ///
    /// Validation happens before any write, so on error the curve is
    /// untouched.
    pub fn replace_interior(&mut self, new_interior: &ArrayView2<f64>) -> Result<()> {
        let expected = self.points.nrows() - 2;
        if new_interior.nrows() != expected {
            return Err(Error::LengthMismatch {
                expected,
                got: new_interior.nrows(),
            });
        }
        if new_interior.ncols() != self.dim() {
            return Err(Error::DimensionMismatch {
                left: self.dim(),
                right: new_interior.ncols(),
            });
        }
        for i in 0..expected {
            for k in 0..self.points.ncols() {
                self.points[[i + 1, k]] = new_interior[[i, k]];
            }
        }
        Ok(())
    }
}
