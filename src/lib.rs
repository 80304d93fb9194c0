//! # geod
//!
//! Discrete geodesics on isotropic Riemannian manifolds via parallel curve
//! shortening.
//!
//! This crate is intentionally small:
//!
//! - it implements a **curve-shortening relaxation** (block-wise discrete
//!   Euler–Lagrange descent) over polyline curves in \(\mathbb{R}^d\),
//! - it parallelizes by **domain decomposition** of the interior nodes
//!   (a rayon worker pool with a barrier merge per iteration),
//! - it does not solve boundary-value problems in closed form, and it has no
//!   CLI or plotting layer (that belongs in apps).
//!
//! The metric is conformally flat: a single positive scalar field \(c\)
//! scales Euclidean length, \(ds = c(x)\,\lVert dx \rVert\), so a curve's
//! length is \(L[\gamma] = \int c(\gamma(t))\,\lVert \gamma'(t) \rVert\,dt\)
//! and geodesics are its local minimizers with pinned endpoints.
//!
//! ## Public invariants (must not change)
//!
//! - **Endpoints are pinned**: the first and last node of a [`curve::Curve`]
//!   are bit-identical before and after any solve.
//! - **Determinism**: identical inputs produce identical outputs, independent
//!   of the worker count (fixed block layout, sweep order, summation order,
//!   and merge order).
//! - **Metric violations are errors, never NaN**: a non-positive or
//!   non-finite coefficient aborts the solve with the offending point and the
//!   iteration/block where it was evaluated.
//! - **No hidden remeshing**: the node count is fixed at construction; the
//!   solver only moves interior nodes.
//!
//! ## References (conceptual anchors; not "implemented fully")
//!
//! - The Maupertuis principle: trajectories of conservative systems are
//!   geodesics of a conformally flat (Jacobi) metric, the main practical
//!   source of isotropic metrics.
//! - Kimmel & Sethian, *Computing Geodesic Paths on Manifolds* (PNAS 1998):
//!   the front-propagation alternative to relaxation (not implemented here).
//! - Polthier & Schmies, *Straightest Edge Geodesics on Polyhedral Surfaces*
//!   (1998): a different discrete-geodesic notion, on meshes rather than in
//!   a smooth conformal factor.
//! - Toselli & Widlund, *Domain Decomposition Methods* (Springer 2005): the
//!   Schwarz viewpoint on the block orchestration in `shorten`.
//!
//! ## What can change later
//!
//! - The local step policy (Gauss–Seidel sweeps could become overrelaxed).
//! - Staggered block partitions to speed up inter-block information flow.
//! - Gradient-free metrics (automatic central differencing at the seam).
//!
//! ## Module map
//!
//! - `curve`: the polyline state (pinned endpoints, atomic interior swaps)
//! - `metric`: the isotropic metric seam (`IsotropicMetric`, stock metrics,
//!   finite-difference consistency check)
//! - `relax`: the block-local discrete Euler–Lagrange relaxation
//! - `shorten`: the parallel orchestrator (`compute_geodesic`)

pub mod curve;
pub mod metric;
pub mod relax;
pub mod shorten;

/// geod error variants.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two points that must share a dimension do not.
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// A curve needs at least two nodes (its endpoints).
    #[error("invalid node count: {got} (need at least 2)")]
    InvalidNodeCount { got: usize },

    /// An interior replacement had the wrong number of rows.
    #[error("interior length mismatch: expected {expected} rows, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// The metric coefficient left its domain (must be positive and finite)
    /// at a point the solver evaluated.
    #[error(
        "metric coefficient must be positive and finite, got {value} at {point:?} \
         (iteration {iteration}, block {block_lo}..={block_hi})"
    )]
    MetricDomain {
        value: f64,
        point: Vec<f64>,
        iteration: usize,
        block_lo: usize,
        block_hi: usize,
    },

    /// A relaxation step produced a non-finite coordinate (numerical blow-up).
    #[error(
        "non-finite update for node {node} \
         (iteration {iteration}, block {block_lo}..={block_hi})"
    )]
    NonFiniteUpdate {
        node: usize,
        iteration: usize,
        block_lo: usize,
        block_hi: usize,
    },

    /// Caller misuse that is not worth a structured variant.
    #[error("domain error: {0}")]
    Domain(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
