//! Parallel curve shortening by domain decomposition.
//!
//! The driver behind [`compute_geodesic`]: split the curve's interior into
//! contiguous blocks of at most `local_num_nodes` nodes, relax every block
//! concurrently against a frozen snapshot of the previous iterate
//! ([`relax_block`](crate::relax::relax_block) with the two bracketing nodes
//! pinned), then merge all blocks back in index order and measure the average
//! node displacement. Iterate until that average drops below `tol`.
//!
//! Block edges are not special in the limit: a converged curve has zero
//! discrete force at every interior node, and each node's force is computed
//! entirely within the one block that owns it, so the fixed point does not
//! depend on how the interior was partitioned. The partition (and every loop
//! in this module) is a pure function of node count and configuration, and
//! merging is sequential in block order, so a solve is bit-reproducible for
//! any worker count.
//!
//! Workers run on a dedicated `rayon` pool sized by `processes`; the
//! per-iteration `collect` is both the barrier and the fail-fast path for
//! metric domain errors, which come back wrapped with iteration and block
//! context.

use ndarray::{s, Array1, Array2};
use rayon::prelude::*;

use crate::curve::Curve;
use crate::metric::IsotropicMetric;
use crate::relax::{relax_block, BlockRelaxConfig, RelaxError};
use crate::{Error, Result};

/// Knobs for [`compute_geodesic_with_config`].
#[derive(Debug, Clone)]
pub struct ShortenConfig {
    /// Interior nodes per block, the grain of the domain decomposition.
    pub local_num_nodes: usize,
    /// Convergence threshold on the average interior displacement per
    /// iteration.
    ///
    /// This bounds per-iteration progress, not residual error: at
    /// convergence the curve typically sits one to two orders of magnitude
    /// farther from the true geodesic than `tol`. Choose it below the
    /// accuracy the caller actually needs.
    pub tol: f64,
    /// Worker pool size. `0` sizes the pool to the available cores.
    pub processes: usize,
    /// Outer-iteration ceiling. Hitting it is reported, not an error.
    pub max_iterations: usize,
    /// Local solver knobs, applied to every block.
    pub relax: BlockRelaxConfig,
}

impl Default for ShortenConfig {
    fn default() -> Self {
        Self {
            local_num_nodes: 8,
            tol: 1e-4,
            processes: 0,
            max_iterations: 50_000,
            relax: BlockRelaxConfig::default(),
        }
    }
}

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// The average interior displacement fell below the tolerance.
    Converged,
    /// The iteration ceiling was reached first; the curve holds the last
    /// iterate.
    MaxIterationsExceeded,
}

/// What a solve did.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub outcome: SolveOutcome,
    /// Outer iterations run.
    pub iterations: usize,
    /// Average interior displacement of the final iteration. Zero when the
    /// curve had no interior to move.
    pub avg_displacement: f64,
}

/// One block's frozen inputs for an iteration.
///
/// `lo..=hi` are the curve indices this block may write; the bracketing
/// nodes at `lo - 1` and `hi + 1` ride along read-only.
struct BlockTask {
    lo: usize,
    hi: usize,
    left: Array1<f64>,
    interior: Array2<f64>,
    right: Array1<f64>,
}

/// Writable curve-index ranges `[lo, hi]`, in order, covering `1..=interior`.
fn partition(interior: usize, local_num_nodes: usize) -> Vec<(usize, usize)> {
    let blocks = interior.div_ceil(local_num_nodes);
    (0..blocks)
        .map(|b| {
            let lo = 1 + b * local_num_nodes;
            let hi = (lo + local_num_nodes - 1).min(interior);
            (lo, hi)
        })
        .collect()
}

fn with_context(err: RelaxError, iteration: usize, task: &BlockTask) -> Error {
    match err {
        RelaxError::MetricDomain { value, point } => Error::MetricDomain {
            value,
            point,
            iteration,
            block_lo: task.lo,
            block_hi: task.hi,
        },
        RelaxError::NonFiniteUpdate { node } => Error::NonFiniteUpdate {
            node: task.lo + node,
            iteration,
            block_lo: task.lo,
            block_hi: task.hi,
        },
    }
}

/// Shorten `curve` toward a geodesic of `metric`.
///
/// Convenience wrapper over [`compute_geodesic_with_config`] exposing the
/// knobs that matter most: block grain, tolerance, and worker count
/// (`0` = all cores). Everything else takes its default. `tol` stops the
/// iteration on progress, not on distance to the geodesic; see
/// [`ShortenConfig::tol`].
pub fn compute_geodesic<M: IsotropicMetric + Sync>(
    curve: &mut Curve,
    local_num_nodes: usize,
    tol: f64,
    metric: &M,
    processes: usize,
) -> Result<SolveReport> {
    let cfg = ShortenConfig {
        local_num_nodes,
        tol,
        processes,
        ..ShortenConfig::default()
    };
    compute_geodesic_with_config(curve, metric, &cfg)
}

/// Shorten `curve` toward a geodesic of `metric`, fully configured.
///
/// The curve is mutated in place; endpoints never move. On success the
/// report says whether the tolerance was reached or the iteration ceiling
/// cut the solve short. On error the curve holds the last completed
/// iterate: a failed iteration is abandoned whole, never merged partially.
pub fn compute_geodesic_with_config<M: IsotropicMetric + Sync>(
    curve: &mut Curve,
    metric: &M,
    cfg: &ShortenConfig,
) -> Result<SolveReport> {
    if cfg.local_num_nodes == 0 {
        return Err(Error::Domain("local_num_nodes must be at least 1"));
    }
    if !cfg.tol.is_finite() || cfg.tol <= 0.0 {
        return Err(Error::Domain("tol must be positive and finite"));
    }
    if cfg.max_iterations == 0 {
        return Err(Error::Domain("max_iterations must be at least 1"));
    }
    if cfg.relax.sweeps == 0 {
        return Err(Error::Domain("relax.sweeps must be at least 1"));
    }
    if !cfg.relax.min_step.is_finite() || cfg.relax.min_step < 0.0 {
        return Err(Error::Domain("relax.min_step must be finite and non-negative"));
    }

    let num_nodes = curve.num_nodes();
    let dim = curve.dim();
    let interior_nodes = num_nodes - 2;
    if interior_nodes == 0 {
        log::debug!("curve has no interior nodes, trivially converged");
        return Ok(SolveReport {
            outcome: SolveOutcome::Converged,
            iterations: 0,
            avg_displacement: 0.0,
        });
    }

    let blocks = partition(interior_nodes, cfg.local_num_nodes);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.processes)
        .build()
        .map_err(|_| Error::Domain("failed to build the worker pool"))?;
    log::debug!(
        "shortening a {num_nodes}-node curve in R^{dim}: {} block(s) of <= {} node(s), \
         tol {:e}, {} worker thread(s)",
        blocks.len(),
        cfg.local_num_nodes,
        cfg.tol,
        pool.current_num_threads(),
    );

    let mut prev = curve.points();
    let mut avg = f64::INFINITY;
    for iteration in 1..=cfg.max_iterations {
        // copy-in: every block gets a detached slice of the frozen iterate
        let tasks: Vec<BlockTask> = blocks
            .iter()
            .map(|&(lo, hi)| BlockTask {
                lo,
                hi,
                left: prev.row(lo - 1).to_owned(),
                interior: prev.slice(s![lo..=hi, ..]).to_owned(),
                right: prev.row(hi + 1).to_owned(),
            })
            .collect();

        // the collect is the iteration barrier, and fails fast on the
        // first block error
        let relaxed: Vec<Array2<f64>> = pool.install(|| {
            tasks
                .par_iter()
                .map(|task| {
                    relax_block(
                        &task.left.view(),
                        &task.interior.view(),
                        &task.right.view(),
                        metric,
                        &cfg.relax,
                    )
                    .map_err(|e| with_context(e, iteration, task))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        // merge in block order and accumulate the displacement
        let mut interior = Array2::zeros((interior_nodes, dim));
        let mut moved = 0.0f64;
        for (task, block) in tasks.iter().zip(&relaxed) {
            for i in 0..block.nrows() {
                let row = task.lo - 1 + i;
                let mut norm2 = 0.0f64;
                for t in 0..dim {
                    let new = block[[i, t]];
                    let delta = new - prev[[task.lo + i, t]];
                    norm2 += delta * delta;
                    interior[[row, t]] = new;
                }
                moved += norm2.sqrt();
            }
        }
        avg = moved / interior_nodes as f64;

        curve.replace_interior(&interior.view())?;
        prev = curve.points();
        log::trace!("iteration {iteration}: avg displacement {avg:e}");

        if avg < cfg.tol {
            log::debug!("converged after {iteration} iteration(s), avg displacement {avg:e}");
            return Ok(SolveReport {
                outcome: SolveOutcome::Converged,
                iterations: iteration,
                avg_displacement: avg,
            });
        }
    }

    log::warn!(
        "stopping after {} iteration(s) with avg displacement {avg:e} >= tol {:e}; \
         returning the last iterate",
        cfg.max_iterations,
        cfg.tol,
    );
    Ok(SolveReport {
        outcome: SolveOutcome::MaxIterationsExceeded,
        iterations: cfg.max_iterations,
        avg_displacement: avg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{EuclideanMetric, ExpMetric, FnMetric};
    use ndarray::{array, ArrayView1};
    use proptest::prelude::*;

    fn panicking_metric() -> impl IsotropicMetric + Sync {
        FnMetric::new(
            |_: &ArrayView1<f64>| -> f64 { unreachable!("metric must not be evaluated") },
            |_: &ArrayView1<f64>| -> Array1<f64> { unreachable!("metric must not be evaluated") },
        )
    }

    #[test]
    fn partition_covers_the_interior_in_order() {
        assert_eq!(partition(30, 8), vec![(1, 8), (9, 16), (17, 24), (25, 30)]);
        assert_eq!(partition(8, 8), vec![(1, 8)]);
        assert_eq!(partition(5, 8), vec![(1, 5)]);
        assert_eq!(partition(1, 1), vec![(1, 1)]);
    }

    #[test]
    fn config_validation_rejects_bad_knobs() {
        let m = EuclideanMetric;
        let start = array![0.0, 0.0];
        let end = array![1.0, 0.0];
        let mut curve = Curve::new(&start.view(), &end.view(), 8).unwrap();

        let bad = [
            ShortenConfig {
                local_num_nodes: 0,
                ..ShortenConfig::default()
            },
            ShortenConfig {
                tol: 0.0,
                ..ShortenConfig::default()
            },
            ShortenConfig {
                tol: f64::NAN,
                ..ShortenConfig::default()
            },
            ShortenConfig {
                max_iterations: 0,
                ..ShortenConfig::default()
            },
            ShortenConfig {
                relax: BlockRelaxConfig {
                    sweeps: 0,
                    ..BlockRelaxConfig::default()
                },
                ..ShortenConfig::default()
            },
            ShortenConfig {
                relax: BlockRelaxConfig {
                    min_step: -1.0,
                    ..BlockRelaxConfig::default()
                },
                ..ShortenConfig::default()
            },
        ];
        for cfg in &bad {
            let err = compute_geodesic_with_config(&mut curve, &m, cfg).unwrap_err();
            assert!(matches!(err, Error::Domain(_)), "got {err:?}");
        }
    }

    #[test]
    fn two_node_curve_converges_without_evaluating_the_metric() {
        let start = array![0.0, 3.0];
        let end = array![-2.0, 1.0];
        let mut curve = Curve::new(&start.view(), &end.view(), 2).unwrap();
        let report =
            compute_geodesic(&mut curve, 8, 1e-6, &panicking_metric(), 1).unwrap();
        assert_eq!(report.outcome, SolveOutcome::Converged);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.avg_displacement, 0.0);
        assert_eq!(curve.point(0).to_vec(), vec![0.0, 3.0]);
        assert_eq!(curve.point(1).to_vec(), vec![-2.0, 1.0]);
    }

    #[test]
    fn flat_perturbed_curve_returns_to_the_chord() {
        let m = EuclideanMetric;
        let start = array![0.0, 0.0];
        let end = array![5.0, 0.0];
        let mut curve = Curve::new(&start.view(), &end.view(), 6).unwrap();
        let interior = array![[1.0, 0.3], [2.0, -0.2], [3.0, 0.4], [4.0, 0.1]];
        curve.replace_interior(&interior.view()).unwrap();

        let cfg = ShortenConfig {
            local_num_nodes: 2,
            tol: 1e-10,
            processes: 1,
            ..ShortenConfig::default()
        };
        let report = compute_geodesic_with_config(&mut curve, &m, &cfg).unwrap();
        assert_eq!(report.outcome, SolveOutcome::Converged);
        assert!(report.avg_displacement < 1e-10);

        let pts = curve.points();
        for i in 1..5 {
            assert!(
                pts[[i, 1]].abs() < 1e-8,
                "node {i} off the chord by {}",
                pts[[i, 1]]
            );
        }
        assert_eq!(pts.row(0).to_vec(), vec![0.0, 0.0]);
        assert_eq!(pts.row(5).to_vec(), vec![5.0, 0.0]);
    }

    #[test]
    fn worker_count_does_not_change_the_bits() {
        let m = ExpMetric::new(array![0.3, 0.65]);
        let start = array![-1.0, -0.2];
        let end = array![1.0, 0.3];
        let base = Curve::new(&start.view(), &end.view(), 12).unwrap();

        let mut solo = base.clone();
        let mut pooled = base.clone();
        let cfg = |processes: usize| ShortenConfig {
            local_num_nodes: 3,
            tol: 1e-6,
            processes,
            ..ShortenConfig::default()
        };
        let a = compute_geodesic_with_config(&mut solo, &m, &cfg(1)).unwrap();
        let b = compute_geodesic_with_config(&mut pooled, &m, &cfg(3)).unwrap();

        assert_eq!(solo.points(), pooled.points());
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.outcome, b.outcome);
        assert_eq!(a.avg_displacement, b.avg_displacement);
    }

    #[test]
    fn iteration_ceiling_reports_instead_of_failing() {
        let m = ExpMetric::new(array![0.0, 0.65]);
        let start = array![-1.0, 0.0];
        let end = array![1.0, 0.0];
        let mut curve = Curve::new(&start.view(), &end.view(), 10).unwrap();
        let initial = curve.points();

        let cfg = ShortenConfig {
            local_num_nodes: 4,
            tol: 1e-12,
            processes: 1,
            max_iterations: 2,
            ..ShortenConfig::default()
        };
        let report = compute_geodesic_with_config(&mut curve, &m, &cfg).unwrap();
        assert_eq!(report.outcome, SolveOutcome::MaxIterationsExceeded);
        assert_eq!(report.iterations, 2);
        assert!(report.avg_displacement > 0.0);
        assert!(report.avg_displacement.is_finite());
        assert_ne!(curve.points(), initial);
    }

    #[test]
    fn metric_domain_error_carries_solver_context() {
        let m = FnMetric::new(
            |_: &ArrayView1<f64>| -2.0,
            |x: &ArrayView1<f64>| Array1::zeros(x.len()),
        );
        let start = array![0.0, 0.0];
        let end = array![1.0, 0.0];
        let mut curve = Curve::new(&start.view(), &end.view(), 8).unwrap();
        let before = curve.points();

        let cfg = ShortenConfig {
            local_num_nodes: 3,
            tol: 1e-6,
            processes: 1,
            ..ShortenConfig::default()
        };
        let err = compute_geodesic_with_config(&mut curve, &m, &cfg).unwrap_err();
        match err {
            Error::MetricDomain {
                value,
                point,
                iteration,
                block_lo,
                block_hi,
            } => {
                assert_eq!(value, -2.0);
                assert_eq!(point.len(), 2);
                assert_eq!(iteration, 1);
                assert_eq!(block_lo, 1);
                assert_eq!(block_hi, 3);
            }
            other => panic!("expected MetricDomain, got {other:?}"),
        }
        // the failed iteration must not have been half-merged
        assert_eq!(curve.points(), before);
    }

    #[test]
    fn blowup_error_names_the_global_node() {
        let m = FnMetric::new(
            |_: &ArrayView1<f64>| 1.0,
            |x: &ArrayView1<f64>| {
                let mut g = Array1::zeros(x.len());
                g[0] = f64::INFINITY;
                g
            },
        );
        let start = array![0.0, 0.0];
        let end = array![1.0, 0.0];
        let mut curve = Curve::new(&start.view(), &end.view(), 6).unwrap();

        let cfg = ShortenConfig {
            local_num_nodes: 10,
            tol: 1e-6,
            processes: 1,
            ..ShortenConfig::default()
        };
        let err = compute_geodesic_with_config(&mut curve, &m, &cfg).unwrap_err();
        match err {
            Error::NonFiniteUpdate {
                node,
                iteration,
                block_lo,
                block_hi,
            } => {
                assert_eq!(node, 1);
                assert_eq!(iteration, 1);
                assert_eq!(block_lo, 1);
                assert_eq!(block_hi, 4);
            }
            other => panic!("expected NonFiniteUpdate, got {other:?}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn partition_blocks_tile_the_interior(
            interior in 1usize..240,
            local in 1usize..40,
        ) {
            let blocks = partition(interior, local);
            prop_assert!(!blocks.is_empty());
            prop_assert_eq!(blocks[0].0, 1);
            prop_assert_eq!(blocks[blocks.len() - 1].1, interior);
            for pair in blocks.windows(2) {
                prop_assert_eq!(pair[1].0, pair[0].1 + 1);
            }
            for (i, &(lo, hi)) in blocks.iter().enumerate() {
                prop_assert!(hi >= lo);
                let size = hi - lo + 1;
                if i + 1 < blocks.len() {
                    prop_assert_eq!(size, local);
                } else {
                    prop_assert!(size <= local);
                }
            }
        }
    }
}
