//! Multi-threaded CPU backend.
//!
//! `allocate` sizes the "device" buffers and starts a fixed worker pool; each
//! worker owns its kernel scratch for its whole life. A dispatch splits the
//! kernel's work groups into contiguous runs, hands one run to each worker and
//! waits for all of them. Workers write disjoint label slots, so the shared
//! label buffers are plain relaxed atomics; the pool's completion messages
//! order those writes before the next dispatch or read.

use parking_lot::RwLock;
use std::ops::Range;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

use super::kernels;
use super::pool::{PoolError, WorkerPool};
use super::{ComputeBackend, Kernel, LaunchShape};
use crate::config::DecoderConfig;
use crate::decoder::argmax::ReduceSlot;
use crate::error::{DecodeError, Result};
use crate::types::{DecoderDims, Label};

const BACKEND_NAME: &str = "cpu";

/// Buffers shared by the caller and every worker.
#[derive(Debug)]
struct DeviceBuffers {
    dims: DecoderDims,
    /// Staged score tensor.
    scores: RwLock<Vec<f32>>,
    /// Per-timestep argmax results (two-phase only).
    raw: Box<[AtomicI32]>,
    /// Collapsed, blank-padded rows.
    collapsed: Box<[AtomicI32]>,
}

impl DeviceBuffers {
    fn new(dims: DecoderDims) -> Self {
        let labels = || -> Box<[AtomicI32]> {
            (0..dims.label_len())
                .map(|_| AtomicI32::new(dims.blank()))
                .collect()
        };
        Self {
            dims,
            scores: RwLock::new(vec![0.0; dims.score_len()]),
            raw: labels(),
            collapsed: labels(),
        }
    }
}

/// Worker-local kernel scratch.
#[derive(Debug)]
struct Scratch {
    /// Fused lane results, or a raw row being collapsed.
    lanes: Vec<Label>,
    /// Collapsed row before it is published.
    row: Vec<Label>,
    /// Reduction tree slots.
    slots: Vec<ReduceSlot>,
}

impl Scratch {
    fn new(dims: &DecoderDims) -> Self {
        Self {
            lanes: vec![0; dims.max_t],
            row: vec![0; dims.max_t],
            slots: vec![(f32::NEG_INFINITY, 0); dims.num_classes()],
        }
    }
}

/// One worker's share of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupRun {
    kernel: Kernel,
    groups: Range<usize>,
}

fn store_row(buffer: &[AtomicI32], start: usize, row: &[Label]) {
    for (slot, &label) in buffer[start..start + row.len()].iter().zip(row) {
        slot.store(label, Ordering::Relaxed);
    }
}

fn load_row(buffer: &[AtomicI32], start: usize, row: &mut [Label]) {
    let len = row.len();
    for (label, slot) in row.iter_mut().zip(&buffer[start..start + len]) {
        *label = slot.load(Ordering::Relaxed);
    }
}

/// Execute the groups of `run` against the shared buffers.
fn run_groups(buffers: &DeviceBuffers, run: GroupRun, scratch: &mut Scratch) {
    let dims = &buffers.dims;
    let steps = dims.max_t;

    match run.kernel {
        Kernel::BestPathAndCollapse => {
            let scores = buffers.scores.read();
            let stride = dims.element_stride();
            for b in run.groups {
                let element = &scores[b * stride..(b + 1) * stride];
                kernels::best_path_and_collapse(element, dims, &mut scratch.lanes, &mut scratch.row);
                store_row(&buffers.collapsed, b * steps, &scratch.row);
            }
        }
        Kernel::BestPath => {
            let scores = buffers.scores.read();
            for g in run.groups {
                let label = kernels::best_path(&scores, dims, g, &mut scratch.slots);
                buffers.raw[g].store(label, Ordering::Relaxed);
            }
        }
        Kernel::CollapsePath => {
            for b in run.groups {
                load_row(&buffers.raw, b * steps, &mut scratch.lanes);
                kernels::collapse_row(&scratch.lanes, dims, &mut scratch.row);
                store_row(&buffers.collapsed, b * steps, &scratch.row);
            }
        }
    }
}

/// Split `groups` into at most `workers` contiguous, non-empty runs.
fn partition(groups: usize, workers: usize) -> impl Iterator<Item = Range<usize>> {
    let per_worker = groups.div_ceil(workers.max(1)).max(1);
    (0..groups)
        .step_by(per_worker)
        .map(move |start| start..(start + per_worker).min(groups))
}

#[derive(Debug)]
struct Allocation {
    buffers: Arc<DeviceBuffers>,
    pool: WorkerPool<GroupRun, Scratch>,
}

/// CPU implementation of [`ComputeBackend`].
#[derive(Debug)]
pub struct CpuBackend {
    workers: usize,
    trace_dispatch: bool,
    allocation: Option<Allocation>,
    threads_spawned: usize,
}

impl CpuBackend {
    /// Create a backend that runs on `workers` threads.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            trace_dispatch: false,
            allocation: None,
            threads_spawned: 0,
        }
    }

    /// Create a backend with the worker count and tracing of `config`.
    pub fn from_config(config: &DecoderConfig) -> Self {
        let mut backend = Self::new(config.effective_workers());
        backend.trace_dispatch = config.debug_dispatch;
        backend
    }

    /// Worker threads used per dispatch (at most).
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Threads this backend has started over its lifetime. One worker runs
    /// inline and starts none.
    pub fn threads_spawned(&self) -> usize {
        self.threads_spawned
    }

    fn allocation(&mut self) -> Result<&mut Allocation> {
        self.allocation.as_mut().ok_or_else(|| {
            DecodeError::backend(BACKEND_NAME, "buffers used before allocate")
        })
    }
}

fn dispatch_error(kernel: Kernel, e: PoolError) -> DecodeError {
    match e {
        PoolError::Panicked(_) => {
            DecodeError::backend(BACKEND_NAME, format!("worker panicked in {}: {}", kernel, e))
        }
        PoolError::Disconnected => {
            DecodeError::backend(BACKEND_NAME, format!("{} aborted: {}", kernel, e))
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn allocate(&mut self, dims: DecoderDims) -> Result<()> {
        // Joins any previous pool before starting the new one.
        self.allocation = None;

        let buffers = Arc::new(DeviceBuffers::new(dims));
        // No kernel has more groups than (element, timestep) pairs.
        let workers = self.workers.min(dims.label_len().max(1));

        let shared = Arc::clone(&buffers);
        let pool = WorkerPool::new(
            "bestpath-worker",
            workers,
            || Scratch::new(&dims),
            move |run: GroupRun, scratch: &mut Scratch| run_groups(&shared, run, scratch),
        )
        .map_err(|e| {
            DecodeError::backend(BACKEND_NAME, format!("failed to start workers: {}", e))
        })?;

        self.threads_spawned += pool.threads();
        info!(
            "CPU backend allocated {} scores, {} labels, {} workers",
            dims.score_len(),
            dims.label_len(),
            pool.workers()
        );

        self.allocation = Some(Allocation { buffers, pool });
        Ok(())
    }

    fn write_scores(&mut self, scores: &[f32]) -> Result<()> {
        let allocation = self.allocation()?;
        let mut staged = allocation.buffers.scores.write();
        if scores.len() != staged.len() {
            return Err(DecodeError::backend(
                BACKEND_NAME,
                format!(
                    "score buffer holds {} values, got {}",
                    staged.len(),
                    scores.len()
                ),
            ));
        }
        staged.copy_from_slice(scores);
        Ok(())
    }

    fn dispatch(&mut self, kernel: Kernel, launch: LaunchShape) -> Result<()> {
        let trace_dispatch = self.trace_dispatch;
        let allocation = self.allocation()?;

        let expected = LaunchShape::for_kernel(kernel, &allocation.buffers.dims);
        if launch != expected {
            return Err(DecodeError::backend(
                BACKEND_NAME,
                format!(
                    "launch {:?} does not match {} geometry {:?}",
                    launch, kernel, expected
                ),
            ));
        }

        let groups = launch.groups();
        debug!("Dispatching {} over {} groups", kernel, groups);
        if trace_dispatch {
            trace!(
                kernel = %kernel,
                groups,
                lanes = launch.lanes_per_group(),
                "dispatch"
            );
        }

        let runs = partition(groups, allocation.pool.workers())
            .map(|groups| GroupRun { kernel, groups });

        allocation
            .pool
            .run(runs)
            .map_err(|e| dispatch_error(kernel, e))
    }

    fn read_labels(&mut self, out: &mut [Label]) -> Result<()> {
        let allocation = self.allocation()?;
        let collapsed = &allocation.buffers.collapsed;
        if out.len() != collapsed.len() {
            return Err(DecodeError::backend(
                BACKEND_NAME,
                format!(
                    "result buffer holds {} labels, got room for {}",
                    collapsed.len(),
                    out.len()
                ),
            ));
        }
        load_row(collapsed, 0, out);
        debug!("Read back {} labels", out.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_scores() -> Vec<f32> {
        // Element 0: "ab", element 1: "a" (alphabet "ab", T = 2)
        vec![
            0.6, 0.0, 0.0, 0.6, 0.4, 0.4, //
            0.6, 0.6, 0.0, 0.0, 0.4, 0.4,
        ]
    }

    fn run(backend: &mut CpuBackend, dims: DecoderDims, kernels: &[Kernel]) -> Vec<Label> {
        backend.allocate(dims).unwrap();
        backend.write_scores(&scenario_scores()).unwrap();
        for &kernel in kernels {
            backend
                .dispatch(kernel, LaunchShape::for_kernel(kernel, &dims))
                .unwrap();
        }
        let mut out = vec![0; dims.label_len()];
        backend.read_labels(&mut out).unwrap();
        out
    }

    #[test]
    fn test_fused_and_two_phase_agree() {
        let dims = DecoderDims::new(2, 2, 2);
        for workers in [1, 2, 4] {
            let fused = run(
                &mut CpuBackend::new(workers),
                dims,
                &[Kernel::BestPathAndCollapse],
            );
            let two_phase = run(
                &mut CpuBackend::new(workers),
                dims,
                &[Kernel::BestPath, Kernel::CollapsePath],
            );
            assert_eq!(fused, vec![0, 1, 0, 2]);
            assert_eq!(two_phase, fused);
        }
    }

    #[test]
    fn test_dispatch_before_allocate_fails() {
        let mut backend = CpuBackend::new(2);
        let dims = DecoderDims::new(1, 2, 2);
        let err = backend
            .dispatch(Kernel::BestPath, LaunchShape::for_kernel(Kernel::BestPath, &dims))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Backend { .. }));
    }

    #[test]
    fn test_dispatch_rejects_wrong_geometry() {
        let mut backend = CpuBackend::new(1);
        let dims = DecoderDims::new(2, 2, 2);
        backend.allocate(dims).unwrap();

        let other = DecoderDims::new(2, 3, 2);
        let err = backend
            .dispatch(Kernel::BestPath, LaunchShape::for_kernel(Kernel::BestPath, &other))
            .unwrap_err();
        assert!(err.to_string().contains("best_path"));
    }

    #[test]
    fn test_write_rejects_wrong_length() {
        let mut backend = CpuBackend::new(1);
        backend.allocate(DecoderDims::new(1, 2, 2)).unwrap();
        assert!(backend.write_scores(&[0.0; 5]).is_err());
        assert!(backend.write_scores(&[0.0; 6]).is_ok());
    }

    #[test]
    fn test_more_workers_than_groups() {
        let dims = DecoderDims::new(2, 2, 2);
        let mut backend = CpuBackend::new(16);
        let out = run(&mut backend, dims, &[Kernel::BestPathAndCollapse]);
        assert_eq!(out, vec![0, 1, 0, 2]);
        // Capped by the four (element, timestep) groups.
        assert_eq!(backend.threads_spawned(), 4);
    }

    #[test]
    fn test_workers_started_once_per_allocation() {
        let dims = DecoderDims::new(2, 2, 2);
        let mut backend = CpuBackend::new(3);
        backend.allocate(dims).unwrap();
        assert_eq!(backend.threads_spawned(), 3);

        backend.write_scores(&scenario_scores()).unwrap();
        for _ in 0..5 {
            for kernel in [Kernel::BestPath, Kernel::CollapsePath, Kernel::BestPathAndCollapse] {
                backend
                    .dispatch(kernel, LaunchShape::for_kernel(kernel, &dims))
                    .unwrap();
            }
        }
        assert_eq!(backend.threads_spawned(), 3);
    }

    #[test]
    fn test_single_worker_spawns_nothing() {
        let dims = DecoderDims::new(2, 2, 2);
        let mut backend = CpuBackend::from_config(
            &DecoderConfig::new(2, 2, 2)
                .with_workers(8)
                .with_debug_dispatch(true),
        );
        let out = run(&mut backend, dims, &[Kernel::BestPath, Kernel::CollapsePath]);
        assert_eq!(out, vec![0, 1, 0, 2]);
        assert_eq!(backend.threads_spawned(), 0);
    }

    #[test]
    fn test_worker_panic_becomes_backend_error() {
        for workers in [1, 3] {
            let mut pool = WorkerPool::new("test", workers, || (), |run: GroupRun, _: &mut ()| {
                if run.groups.start == 0 {
                    panic!("group body failed");
                }
            })
            .unwrap();

            let runs = partition(4, workers).map(|groups| GroupRun {
                kernel: Kernel::BestPath,
                groups,
            });
            let err = pool
                .run(runs)
                .map_err(|e| dispatch_error(Kernel::BestPath, e))
                .unwrap_err();
            assert!(matches!(err, DecodeError::Backend { ref backend, .. } if backend.as_str() == BACKEND_NAME));
            assert!(err.to_string().contains("panicked"));
        }
    }

    #[test]
    fn test_partition_covers_every_group_once() {
        let runs: Vec<_> = partition(7, 3).collect();
        assert_eq!(runs, vec![0..3, 3..6, 6..7]);

        let runs: Vec<_> = partition(2, 8).collect();
        assert_eq!(runs, vec![0..1, 1..2]);

        assert_eq!(partition(0, 4).count(), 0);
    }
}
