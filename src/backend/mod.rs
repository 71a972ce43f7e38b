//! Compute backend abstraction.
//!
//! The decoder drives a backend through three primitives: stage the score
//! tensor (may return before the copy lands), dispatch a kernel over a launch
//! geometry, and read the collapsed labels back (always blocking). Device
//! selection, kernel compilation, and buffer management live behind this
//! trait.

mod cpu;
pub mod kernels;
mod pool;

pub use cpu::CpuBackend;

use std::fmt;

use crate::error::Result;
use crate::types::{DecoderDims, Label};

/// Kernels a backend must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Argmax per timestep and collapse per element in a single dispatch.
    BestPathAndCollapse,
    /// Argmax per (element, timestep) into the raw label buffer.
    BestPath,
    /// Collapse each element's raw labels into the result buffer.
    CollapsePath,
}

impl Kernel {
    /// Kernel entry point name.
    pub fn name(self) -> &'static str {
        match self {
            Kernel::BestPathAndCollapse => "best_path_and_collapse",
            Kernel::BestPath => "best_path",
            Kernel::CollapsePath => "collapse_path",
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Global and local work sizes of one dispatch.
///
/// Unused trailing dimensions are 1. `local == None` lets the backend choose
/// the group size, and every work item is then its own group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchShape {
    pub global: [usize; 3],
    pub local: Option<[usize; 3]>,
}

impl LaunchShape {
    /// Geometry of `kernel` for a decoder of size `dims`.
    ///
    /// - fused: `(B, T) / (1, T)`, one group per element, one lane per timestep
    /// - best path: `(B, T, C+1) / (1, 1, C+1)`, one lane per class
    /// - collapse: `(B)`, one work item per element
    pub fn for_kernel(kernel: Kernel, dims: &DecoderDims) -> Self {
        let b = dims.batch_size;
        let t = dims.max_t;
        let c = dims.num_classes();
        match kernel {
            Kernel::BestPathAndCollapse => Self {
                global: [b, t, 1],
                local: Some([1, t, 1]),
            },
            Kernel::BestPath => Self {
                global: [b, t, c],
                local: Some([1, 1, c]),
            },
            Kernel::CollapsePath => Self {
                global: [b, 1, 1],
                local: None,
            },
        }
    }

    /// Number of work groups.
    pub fn groups(&self) -> usize {
        match self.local {
            Some(local) => self
                .global
                .iter()
                .zip(local.iter())
                .map(|(g, l)| g / (*l).max(1))
                .product(),
            None => self.global.iter().product(),
        }
    }

    /// Lanes per work group.
    pub fn lanes_per_group(&self) -> usize {
        self.local.map_or(1, |l| l.iter().product())
    }
}

/// Data-parallel executor for the decoding kernels.
pub trait ComputeBackend: Send {
    /// Backend name, used in errors and logs.
    fn name(&self) -> &str;

    /// Allocate every device buffer and scratch area for `dims`.
    ///
    /// Called once, before any other method. Nothing is allocated afterwards.
    fn allocate(&mut self, dims: DecoderDims) -> Result<()>;

    /// Stage the host score tensor on the device. May return before the copy
    /// completes; later dispatches are ordered after it.
    fn write_scores(&mut self, scores: &[f32]) -> Result<()>;

    /// Run `kernel` over `launch`. Dispatches execute in issue order, and one
    /// dispatch finishes before the next one starts.
    fn dispatch(&mut self, kernel: Kernel, launch: LaunchShape) -> Result<()>;

    /// Copy the collapsed labels into `out`, blocking until all issued work
    /// has finished.
    fn read_labels(&mut self, out: &mut [Label]) -> Result<()>;
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn allocate(&mut self, dims: DecoderDims) -> Result<()> {
        (**self).allocate(dims)
    }

    fn write_scores(&mut self, scores: &[f32]) -> Result<()> {
        (**self).write_scores(scores)
    }

    fn dispatch(&mut self, kernel: Kernel, launch: LaunchShape) -> Result<()> {
        (**self).dispatch(kernel, launch)
    }

    fn read_labels(&mut self, out: &mut [Label]) -> Result<()> {
        (**self).read_labels(out)
    }
}
