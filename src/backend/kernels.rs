//! Work-group bodies of the decoding kernels.
//!
//! Each function is the code one work group runs, written against slices so
//! any executor can call it: the CPU backend hands every worker a disjoint
//! slice of the output and its own scratch, a device backend would map the
//! same bodies onto its groups and local memory.

use crate::decoder::argmax::{argmax_strided, argmax_tree, load_slots, ReduceSlot};
use crate::decoder::collapse::collapse_path;
use crate::types::{DecoderDims, Label};

/// Fused group for one batch element.
///
/// `element` holds the element's `(C+1) x T` scores, `lanes` is group-local
/// scratch of `T` labels and `out` is the element's result row.
pub fn best_path_and_collapse(
    element: &[f32],
    dims: &DecoderDims,
    lanes: &mut [Label],
    out: &mut [Label],
) {
    let steps = dims.max_t;
    let classes = dims.num_classes();

    // Lane t: serial argmax over its column.
    for (t, lane) in lanes[..steps].iter_mut().enumerate() {
        *lane = argmax_strided(element, t, steps, classes);
    }

    // Barrier: every lane result above is final before lane 0 reads them.
    collapse_path(&lanes[..steps], dims.blank(), out);
}

/// Best-path group for one (element, timestep) pair.
///
/// `group` is the flat index `b * T + t`. `slots` is group-local scratch of
/// `C+1` (value, index) pairs, one per lane.
pub fn best_path(
    scores: &[f32],
    dims: &DecoderDims,
    group: usize,
    slots: &mut [ReduceSlot],
) -> Label {
    let steps = dims.max_t;
    let (b, t) = (group / steps, group % steps);
    let offset = b * dims.element_stride() + t;

    let slots = &mut slots[..dims.num_classes()];
    load_slots(scores, offset, steps, slots);
    argmax_tree(slots)
}

/// Collapse group for one batch element over its finished raw labels.
pub fn collapse_row(raw: &[Label], dims: &DecoderDims, out: &mut [Label]) {
    collapse_path(raw, dims.blank(), out);
}
