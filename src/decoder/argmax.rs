//! Per-timestep class selection.
//!
//! Two reducers with the same contract: return the index of the highest
//! score, lowest index on ties. The serial scan walks one strided column of
//! the score tensor; the tree reduction works on a scratch array of
//! (value, index) slots the way a work-group would in local memory.
//!
//! Only strict `>` ever replaces the current best, so an equal later element
//! never displaces an earlier one. NaN ranks as negative infinity in both.

use crate::types::Label;

/// One (value, index) slot of reduction scratch.
pub type ReduceSlot = (f32, Label);

/// Ordering key for a score.
#[inline]
fn rank(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

/// Serial argmax over `count` scores at `offset`, `offset + stride`, ...
///
/// This is how a single lane scans the classes of its timestep: for a
/// `(classes, time)` matrix the stride is the number of timesteps.
pub fn argmax_strided(data: &[f32], offset: usize, stride: usize, count: usize) -> Label {
    debug_assert!(count == 0 || offset + (count - 1) * stride < data.len());

    let mut best_idx = 0;
    let mut best_val = f32::NEG_INFINITY;
    let mut found = false;

    for c in 0..count {
        let val = rank(data[offset + c * stride]);
        if !found || val > best_val {
            best_val = val;
            best_idx = c;
            found = true;
        }
    }

    best_idx as Label
}

/// Fill reduction scratch with the strided column, one slot per lane.
pub fn load_slots(data: &[f32], offset: usize, stride: usize, slots: &mut [ReduceSlot]) {
    for (c, slot) in slots.iter_mut().enumerate() {
        *slot = (rank(data[offset + c * stride]), c as Label);
    }
}

/// Tree reduction over `slots`, leaving the winner in `slots[0]`.
///
/// Each round pairs slot `i` with slot `i + stride` for `i` a multiple of
/// `2 * stride`, so slot `i` always covers a contiguous index range that lies
/// entirely left of its partner's. Strict `>` then keeps the lowest index on
/// ties.
pub fn argmax_tree(slots: &mut [ReduceSlot]) -> Label {
    let n = slots.len();
    if n == 0 {
        return 0;
    }

    let mut stride = 1;
    while stride < n {
        for i in (0..n - stride).step_by(2 * stride) {
            let right = slots[i + stride];
            if right.0 > slots[i].0 {
                slots[i] = right;
            }
        }
        stride *= 2;
    }

    slots[0].1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(scores: &[f32]) -> Label {
        let mut slots = vec![(0.0, 0); scores.len()];
        load_slots(scores, 0, 1, &mut slots);
        argmax_tree(&mut slots)
    }

    #[test]
    fn test_argmax_picks_maximum() {
        let scores = vec![0.1, 0.7, 0.2, 0.9, 0.3];
        assert_eq!(argmax_strided(&scores, 0, 1, scores.len()), 3);
        assert_eq!(tree(&scores), 3);
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        let scores = vec![0.2, 0.9, 0.5, 0.9, 0.9, 0.1, 0.9];
        assert_eq!(argmax_strided(&scores, 0, 1, scores.len()), 1);
        assert_eq!(tree(&scores), 1);

        let flat = vec![0.5; 9];
        assert_eq!(argmax_strided(&flat, 0, 1, flat.len()), 0);
        assert_eq!(tree(&flat), 0);
    }

    #[test]
    fn test_tree_tie_across_subtrees() {
        // Pairing non-adjacent halves would let index 4 beat index 1 here.
        let scores = vec![0.0, 1.0, 0.0, 0.0, 1.0];
        assert_eq!(tree(&scores), 1);
    }

    #[test]
    fn test_strided_reads_one_column() {
        // 3 classes x 2 timesteps, class-major
        let data = vec![
            0.6, 0.0, // class 0
            0.0, 0.6, // class 1
            0.4, 0.4, // blank
        ];
        assert_eq!(argmax_strided(&data, 0, 2, 3), 0);
        assert_eq!(argmax_strided(&data, 1, 2, 3), 1);

        let mut slots = vec![(0.0, 0); 3];
        load_slots(&data, 1, 2, &mut slots);
        assert_eq!(argmax_tree(&mut slots), 1);
    }

    #[test]
    fn test_nan_ranks_lowest() {
        let scores = vec![1.0, 2.0, f32::NAN, 5.0];
        assert_eq!(argmax_strided(&scores, 0, 1, 4), 3);
        assert_eq!(tree(&scores), 3);

        let leading = vec![f32::NAN, -3.0];
        assert_eq!(argmax_strided(&leading, 0, 1, 2), 1);
        assert_eq!(tree(&leading), 1);

        let all_nan = vec![f32::NAN; 3];
        assert_eq!(argmax_strided(&all_nan, 0, 1, 3), 0);
        assert_eq!(tree(&all_nan), 0);
    }

    #[test]
    fn test_negative_infinity_column() {
        let scores = vec![f32::NEG_INFINITY, f32::NEG_INFINITY, -1.0];
        assert_eq!(argmax_strided(&scores, 0, 1, 3), 2);
        assert_eq!(tree(&scores), 2);
    }

    #[test]
    fn test_single_class() {
        assert_eq!(argmax_strided(&[0.3], 0, 1, 1), 0);
        assert_eq!(tree(&[0.3]), 0);
        assert_eq!(tree(&[]), 0);
    }
}
