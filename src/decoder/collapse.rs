//! Best-path collapse.
//!
//! Merges runs of equal labels in timestep order and pads the rest of the row
//! with the blank. Blanks are not dropped here: a blank is emitted once per
//! run like any other label, and readers stop at the first one.

use crate::types::{Label, NO_LABEL};

/// Collapse `raw` into `out`, returning the number of emitted labels.
///
/// `out` must be at least as long as `raw`; every slot past the emitted
/// labels is set to `blank`.
pub fn collapse_path(raw: &[Label], blank: Label, out: &mut [Label]) -> usize {
    debug_assert!(out.len() >= raw.len());

    let mut last = NO_LABEL;
    let mut len = 0;

    for &cur in raw {
        if cur != last {
            out[len] = cur;
            len += 1;
            last = cur;
        }
    }

    out[len..].fill(blank);
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collapse(raw: &[Label], blank: Label) -> (Vec<Label>, usize) {
        let mut out = vec![-7; raw.len()];
        let len = collapse_path(raw, blank, &mut out);
        (out, len)
    }

    #[test]
    fn test_merges_repeats() {
        assert_eq!(collapse(&[0, 0], 2), (vec![0, 2], 1));
        assert_eq!(collapse(&[0, 1], 2), (vec![0, 1], 2));
        assert_eq!(collapse(&[1, 1, 0, 0, 0, 1], 2), (vec![1, 0, 1, 2, 2, 2], 3));
    }

    #[test]
    fn test_blank_runs_emit_once() {
        assert_eq!(collapse(&[2, 2], 2), (vec![2, 2], 1));
        // Blank separates two occurrences of the same label.
        assert_eq!(collapse(&[0, 2, 0, 0, 2, 2], 2), (vec![0, 2, 0, 2, 2, 2], 4));
    }

    #[test]
    fn test_no_adjacent_duplicates_in_emitted_prefix() {
        let raw = [3, 3, 1, 4, 4, 4, 1, 5, 9, 9, 2, 6, 5, 5];
        let (out, len) = collapse(&raw, 10);
        assert!(len <= raw.len());
        assert!(out[..len].windows(2).all(|w| w[0] != w[1]));
        assert_eq!(&out[..len], &[3, 1, 4, 1, 5, 9, 2, 6, 5]);
        assert!(out[len..].iter().all(|&l| l == 10));
    }

    #[test]
    fn test_empty_and_longer_output() {
        let mut out = vec![0; 3];
        assert_eq!(collapse_path(&[], 1, &mut out), 0);
        assert_eq!(out, vec![1, 1, 1]);
    }
}
