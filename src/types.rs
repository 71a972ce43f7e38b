//! Tensor and label views shared by the decoder and its backends.
//!
//! Scores are laid out row-major as `(batch, class, time)`: for batch element
//! `b`, class `c` and timestep `t` the flat index is
//! `b * (max_c + 1) * max_t + c * max_t + t`. The class axis includes the
//! blank row at index `max_c`.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};

/// Class label as produced by the decoder. The blank is `max_c`.
pub type Label = i32;

/// Sentinel that differs from every valid label.
pub const NO_LABEL: Label = -1;

/// Fixed sizes of a decoder instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecoderDims {
    /// Batch elements per call.
    pub batch_size: usize,
    /// Timesteps per element.
    pub max_t: usize,
    /// Alphabet classes, excluding the blank.
    pub max_c: usize,
}

impl DecoderDims {
    /// Create a new set of dimensions.
    pub fn new(batch_size: usize, max_t: usize, max_c: usize) -> Self {
        Self {
            batch_size,
            max_t,
            max_c,
        }
    }

    /// The blank label.
    pub fn blank(&self) -> Label {
        self.max_c as Label
    }

    /// Rows on the class axis, blank included.
    pub fn num_classes(&self) -> usize {
        self.max_c + 1
    }

    /// Scores per batch element.
    pub fn element_stride(&self) -> usize {
        self.num_classes() * self.max_t
    }

    /// Total scores in one input tensor.
    pub fn score_len(&self) -> usize {
        self.batch_size * self.element_stride()
    }

    /// Total labels in one output buffer.
    pub fn label_len(&self) -> usize {
        self.batch_size * self.max_t
    }

    /// Expected tensor shape `[batch, classes, time]`.
    pub fn score_shape(&self) -> [usize; 3] {
        [self.batch_size, self.num_classes(), self.max_t]
    }
}

/// Borrowed score tensor of shape `[batch, classes, time]`.
#[derive(Debug, Clone, Copy)]
pub struct ScoreTensor<'a> {
    data: &'a [f32],
    shape: [usize; 3],
}

impl<'a> ScoreTensor<'a> {
    /// Create a view over `data` with the given shape.
    ///
    /// Fails if the data length is not the product of the dimensions.
    pub fn new(data: &'a [f32], shape: [usize; 3]) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| DecodeError::InvalidInput(format!("shape {:?} overflows", shape)))?;

        if data.len() != expected {
            return Err(DecodeError::InvalidInput(format!(
                "score data has {} values but shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }

        Ok(Self { data, shape })
    }

    /// Raw data slice.
    pub fn data(&self) -> &'a [f32] {
        self.data
    }

    /// Tensor shape `[batch, classes, time]`.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn batch_size(&self) -> usize {
        self.shape[0]
    }

    pub fn num_classes(&self) -> usize {
        self.shape[1]
    }

    pub fn time_steps(&self) -> usize {
        self.shape[2]
    }

    /// Score of class `c` at timestep `t` of element `b`, if in range.
    pub fn score(&self, b: usize, c: usize, t: usize) -> Option<f32> {
        let [batch, classes, steps] = self.shape;
        if b >= batch || c >= classes || t >= steps {
            return None;
        }
        self.data.get((b * classes + c) * steps + t).copied()
    }

    /// Scores of one batch element.
    pub fn element(&self, b: usize) -> Option<&'a [f32]> {
        let stride = self.shape[1] * self.shape[2];
        let start = b.checked_mul(stride)?;
        self.data.get(start..start.checked_add(stride)?)
    }

    /// Check that this tensor matches the decoder dimensions.
    pub fn check_dims(&self, dims: &DecoderDims) -> Result<()> {
        let expected = dims.score_shape();
        if self.shape != expected {
            return Err(DecodeError::ShapeMismatch {
                expected,
                actual: self.shape,
            });
        }
        Ok(())
    }
}

/// Blank-terminated label rows of shape `[batch, max_t]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelBatch<'a> {
    labels: &'a [Label],
    max_t: usize,
    blank: Label,
}

impl<'a> LabelBatch<'a> {
    /// Wrap a flat label buffer whose rows are `max_t` long.
    pub fn new(labels: &'a [Label], max_t: usize, blank: Label) -> Result<Self> {
        if max_t == 0 || labels.len() % max_t != 0 {
            return Err(DecodeError::InvalidInput(format!(
                "{} labels do not split into rows of {}",
                labels.len(),
                max_t
            )));
        }
        Ok(Self {
            labels,
            max_t,
            blank,
        })
    }

    /// Number of rows.
    pub fn batch_size(&self) -> usize {
        self.labels.len() / self.max_t
    }

    pub fn max_t(&self) -> usize {
        self.max_t
    }

    pub fn blank(&self) -> Label {
        self.blank
    }

    /// Row `b`, blank-terminated and blank-padded.
    pub fn row(&self, b: usize) -> Option<&'a [Label]> {
        let start = b.checked_mul(self.max_t)?;
        self.labels.get(start..start.checked_add(self.max_t)?)
    }

    /// Iterate over all rows in batch order.
    pub fn rows(&self) -> impl Iterator<Item = &'a [Label]> + 'a {
        self.labels.chunks(self.max_t)
    }

    /// Labels of row `b` before the first blank.
    pub fn labeling(&self, b: usize) -> Option<&'a [Label]> {
        let blank = self.blank;
        self.row(b).map(|row| {
            let end = row.iter().position(|&l| l == blank).unwrap_or(row.len());
            &row[..end]
        })
    }

    /// Flat label buffer.
    pub fn as_slice(&self) -> &'a [Label] {
        self.labels
    }

    /// Copy into owned rows.
    pub fn to_vec(&self) -> Vec<Vec<Label>> {
        self.rows().map(<[Label]>::to_vec).collect()
    }
}
