//! Batch decoder orchestration.

use tracing::{debug, info, warn};

use super::mapper::{decode_to_text, Alphabet};
use crate::backend::{ComputeBackend, CpuBackend, Kernel, LaunchShape};
use crate::config::{DecoderConfig, Strategy};
use crate::error::{DecodeError, Result};
use crate::metrics::{self, DecodeTimer};
use crate::types::{DecoderDims, Label, LabelBatch, ScoreTensor};

/// Kernels issued, in order, for one call under `strategy`.
fn schedule(strategy: Strategy) -> &'static [Kernel] {
    match strategy {
        Strategy::Fused => &[Kernel::BestPathAndCollapse],
        Strategy::TwoPhase => &[Kernel::BestPath, Kernel::CollapsePath],
    }
}

/// Decodes fixed-size batches of CTC score matrices into label rows.
///
/// Sizes and strategy are fixed at construction, where the backend allocates
/// every buffer it will need. Each [`compute`](Self::compute) call stages the
/// scores, runs the strategy's kernels and reads the collapsed labels back
/// into a buffer owned by the decoder.
///
/// # Example
///
/// ```
/// use ctc_bestpath::{Alphabet, BatchDecoder, DecoderConfig, ScoreTensor, Strategy};
///
/// let config = DecoderConfig::new(1, 2, 2).with_strategy(Strategy::Fused);
/// let mut decoder = BatchDecoder::new(config)?;
///
/// // classes a, b, blank over two timesteps
/// let scores = [0.6, 0.0, 0.0, 0.6, 0.4, 0.4];
/// let tensor = ScoreTensor::new(&scores, [1, 3, 2])?;
///
/// let labels = decoder.compute(&tensor)?;
/// assert_eq!(labels.row(0), Some(&[0, 1][..]));
///
/// let alphabet = Alphabet::new("ab")?;
/// assert_eq!(ctc_bestpath::decode_to_text(&labels, &alphabet)?, vec!["ab"]);
/// # Ok::<(), ctc_bestpath::DecodeError>(())
/// ```
pub struct BatchDecoder<B: ComputeBackend = CpuBackend> {
    config: DecoderConfig,
    dims: DecoderDims,
    backend: B,
    results: Vec<Label>,
}

impl BatchDecoder<CpuBackend> {
    /// Create a decoder on the CPU backend.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        let backend = CpuBackend::from_config(&config);
        Self::with_backend(config, backend)
    }
}

impl<B: ComputeBackend> BatchDecoder<B> {
    /// Create a decoder on a caller-supplied backend.
    pub fn with_backend(config: DecoderConfig, mut backend: B) -> Result<Self> {
        config.validate()?;
        let dims = config.dims();
        backend.allocate(dims)?;

        info!(
            "Created {} decoder on {} backend: batch_size={}, max_t={}, max_c={}",
            config.strategy,
            backend.name(),
            dims.batch_size,
            dims.max_t,
            dims.max_c
        );

        Ok(Self {
            results: vec![dims.blank(); dims.label_len()],
            config,
            dims,
            backend,
        })
    }

    /// Decode one batch.
    ///
    /// `scores` must have shape `(batch_size, max_c + 1, max_t)`. The returned
    /// rows are blank-terminated and stay valid until the next call.
    pub fn compute(&mut self, scores: &ScoreTensor<'_>) -> Result<LabelBatch<'_>> {
        let strategy = self.config.strategy;
        metrics::record_decode_call(strategy);
        let timer = DecodeTimer::start(strategy);

        if let Err(e) = self.run(scores) {
            metrics::record_decode_failure(strategy, e.kind());
            warn!("Decode failed: {}", e);
            return Err(e);
        }
        timer.finish();

        let labels = LabelBatch::new(&self.results, self.dims.max_t, self.dims.blank())?;
        let emitted: usize = (0..labels.batch_size())
            .filter_map(|b| labels.labeling(b))
            .map(<[Label]>::len)
            .sum();
        metrics::record_decoded_labels(emitted);

        Ok(labels)
    }

    fn run(&mut self, scores: &ScoreTensor<'_>) -> Result<()> {
        scores.check_dims(&self.dims)?;
        debug!(
            "Decoding batch of {} with {} strategy",
            self.dims.batch_size, self.config.strategy
        );

        self.backend.write_scores(scores.data())?;
        for &kernel in schedule(self.config.strategy) {
            self.backend
                .dispatch(kernel, LaunchShape::for_kernel(kernel, &self.dims))?;
        }
        self.backend.read_labels(&mut self.results)
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn dims(&self) -> DecoderDims {
        self.dims
    }

    pub fn strategy(&self) -> Strategy {
        self.config.strategy
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Decode `scores` and map every row to text through `alphabet`.
///
/// The alphabet must have exactly `max_c` classes.
pub fn ctc_best_path<B: ComputeBackend>(
    scores: &ScoreTensor<'_>,
    alphabet: &Alphabet,
    decoder: &mut BatchDecoder<B>,
) -> Result<Vec<String>> {
    let max_c = decoder.dims().max_c;
    if alphabet.len() != max_c {
        return Err(DecodeError::InvalidInput(format!(
            "alphabet has {} classes, decoder expects {}",
            alphabet.len(),
            max_c
        )));
    }

    let labels = decoder.compute(scores)?;
    decode_to_text(&labels, alphabet)
}
