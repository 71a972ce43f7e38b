//! The `ctc_bestpath` library.
//!
//! Batched best-path decoding of CTC score matrices: pick the most likely
//! class per timestep, merge repeated labels, and read the result up to the
//! first blank. Work is expressed as data-parallel kernels behind the
//! [`ComputeBackend`] trait, with a multi-threaded CPU backend built in.
//!
//! ```
//! use ctc_bestpath::{ctc_best_path, Alphabet, BatchDecoder, DecoderConfig, ScoreTensor};
//!
//! let mut decoder = BatchDecoder::new(DecoderConfig::new(1, 2, 2))?;
//! let alphabet = Alphabet::new("ab")?;
//!
//! // t0 and t1 both pick "a", which collapses to a single label.
//! let scores = [0.6, 0.6, 0.0, 0.0, 0.4, 0.4];
//! let tensor = ScoreTensor::new(&scores, [1, 3, 2])?;
//!
//! assert_eq!(ctc_best_path(&tensor, &alphabet, &mut decoder)?, vec!["a"]);
//! # Ok::<(), ctc_bestpath::DecodeError>(())
//! ```

pub mod backend;
pub mod config;
pub mod decoder;
pub mod error;
pub mod metrics;
pub mod types;

pub use backend::{ComputeBackend, CpuBackend, Kernel, LaunchShape};
pub use config::{DecoderConfig, Strategy};
pub use decoder::{ctc_best_path, decode_to_text, Alphabet, BatchDecoder};
pub use error::{DecodeError, Result};
pub use types::{DecoderDims, Label, LabelBatch, ScoreTensor};
