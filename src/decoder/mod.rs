//! Best-path decoding: reducers, collapse, batch orchestration and text
//! mapping.

pub mod argmax;
mod batch;
pub mod collapse;
mod mapper;

pub use batch::{ctc_best_path, BatchDecoder};
pub use mapper::{decode_to_text, Alphabet};
