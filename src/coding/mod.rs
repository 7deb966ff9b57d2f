//! Coding Module - Random linear network coding over GF(2^8)
//!
//! Encoder, progressive decoder and recoder. The field tables are shared
//! explicitly through `Arc<Gf256>`.

mod decoder;
mod encoder;
mod field;
mod recoder;
mod symbol;

pub use decoder::{coefficient_rank, Decoder};
pub use encoder::Encoder;
pub use field::Gf256;
pub use recoder::Recoder;
pub use symbol::Symbol;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodingError {
    #[error("Invalid coding parameters: {0}")]
    InvalidParameters(String),

    #[error("Coefficient vector has length {actual}, expected {expected}")]
    CoefficientLength { expected: usize, actual: usize },

    #[error("Payload has length {actual}, expected {expected}")]
    PayloadLength { expected: usize, actual: usize },

    #[error("Malformed symbol blob: {actual} bytes, expected {expected}")]
    MalformedSymbol { expected: usize, actual: usize },

    #[error("Decoder incomplete: rank {rank} of {needed}")]
    Incomplete { rank: usize, needed: usize },

    #[error("Recoder has no input symbols")]
    NoInputs,

    #[error("Recoder already holds {0} input symbols")]
    RecoderFull(usize),
}
