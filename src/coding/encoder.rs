//! RLNC encoder
//!
//! Splits a buffer into `symbol_count` source symbols of `symbol_size` bytes
//! and produces linear combinations of them on demand.

use super::{CodingError, Gf256, Symbol};
use rand::Rng;
use std::sync::Arc;

/// Encoder over one block of source data
pub struct Encoder {
    field: Arc<Gf256>,
    symbol_count: usize,
    symbol_size: usize,
    /// Zero-padded source block, `symbol_count * symbol_size` bytes
    block: Vec<u8>,
}

impl Encoder {
    /// Create a new encoder. `data` is zero-padded to the full block size.
    pub fn new(
        field: Arc<Gf256>,
        symbol_count: usize,
        symbol_size: usize,
        data: &[u8],
    ) -> Result<Self, CodingError> {
        if symbol_count == 0 {
            return Err(CodingError::InvalidParameters(
                "symbol_count must be at least 1".into(),
            ));
        }

        let block_size = symbol_count * symbol_size;
        if data.len() > block_size {
            return Err(CodingError::InvalidParameters(format!(
                "{} bytes do not fit in {} symbols of {} bytes",
                data.len(),
                symbol_count,
                symbol_size
            )));
        }

        let mut block = Vec::with_capacity(block_size);
        block.extend_from_slice(data);
        block.resize(block_size, 0);

        Ok(Self {
            field,
            symbol_count,
            symbol_size,
            block,
        })
    }

    /// Compute the payload for a coefficient vector
    pub fn produce_symbol(&self, coefficients: &[u8]) -> Result<Vec<u8>, CodingError> {
        if coefficients.len() != self.symbol_count {
            return Err(CodingError::CoefficientLength {
                expected: self.symbol_count,
                actual: coefficients.len(),
            });
        }

        Ok(self.compute(coefficients))
    }

    /// Draw a random coefficient vector and encode it
    pub fn produce_random_symbol<R: Rng + ?Sized>(&self, rng: &mut R) -> Symbol {
        let mut coefficients = vec![0u8; self.symbol_count];
        rng.fill_bytes(&mut coefficients);

        let payload = self.compute(&coefficients);
        Symbol::new(coefficients, payload)
    }

    fn compute(&self, coefficients: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8; self.symbol_size];
        if self.symbol_size > 0 {
            for (source, coeff) in self.block.chunks_exact(self.symbol_size).zip(coefficients) {
                self.field.mul_add_slice(&mut payload, source, *coeff);
            }
        }
        payload
    }

    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }

    pub fn symbol_size(&self) -> usize {
        self.symbol_size
    }

    /// Size of the padded block
    pub fn block_size(&self) -> usize {
        self.block.len()
    }
}
