//! RLNC recoder
//!
//! Produces fresh coded symbols from already-coded symbols without decoding.
//! Output coefficients stay relative to the original source symbols, so
//! recoded output can be recoded again or fed straight to a [`Decoder`].
//!
//! [`Decoder`]: super::Decoder

use super::{CodingError, Gf256, Symbol};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

/// Recoder over a bounded set of input symbols
pub struct Recoder {
    field: Arc<Gf256>,
    symbol_count: usize,
    symbol_size: usize,
    capacity: usize,
    inputs: Vec<Symbol>,
    rng: ChaCha20Rng,
}

impl Recoder {
    /// Create a recoder accepting up to `capacity` input symbols
    pub fn new(
        field: Arc<Gf256>,
        symbol_count: usize,
        symbol_size: usize,
        capacity: usize,
    ) -> Self {
        Self::with_rng(
            field,
            symbol_count,
            symbol_size,
            capacity,
            ChaCha20Rng::from_entropy(),
        )
    }

    /// Create a recoder with a caller-provided generator (deterministic tests)
    pub fn with_rng(
        field: Arc<Gf256>,
        symbol_count: usize,
        symbol_size: usize,
        capacity: usize,
        rng: ChaCha20Rng,
    ) -> Self {
        Self {
            field,
            symbol_count,
            symbol_size,
            capacity,
            inputs: Vec::with_capacity(capacity),
            rng,
        }
    }

    /// Add an existing coded symbol to the input pool
    pub fn consume_symbol(&mut self, coefficients: &[u8], payload: &[u8]) -> Result<(), CodingError> {
        if self.inputs.len() >= self.capacity {
            return Err(CodingError::RecoderFull(self.capacity));
        }
        if coefficients.len() != self.symbol_count {
            return Err(CodingError::CoefficientLength {
                expected: self.symbol_count,
                actual: coefficients.len(),
            });
        }
        if payload.len() != self.symbol_size {
            return Err(CodingError::PayloadLength {
                expected: self.symbol_size,
                actual: payload.len(),
            });
        }

        self.inputs
            .push(Symbol::new(coefficients.to_vec(), payload.to_vec()));
        Ok(())
    }

    /// Number of inputs consumed so far
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Draw random weights over the inputs and emit their combination
    pub fn produce_symbol(&mut self) -> Result<Symbol, CodingError> {
        if self.inputs.is_empty() {
            return Err(CodingError::NoInputs);
        }

        let mut weights = vec![0u8; self.inputs.len()];
        self.rng.fill_bytes(&mut weights);

        let mut coefficients = vec![0u8; self.symbol_count];
        let mut payload = vec![0u8; self.symbol_size];
        for (input, weight) in self.inputs.iter().zip(&weights) {
            self.field
                .mul_add_slice(&mut coefficients, &input.coefficients, *weight);
            self.field.mul_add_slice(&mut payload, &input.payload, *weight);
        }

        Ok(Symbol::new(coefficients, payload))
    }

    /// Produce `count` symbols
    pub fn produce_symbols(&mut self, count: usize) -> Result<Vec<Symbol>, CodingError> {
        (0..count).map(|_| self.produce_symbol()).collect()
    }
}
