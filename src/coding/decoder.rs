//! Progressive RLNC decoder
//!
//! Keeps the received coefficient matrix in reduced row-echelon form as
//! symbols arrive, so the elimination work is spread over every
//! `consume_symbol` call instead of being paid once at the end.

use super::{CodingError, Gf256};
use std::sync::Arc;

/// One reduced row, stored under its pivot column
struct Row {
    coefficients: Vec<u8>,
    payload: Vec<u8>,
}

/// Decoder for one block
pub struct Decoder {
    field: Arc<Gf256>,
    symbol_count: usize,
    symbol_size: usize,
    /// `rows[i]` has a 1 at column `i` and 0 at every other pivot column
    rows: Vec<Option<Row>>,
    rank: usize,
}

impl Decoder {
    /// Create a new decoder
    pub fn new(field: Arc<Gf256>, symbol_count: usize, symbol_size: usize) -> Self {
        let mut rows = Vec::with_capacity(symbol_count);
        rows.resize_with(symbol_count, || None);

        Self {
            field,
            symbol_count,
            symbol_size,
            rows,
            rank: 0,
        }
    }

    /// Consume one coded symbol.
    ///
    /// Returns `Ok(true)` if the symbol increased the rank, `Ok(false)` if it
    /// was linearly dependent on what was already received.
    pub fn consume_symbol(
        &mut self,
        coefficients: &[u8],
        payload: &[u8],
    ) -> Result<bool, CodingError> {
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
        if self.is_complete() {
            return Ok(false);
        }

        let mut coeffs = coefficients.to_vec();
        let mut data = payload.to_vec();

        // Forward: cancel every column that already has a pivot
        for (col, slot) in self.rows.iter().enumerate() {
            let factor = coeffs[col];
            if factor == 0 {
                continue;
            }
            if let Some(row) = slot {
                self.field.mul_add_slice(&mut coeffs, &row.coefficients, factor);
                self.field.mul_add_slice(&mut data, &row.payload, factor);
            }
        }

        let pivot = match coeffs.iter().position(|c| *c != 0) {
            Some(pivot) => pivot,
            None => {
                tracing::trace!("Discarding non-innovative symbol at rank {}", self.rank);
                return Ok(false);
            }
        };

        let scale = self.field.inv(coeffs[pivot]);
        self.field.scale_slice(&mut coeffs, scale);
        self.field.scale_slice(&mut data, scale);

        // Backward: clear the new pivot column from the existing rows
        for row in self.rows.iter_mut().flatten() {
            let factor = row.coefficients[pivot];
            if factor != 0 {
                self.field.mul_add_slice(&mut row.coefficients, &coeffs, factor);
                self.field.mul_add_slice(&mut row.payload, &data, factor);
            }
        }

        self.rows[pivot] = Some(Row {
            coefficients: coeffs,
            payload: data,
        });
        self.rank += 1;

        Ok(true)
    }

    /// Number of linearly independent symbols received
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// True once rank equals `symbol_count`
    pub fn is_complete(&self) -> bool {
        self.rank == self.symbol_count
    }

    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }

    pub fn symbol_size(&self) -> usize {
        self.symbol_size
    }

    /// The decoded, zero-padded block.
    ///
    /// Fails with [`CodingError::Incomplete`] until full rank is reached.
    pub fn data(&self) -> Result<Vec<u8>, CodingError> {
        if !self.is_complete() {
            return Err(CodingError::Incomplete {
                rank: self.rank,
                needed: self.symbol_count,
            });
        }

        let mut block = Vec::with_capacity(self.symbol_count * self.symbol_size);
        for row in self.rows.iter().flatten() {
            block.extend_from_slice(&row.payload);
        }
        Ok(block)
    }
}

/// Rank of a set of coefficient vectors
pub fn coefficient_rank<'a, I>(field: Arc<Gf256>, symbol_count: usize, vectors: I) -> usize
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut decoder = Decoder::new(field, symbol_count, 0);
    for coefficients in vectors {
        if decoder.consume_symbol(coefficients, &[]).is_err() {
            continue;
        }
        if decoder.is_complete() {
            break;
        }
    }
    decoder.rank()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Encoder;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn field() -> Arc<Gf256> {
        Arc::new(Gf256::new())
    }

    #[test]
    fn test_decode_random_symbols() {
        let gf = field();
        let data: Vec<u8> = (0..1000).map(|i| (i * 7 % 251) as u8).collect();
        let encoder = Encoder::new(gf.clone(), 8, 125, &data).unwrap();
        let mut decoder = Decoder::new(gf, 8, 125);
        let mut rng = ChaCha20Rng::seed_from_u64(1);

        while !decoder.is_complete() {
            let symbol = encoder.produce_random_symbol(&mut rng);
            decoder
                .consume_symbol(&symbol.coefficients, &symbol.payload)
                .unwrap();
        }

        assert_eq!(decoder.rank(), 8);
        assert_eq!(decoder.data().unwrap(), data);
    }

    #[test]
    fn test_dependent_symbol_does_not_raise_rank() {
        let gf = field();
        let encoder = Encoder::new(gf.clone(), 3, 4, b"hello world!").unwrap();
        let mut decoder = Decoder::new(gf.clone(), 3, 4);

        let a = [1u8, 2, 3];
        let b = [4u8, 5, 6];
        // 2a + 3b lies in span(a, b)
        let c: Vec<u8> = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| gf.mul(2, *x) ^ gf.mul(3, *y))
            .collect();

        assert!(decoder.consume_symbol(&a, &encoder.produce_symbol(&a).unwrap()).unwrap());
        assert!(decoder.consume_symbol(&b, &encoder.produce_symbol(&b).unwrap()).unwrap());
        assert!(!decoder.consume_symbol(&c, &encoder.produce_symbol(&c).unwrap()).unwrap());
        assert_eq!(decoder.rank(), 2);
        assert!(!decoder.is_complete());
    }

    #[test]
    fn test_incomplete_is_an_error() {
        let mut decoder = Decoder::new(field(), 2, 2);
        decoder.consume_symbol(&[1, 1], &[0, 0]).unwrap();

        match decoder.data() {
            Err(CodingError::Incomplete { rank, needed }) => {
                assert_eq!(rank, 1);
                assert_eq!(needed, 2);
            }
            other => panic!("expected Incomplete, got {:?}", other.map(|d| d.len())),
        }
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        let mut decoder = Decoder::new(field(), 2, 2);
        assert!(decoder.consume_symbol(&[1], &[0, 0]).is_err());
        assert!(decoder.consume_symbol(&[1, 0], &[0]).is_err());
        assert_eq!(decoder.rank(), 0);
    }

    #[test]
    fn test_coefficient_rank() {
        let vectors: Vec<Vec<u8>> = vec![vec![1, 0, 0], vec![0, 1, 0], vec![1, 1, 0]];
        let rank = coefficient_rank(field(), 3, vectors.iter().map(|v| v.as_slice()));
        assert_eq!(rank, 2);
    }
}
