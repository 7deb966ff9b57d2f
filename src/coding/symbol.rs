//! Coded symbols and their wire blob form

use super::CodingError;
use serde::{Deserialize, Serialize};

/// A coded symbol: a coefficient vector over the original symbols plus the
/// payload that combination produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// One GF(2^8) weight per original symbol
    pub coefficients: Vec<u8>,

    /// Weighted sum of the original symbols
    pub payload: Vec<u8>,
}

impl Symbol {
    pub fn new(coefficients: Vec<u8>, payload: Vec<u8>) -> Self {
        Self {
            coefficients,
            payload,
        }
    }

    /// Serialize as `coefficients ‖ payload`
    pub fn to_blob(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.coefficients.len() + self.payload.len());
        blob.extend_from_slice(&self.coefficients);
        blob.extend_from_slice(&self.payload);
        blob
    }

    /// Split a blob back into coefficients and payload.
    ///
    /// The blob carries no header, so the caller supplies both dimensions
    /// from the file's storage details.
    pub fn from_blob(
        blob: &[u8],
        symbol_count: usize,
        symbol_size: usize,
    ) -> Result<Self, CodingError> {
        if blob.len() != symbol_count + symbol_size {
            return Err(CodingError::MalformedSymbol {
                expected: symbol_count + symbol_size,
                actual: blob.len(),
            });
        }

        let (coefficients, payload) = blob.split_at(symbol_count);
        Ok(Self::new(coefficients.to_vec(), payload.to_vec()))
    }

    /// True if every coefficient is zero (carries no information)
    pub fn is_zero(&self) -> bool {
        self.coefficients.iter().all(|c| *c == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_layout() {
        let symbol = Symbol::new(vec![1, 2, 3], vec![10, 20]);
        assert_eq!(symbol.to_blob(), vec![1, 2, 3, 10, 20]);

        let parsed = Symbol::from_blob(&[1, 2, 3, 10, 20], 3, 2).unwrap();
        assert_eq!(parsed, symbol);
    }

    #[test]
    fn test_blob_wrong_length() {
        let result = Symbol::from_blob(&[1, 2, 3, 10], 3, 2);
        assert!(matches!(
            result,
            Err(CodingError::MalformedSymbol {
                expected: 5,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_zero_symbol() {
        assert!(Symbol::new(vec![0, 0], vec![5]).is_zero());
        assert!(!Symbol::new(vec![0, 1], vec![5]).is_zero());
    }
}
