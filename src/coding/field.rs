//! GF(2^8) arithmetic
//!
//! Log/exp table implementation over the polynomial x^8 + x^4 + x^3 + x^2 + 1.
//! Every encoder, decoder and recoder in a deployment must share this field.

/// Primitive polynomial (0x11d)
const PRIMITIVE_POLY: u16 = 0x11d;

/// Lookup tables for GF(2^8)
///
/// Build once with [`Gf256::new`] and pass it around behind an `Arc`;
/// the tables are never mutated after construction.
#[derive(Clone)]
pub struct Gf256 {
    exp: [u8; 512],
    log: [u8; 256],
}

impl Gf256 {
    /// Build exponent and log tables
    pub fn new() -> Self {
        let mut exp = [0u8; 512];
        let mut log = [0u8; 256];

        let mut x: u16 = 1;
        for i in 0..255 {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= PRIMITIVE_POLY;
            }
        }

        // Doubled so that log[a] + log[b] never needs a modulo
        for i in 255..512 {
            exp[i] = exp[i - 255];
        }

        Self { exp, log }
    }

    /// Addition (and subtraction) is XOR
    #[inline]
    pub fn add(a: u8, b: u8) -> u8 {
        a ^ b
    }

    /// Multiplication
    #[inline]
    pub fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            return 0;
        }
        let la = self.log[a as usize] as usize;
        let lb = self.log[b as usize] as usize;
        self.exp[la + lb]
    }

    /// Division. `b` must be non-zero.
    #[inline]
    pub fn div(&self, a: u8, b: u8) -> u8 {
        debug_assert!(b != 0, "division by zero in GF(2^8)");
        if a == 0 {
            return 0;
        }
        let la = self.log[a as usize] as usize;
        let lb = self.log[b as usize] as usize;
        self.exp[la + 255 - lb]
    }

    /// Multiplicative inverse. `a` must be non-zero.
    #[inline]
    pub fn inv(&self, a: u8) -> u8 {
        self.div(1, a)
    }

    /// `dst[i] ^= c * src[i]`
    pub fn mul_add_slice(&self, dst: &mut [u8], src: &[u8], c: u8) {
        debug_assert_eq!(dst.len(), src.len());
        match c {
            0 => {}
            1 => {
                for (d, s) in dst.iter_mut().zip(src) {
                    *d ^= *s;
                }
            }
            _ => {
                let lc = self.log[c as usize] as usize;
                for (d, s) in dst.iter_mut().zip(src) {
                    if *s != 0 {
                        *d ^= self.exp[lc + self.log[*s as usize] as usize];
                    }
                }
            }
        }
    }

    /// `buf[i] = c * buf[i]`
    pub fn scale_slice(&self, buf: &mut [u8], c: u8) {
        match c {
            0 => buf.fill(0),
            1 => {}
            _ => {
                let lc = self.log[c as usize] as usize;
                for b in buf.iter_mut() {
                    if *b != 0 {
                        *b = self.exp[lc + self.log[*b as usize] as usize];
                    }
                }
            }
        }
    }
}

impl Default for Gf256 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Gf256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gf256(poly={:#x})", PRIMITIVE_POLY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Carry-less multiply reduced by the same polynomial
    fn slow_mul(mut a: u8, mut b: u8) -> u8 {
        let mut p = 0u8;
        while b != 0 {
            if b & 1 != 0 {
                p ^= a;
            }
            let carry = a & 0x80 != 0;
            a <<= 1;
            if carry {
                a ^= (PRIMITIVE_POLY & 0xff) as u8;
            }
            b >>= 1;
        }
        p
    }

    #[test]
    fn test_mul_matches_bitwise() {
        let gf = Gf256::new();
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                assert_eq!(gf.mul(a, b), slow_mul(a, b), "{} * {}", a, b);
            }
        }
    }

    #[test]
    fn test_inverse() {
        let gf = Gf256::new();
        for a in 1..=255u8 {
            assert_eq!(gf.mul(a, gf.inv(a)), 1);
            assert_eq!(gf.div(gf.mul(a, 7), 7), a);
        }
    }

    #[test]
    fn test_add_is_xor() {
        assert_eq!(Gf256::add(0b1010, 0b0110), 0b1100);
        assert_eq!(Gf256::add(200, 200), 0);
    }

    #[test]
    fn test_slice_kernels() {
        let gf = Gf256::new();
        let src = [1u8, 2, 3, 0, 255];
        let mut dst = [9u8, 8, 7, 6, 5];
        let expected: Vec<u8> = dst
            .iter()
            .zip(src.iter())
            .map(|(d, s)| d ^ gf.mul(29, *s))
            .collect();

        gf.mul_add_slice(&mut dst, &src, 29);
        assert_eq!(dst.to_vec(), expected);

        let mut buf = src;
        gf.scale_slice(&mut buf, 3);
        let scaled: Vec<u8> = src.iter().map(|s| gf.mul(*s, 3)).collect();
        assert_eq!(buf.to_vec(), scaled);
    }
}
