//! 32-bit MurmurHash3 (x86_32 variant).
//!
//! Blocks are read as little-endian `u32`s, so the output matches the
//! reference implementation on every platform.

const C1: u32 = 0xCC9E_2D51;
const C2: u32 = 0x1B87_3593;

/// MurmurHash3 x86_32 with a fixed seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Murmur3x86_32 {
    seed: u32,
}

impl Murmur3x86_32 {
    /// Create a hasher with the given seed.
    pub const fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Hash `data`.
    #[must_use]
    pub fn hash_bytes(&self, data: &[u8]) -> u32 {
        let mut h1 = self.seed;

        let mut blocks = data.chunks_exact(4);
        for block in &mut blocks {
            let k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
            h1 = mix_h1(h1, mix_k1(k1));
        }

        let tail = blocks.remainder();
        if !tail.is_empty() {
            let mut k1 = 0u32;
            for (i, &b) in tail.iter().enumerate() {
                k1 ^= u32::from(b) << (8 * i);
            }
            h1 ^= mix_k1(k1);
        }

        fmix(h1, data.len() as u32)
    }
}

#[inline]
fn mix_k1(mut k1: u32) -> u32 {
    k1 = k1.wrapping_mul(C1);
    k1 = k1.rotate_left(15);
    k1.wrapping_mul(C2)
}

#[inline]
fn mix_h1(mut h1: u32, k1: u32) -> u32 {
    h1 ^= k1;
    h1 = h1.rotate_left(13);
    h1.wrapping_mul(5).wrapping_add(0xE654_6B64)
}

#[inline]
fn fmix(mut h1: u32, length: u32) -> u32 {
    h1 ^= length;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85EB_CA6B);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xC2B2_AE35);
    h1 ^ (h1 >> 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(Murmur3x86_32::new(0).hash_bytes(b""), 0);
        assert_eq!(Murmur3x86_32::new(1).hash_bytes(b""), 0x514E_28B7);
        assert_eq!(Murmur3x86_32::new(0xFFFF_FFFF).hash_bytes(b""), 0x81F1_6F39);
    }

    #[test]
    fn test_reference_vectors() {
        assert_eq!(Murmur3x86_32::new(0).hash_bytes(&[0, 0, 0, 0]), 0x2362_F9DE);
        assert_eq!(
            Murmur3x86_32::new(0x9747_B28C).hash_bytes(b"aaaa"),
            0x5A97_808A
        );
        assert_eq!(
            Murmur3x86_32::new(0x9747_B28C).hash_bytes(b"Hello, world!"),
            0x2488_4CBA
        );
        assert_eq!(
            Murmur3x86_32::new(0).hash_bytes(b"The quick brown fox jumps over the lazy dog"),
            0x2E4F_F723
        );
    }

    #[test]
    fn test_seed_changes_output() {
        let data = b"AAAAAAAA";
        assert_ne!(
            Murmur3x86_32::new(0).hash_bytes(data),
            Murmur3x86_32::new(42).hash_bytes(data)
        );
    }
}
