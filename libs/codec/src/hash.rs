//! Integrity hashing for message payloads
//!
//! 64-bit FNV-1a over the encoded payload bytes. Non-cryptographic: it detects
//! corruption in transit, not tampering.

use const_fnv1a_hash::fnv1a_hash_64;

/// Hash of an encoded payload region
#[inline]
pub fn integrity_hash(payload: &[u8]) -> u64 {
    fnv1a_hash_64(payload, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        // FNV-1a 64 offset basis and the published vector for "a"
        assert_eq!(integrity_hash(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(integrity_hash(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_single_byte_flip_changes_hash() {
        let payload = [0x10u8, 0x20, 0x30, 0x40];
        let base = integrity_hash(&payload);
        for i in 0..payload.len() {
            let mut corrupted = payload;
            corrupted[i] ^= 0x01;
            assert_ne!(integrity_hash(&corrupted), base, "flip at byte {i}");
        }
    }
}
