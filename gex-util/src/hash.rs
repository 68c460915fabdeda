//! Non-cryptographic hashing.

const FNV1A_64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV1A_64_PRIME:  u64 = 0x0000_0100_0000_01b3;

/// Compute the 64-bit FNV-1a hash of `bytes`.
pub fn fnv1a_64(bytes: &[u8]) -> u64
{
    bytes.iter().fold(FNV1A_64_OFFSET, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV1A_64_PRIME)
    })
}

/// Fold a 64-bit hash into 32 bits by xoring its halves.
pub fn fold_32(hash: u64) -> u32
{
    ((hash >> 32) ^ (hash & 0xffff_ffff)) as u32
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn fnv1a_64_known_values()
    {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn fold_32_xors_halves()
    {
        assert_eq!(fold_32(0x0000_0001_0000_0003), 2);
        assert_eq!(fold_32(0xffff_ffff_0000_0000), 0xffff_ffff);
    }
}
