//! MSB-first bit packing for circuit state payloads.

/// Number of bytes needed to carry `count` bits.
#[must_use]
pub const fn packed_len(count: usize) -> usize {
    count.div_ceil(8)
}

/// Pack bits MSB-first: bit 0 lands in the high bit of byte 0.
///
/// Unused trailing bits of the last byte are zero.
#[must_use]
pub fn pack_bits<I>(bits: I) -> Vec<u8>
where
    I: IntoIterator<Item = bool>,
{
    let mut bytes = Vec::new();
    for (index, bit) in bits.into_iter().enumerate() {
        if index % 8 == 0 {
            bytes.push(0);
        }
        if bit && let Some(last) = bytes.last_mut() {
            *last |= 0x80 >> (index % 8);
        }
    }
    bytes
}

/// Unpack every bit of `bytes`, MSB-first; yields `bytes.len() * 8` values.
#[must_use]
pub fn unpack_bits(bytes: &[u8]) -> Vec<bool> {
    bytes
        .iter()
        .flat_map(|byte| (0..8).map(move |shift| byte & (0x80 >> shift) != 0))
        .collect()
}
