//! Rolling hash for interned byte sequences.
//!
//! Input is consumed a 32-bit word at a time. Word-aligned input is read straight out of the
//! slice, unaligned input is assembled byte-wise; both paths read words little-endian so the
//! hash only depends on content, never on where the bytes happen to live.

/// Multiplier applied when finishing the hash (golden ratio, 32-bit)
const FINISH_PRIME: u32 = 0x9E37_79B9;

#[inline]
fn step(state: u32, word: u32) -> u32 {
    state.rotate_left(5).wrapping_add(word)
}

fn tail(mut state: u32, bytes: &[u8]) -> u32 {
    for byte in bytes {
        state = step(state, u32::from(*byte));
    }
    state
}

fn finish(state: u32, len: usize) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let mut h = state ^ (len as u32).wrapping_mul(FINISH_PRIME);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h
}

fn hash_unaligned(bytes: &[u8]) -> u32 {
    let mut chunks = bytes.chunks_exact(4);
    let mut state = 0;
    for chunk in &mut chunks {
        state = step(state, u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    finish(tail(state, chunks.remainder()), bytes.len())
}

/// Computes the bucket hash of `bytes`
///
/// ```rust
/// use classlink::strings::hash_bytes;
///
/// let data = b"xjava/lang/Object";
/// assert_eq!(hash_bytes(&data[1..]), hash_bytes(b"java/lang/Object"));
/// ```
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    // SAFETY: every bit pattern is a valid u32, align_to only splits the slice.
    let (prefix, words, suffix) = unsafe { bytes.align_to::<u32>() };
    if !prefix.is_empty() {
        return hash_unaligned(bytes);
    }

    let mut state = 0;
    for word in words {
        state = step(state, u32::from_le(*word));
    }
    finish(tail(state, suffix), bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_and_unaligned_agree() {
        // Backing storage with a known alignment so both paths are exercised
        let mut storage: Vec<u32> = vec![0; 16];
        let len = storage.len() * 4;
        // SAFETY: reinterpreting initialised u32 storage as bytes
        let raw = unsafe { std::slice::from_raw_parts_mut(storage.as_mut_ptr().cast::<u8>(), len) };

        let text = b"java/lang/String";
        raw[..text.len()].copy_from_slice(text);
        let aligned = hash_bytes(&raw[..text.len()]);

        raw[1..=text.len()].copy_from_slice(text);
        let unaligned = hash_bytes(&raw[1..=text.len()]);

        assert_eq!(aligned, unaligned);
        assert_eq!(aligned, hash_unaligned(text));
    }

    #[test]
    fn distinguishes_content() {
        assert_ne!(hash_bytes(b"foo"), hash_bytes(b"oof"));
        assert_ne!(hash_bytes(b"ab"), hash_bytes(b"ab\0"));
        assert_ne!(hash_bytes(b""), hash_bytes(b"\0"));
        assert_eq!(hash_bytes(b"foo"), hash_bytes(&b"foo".to_vec()));
    }
}
