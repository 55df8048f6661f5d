//! Enciphering/deciphering of archive payloads.
//!
//! XTEA covers only whole 8-byte blocks inside the requested range; a tail
//! shorter than one block stays cleartext. Producers use the all-zero key as
//! a "no encryption" sentinel and, more subtly, skip ciphering whenever *any*
//! key word is zero. [`encipher`] and [`decipher`] preserve that rule
//! bit-for-bit; the `_forced` variants opt out of it.

const ROUNDS: u32 = 32;
const RATIO: u32 = 0x9E37_79B9;

/// The "no encryption" sentinel key.
pub const NULL_KEYS: [u32; 4] = [0; 4];

/// Whether ciphering would be skipped for these keys.
///
/// A key with any zero word counts as null.
#[inline]
pub fn is_null(keys: &[u32; 4]) -> bool {
    keys.iter().any(|&key| key == 0)
}

/// Enciphers `data[start..end]` in-place with the given XTEA keys.
///
/// A null key (any word zero) leaves the buffer untouched.
pub fn encipher(data: &mut [u8], keys: &[u32; 4], start: usize, end: usize) {
    if is_null(keys) {
        return;
    }

    encipher_forced(data, keys, start, end);
}

/// Deciphers `data[start..end]` in-place with the given XTEA keys.
///
/// A null key (any word zero) leaves the buffer untouched.
pub fn decipher(data: &mut [u8], keys: &[u32; 4], start: usize, end: usize) {
    if is_null(keys) {
        return;
    }

    decipher_forced(data, keys, start, end);
}

/// Enciphers `data[start..end]` regardless of zero key words.
pub fn encipher_forced(data: &mut [u8], keys: &[u32; 4], start: usize, end: usize) {
    let blocks = (end - start) / 8;

    let mut index = start;
    for _ in 0..blocks {
        let (mut v0, mut v1) = read_block(data, index);
        let mut sum = 0_u32;
        for _ in 0..ROUNDS {
            v0 = v0.wrapping_add(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ (sum.wrapping_add(keys[(sum & 3) as usize])),
            );
            sum = sum.wrapping_add(RATIO);
            v1 = v1.wrapping_add(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ (sum.wrapping_add(keys[((sum >> 11) & 3) as usize])),
            );
        }
        write_block(data, index, v0, v1);

        index += 8;
    }
}

/// Deciphers `data[start..end]` regardless of zero key words.
pub fn decipher_forced(data: &mut [u8], keys: &[u32; 4], start: usize, end: usize) {
    let blocks = (end - start) / 8;

    let mut index = start;
    for _ in 0..blocks {
        let (mut v0, mut v1) = read_block(data, index);
        let mut sum = ROUNDS.wrapping_mul(RATIO);
        for _ in 0..ROUNDS {
            v1 = v1.wrapping_sub(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ (sum.wrapping_add(keys[((sum >> 11) & 3) as usize])),
            );
            sum = sum.wrapping_sub(RATIO);
            v0 = v0.wrapping_sub(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ (sum.wrapping_add(keys[(sum & 3) as usize])),
            );
        }
        write_block(data, index, v0, v1);

        index += 8;
    }
}

fn read_block(data: &[u8], index: usize) -> (u32, u32) {
    let v0 = u32::from_be_bytes([
        data[index],
        data[index + 1],
        data[index + 2],
        data[index + 3],
    ]);
    let v1 = u32::from_be_bytes([
        data[index + 4],
        data[index + 5],
        data[index + 6],
        data[index + 7],
    ]);

    (v0, v1)
}

fn write_block(data: &mut [u8], index: usize, v0: u32, v1: u32) {
    data[index..index + 4].copy_from_slice(&v0.to_be_bytes());
    data[index + 4..index + 8].copy_from_slice(&v1.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let keys = [1, 2, 3, 4];
        let mut buffer = [0xFF; 16];

        encipher(&mut buffer, &keys, 0, 16);
        assert_ne!(buffer, [0xFF; 16]);

        decipher(&mut buffer, &keys, 0, 16);
        assert_eq!(buffer, [0xFF; 16]);
    }

    #[test]
    fn round_trip_offset_range() {
        let keys = [77, 13, 999, 4];
        let mut buffer = [0xFF; 21];

        encipher(&mut buffer, &keys, 5, 21);
        assert_eq!(&buffer[..5], &[0xFF; 5]);

        decipher(&mut buffer, &keys, 5, 21);
        assert_eq!(buffer, [0xFF; 21]);
    }

    #[test]
    fn zero_key_word_is_noop() {
        let keys = [0, 1, 2, 3];
        let mut buffer = [0xFF; 16];

        encipher(&mut buffer, &keys, 0, 16);
        assert_eq!(buffer, [0xFF; 16]);

        decipher(&mut buffer, &keys, 0, 16);
        assert_eq!(buffer, [0xFF; 16]);
    }

    #[test]
    fn forced_ciphers_zero_key_words() {
        let keys = [0, 1, 2, 3];
        let mut buffer = [0xFF; 16];

        encipher_forced(&mut buffer, &keys, 0, 16);
        assert_ne!(buffer, [0xFF; 16]);

        decipher_forced(&mut buffer, &keys, 0, 16);
        assert_eq!(buffer, [0xFF; 16]);
    }

    #[test]
    fn partial_block_tail_untouched() {
        let keys = [1, 2, 3, 4];
        let mut buffer = [0xAB; 13];

        encipher(&mut buffer, &keys, 0, 13);
        assert_eq!(&buffer[8..], &[0xAB; 5]);
    }
}
