//! Validation tables for the update protocol.
//!
//! A checksum table carries one entry per index file and is what thin
//! clients use to decide whether their local cache is stale. It travels in
//! two shapes: a compact one (crc and version only) and a whirlpool one
//! (full entries plus a digest trailer over everything before it, optionally
//! RSA-wrapped so clients can verify its origin).

use std::slice::Iter;

use num_bigint::BigInt;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_big_array::big_array;
#[cfg(feature = "serde")]
big_array! { BigArray; }
use whirlpool::{Digest, Whirlpool};

use crate::error::{ParseError, ValidateError};

/// Contains index validation data.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Entry {
    pub crc: u32,
    pub version: u32,
    pub file_count: u32,
    pub size: u32,
    #[cfg_attr(feature = "serde", serde(with = "BigArray"))]
    pub whirlpool: [u8; 64],
}

impl Default for Entry {
    #[inline]
    fn default() -> Self {
        Self {
            crc: 0,
            version: 0,
            file_count: 0,
            size: 0,
            whirlpool: [0; 64],
        }
    }
}

/// RSA key material for wrapping and unwrapping the digest trailer.
///
/// Exponent and modulus are given as ASCII decimal, the form key generators
/// hand out.
pub struct RsaKeys {
    exponent: BigInt,
    modulus: BigInt,
}

impl RsaKeys {
    pub fn new(exponent: &[u8], modulus: &[u8]) -> Self {
        Self {
            exponent: BigInt::parse_bytes(exponent, 10).unwrap_or_default(),
            modulus: BigInt::parse_bytes(modulus, 10).unwrap_or_default(),
        }
    }

    /// `blob ^ exponent mod modulus` over signed big-endian bytes.
    fn crypt(&self, blob: &[u8]) -> Vec<u8> {
        BigInt::from_signed_bytes_be(blob)
            .modpow(&self.exponent, &self.modulus)
            .to_signed_bytes_be()
    }
}

/// Validator for a cache, one [`Entry`] per index file.
///
/// Built by [`Cache::create_checksum`](crate::Cache::create_checksum).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Checksum {
    entries: Vec<Entry>,
}

impl Checksum {
    pub(crate) fn new(index_count: usize) -> Self {
        Self {
            entries: Vec::with_capacity(index_count),
        }
    }

    pub(crate) fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Compares external crcs against the table.
    pub fn validate(&self, crcs: &[u32]) -> Result<(), ValidateError> {
        if crcs.len() != self.entries.len() {
            return Err(ValidateError::InvalidLength {
                expected: self.entries.len(),
                actual: crcs.len(),
            });
        }

        for (idx, (entry, &external)) in self.entries.iter().zip(crcs).enumerate() {
            if entry.crc != external {
                return Err(ValidateError::InvalidCrc {
                    idx,
                    internal: entry.crc,
                    external,
                });
            }
        }

        Ok(())
    }

    /// Serialises the compact shape: crc and version per entry.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.entries.len() * 8);

        for entry in &self.entries {
            buffer.extend(&entry.crc.to_be_bytes());
            buffer.extend(&entry.version.to_be_bytes());
        }

        buffer
    }

    /// Deserialises the compact shape.
    pub fn decode(buffer: &[u8]) -> crate::Result<Self> {
        if buffer.len() % 8 != 0 {
            return Err(ParseError::Unknown.into());
        }

        let entries = buffer
            .chunks_exact(8)
            .map(|chunk| Entry {
                crc: u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                version: u32::from_be_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                ..Entry::default()
            })
            .collect();

        Ok(Self { entries })
    }

    /// Serialises the whirlpool shape: an entry count, the full 80-byte
    /// entries, and a digest trailer over all preceding bytes.
    ///
    /// With `keys` the trailer ships RSA-wrapped.
    pub fn encode_whirlpool(&self, keys: Option<&RsaKeys>) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(1 + self.entries.len() * 80 + 65);

        buffer.push(self.entries.len() as u8);
        for entry in &self.entries {
            buffer.extend(&entry.crc.to_be_bytes());
            buffer.extend(&entry.version.to_be_bytes());
            buffer.extend(&entry.file_count.to_be_bytes());
            buffer.extend(&entry.size.to_be_bytes());
            buffer.extend(&entry.whirlpool);
        }

        let mut hasher = Whirlpool::new();
        hasher.update(&buffer);
        let mut trailer = hasher.finalize().as_slice().to_vec();
        trailer.insert(0, 0);

        match keys {
            Some(keys) => buffer.extend(keys.crypt(&trailer)),
            None => buffer.extend(trailer),
        }

        buffer
    }

    /// Deserialises the whirlpool shape, verifying the digest trailer.
    ///
    /// `keys` unwraps an RSA trailer first (the public pair of the keys it
    /// was encoded with).
    ///
    /// # Errors
    ///
    /// Fails on a truncated buffer or when the digest does not match the
    /// preceding bytes.
    pub fn decode_whirlpool(buffer: &[u8], keys: Option<&RsaKeys>) -> crate::Result<Self> {
        if buffer.is_empty() {
            return Err(ParseError::Unknown.into());
        }

        let count = buffer[0] as usize;
        let entries_end = 1 + count * 80;
        if buffer.len() <= entries_end {
            return Err(ParseError::Unknown.into());
        }

        let entries = buffer[1..entries_end]
            .chunks_exact(80)
            .map(|chunk| {
                let mut whirlpool = [0; 64];
                whirlpool.copy_from_slice(&chunk[16..80]);

                Entry {
                    crc: u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                    version: u32::from_be_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
                    file_count: u32::from_be_bytes([chunk[8], chunk[9], chunk[10], chunk[11]]),
                    size: u32::from_be_bytes([chunk[12], chunk[13], chunk[14], chunk[15]]),
                    whirlpool,
                }
            })
            .collect();

        let mut hasher = Whirlpool::new();
        hasher.update(&buffer[..entries_end]);
        let digest = hasher.finalize();

        let trailer = &buffer[entries_end..];
        let valid = match keys {
            Some(keys) => {
                let mut expected = digest.as_slice().to_vec();
                expected.insert(0, 0);

                BigInt::from_signed_bytes_be(&keys.crypt(trailer))
                    == BigInt::from_signed_bytes_be(&expected)
            }
            None => trailer.len() == 65 && trailer[1..] == digest.as_slice()[..],
        };
        if !valid {
            return Err(ValidateError::WhirlpoolMismatch.into());
        }

        Ok(Self { entries })
    }

    pub fn index_count(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_, Entry> {
        self.entries.iter()
    }
}

impl IntoIterator for Checksum {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Checksum {
    type Item = &'a Entry;
    type IntoIter = Iter<'a, Entry>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    // Throwaway 559-bit pair; private exponent first, public second.
    const EXPONENT: &[u8] = b"949124777437058315884820145542907379591055294429302841377152678213493468986847539996562133433317672405469414708524158793590866936675086664646991580349246604905388200673";
    const PUBLIC_EXPONENT: &[u8] = b"65537";
    const MODULUS: &[u8] = b"1883791354902861624716640153799076951431223223228746829658826622413013975681133471497438288124887584815412451736371549450318200266309898883960467632054847244989064075983";

    fn sample() -> Checksum {
        let mut checksum = Checksum::new(2);
        checksum.push(Entry {
            crc: 0xDEAD_BEEF,
            version: 30109,
            file_count: 21,
            size: 1024,
            whirlpool: [3; 64],
        });
        checksum.push(Entry::default());

        checksum
    }

    #[test]
    fn compact_round_trip() {
        let checksum = sample();
        let buffer = checksum.encode();
        assert_eq!(buffer.len(), 16);

        let decoded = Checksum::decode(&buffer).unwrap();
        assert_eq!(decoded.iter().next().unwrap().crc, 0xDEAD_BEEF);
        assert_eq!(decoded.iter().next().unwrap().version, 30109);
        // The compact shape drops everything else.
        assert_eq!(decoded.iter().next().unwrap().file_count, 0);
    }

    #[test]
    fn whirlpool_round_trip() {
        let checksum = sample();
        let buffer = checksum.encode_whirlpool(None);
        assert_eq!(buffer.len(), 1 + 2 * 80 + 65);

        let decoded = Checksum::decode_whirlpool(&buffer, None).unwrap();
        assert_eq!(decoded, checksum);
    }

    #[test]
    fn whirlpool_tamper_rejected() {
        let mut buffer = sample().encode_whirlpool(None);
        buffer[5] ^= 1;

        let result = Checksum::decode_whirlpool(&buffer, None);
        assert!(matches!(
            result,
            Err(Error::Validate(ValidateError::WhirlpoolMismatch))
        ));
    }

    #[test]
    fn whirlpool_truncation_rejected() {
        let buffer = sample().encode_whirlpool(None);

        assert!(Checksum::decode_whirlpool(&buffer[..40], None).is_err());
        assert!(Checksum::decode_whirlpool(&[], None).is_err());
    }

    #[test]
    fn rsa_round_trip() {
        let checksum = sample();
        let buffer = checksum.encode_whirlpool(Some(&RsaKeys::new(EXPONENT, MODULUS)));

        let decoded =
            Checksum::decode_whirlpool(&buffer, Some(&RsaKeys::new(PUBLIC_EXPONENT, MODULUS)))
                .unwrap();
        assert_eq!(decoded, checksum);
    }

    #[test]
    fn rsa_tamper_rejected() {
        let mut buffer = sample().encode_whirlpool(Some(&RsaKeys::new(EXPONENT, MODULUS)));
        let last = buffer.len() - 1;
        buffer[last] ^= 1;

        assert!(Checksum::decode_whirlpool(
            &buffer,
            Some(&RsaKeys::new(PUBLIC_EXPONENT, MODULUS))
        )
        .is_err());
    }

    #[test]
    fn validate_crcs() {
        let checksum = sample();

        assert!(checksum.validate(&[0xDEAD_BEEF, 0]).is_ok());
        assert_eq!(
            checksum.validate(&[0xDEAD_BEEF]),
            Err(ValidateError::InvalidLength {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            checksum.validate(&[0xDEAD_BEEF, 7]),
            Err(ValidateError::InvalidCrc {
                idx: 1,
                internal: 0,
                external: 7
            })
        );
    }
}
