//! (De)compression and enciphering/deciphering of the payload envelope.
//!
//! Every archive is stored wrapped in a small envelope:
//!
//! ```text
//! tag: u8, compressed_len: u32, [decompressed_len: u32], payload, [version: i16]
//! ```
//!
//! The decompressed length is only present for compressed payloads; the
//! trailing version only when the producer stamped one. XTEA, when keys are
//! attached, covers the byte range from offset 5 up to the end of the
//! payload; the leading header and the trailing version stay cleartext.
//!
//! ```
//! use js5fs::codec::{Buffer, Compression, Encoded};
//!
//! # fn main() -> js5fs::Result<()> {
//! let encoded = Buffer::from(&b"hello"[..])
//!     .with_compression(Compression::Gzip)
//!     .with_version(42)
//!     .encode()?;
//!
//! let decoded = Buffer::<Encoded>::from(encoded.finalize()).decode()?;
//! assert_eq!(decoded.as_ref(), b"hello");
//! assert_eq!(decoded.version(), Some(42));
//! # Ok(())
//! # }
//! ```

use std::convert::TryFrom;
use std::io::{self, Read, Write};
use std::marker::PhantomData;

use bzip2::{read::BzDecoder, write::BzEncoder};
use flate2::{bufread::GzDecoder, write::GzEncoder};
use nom::number::complete::{be_i16, be_u32, be_u8};

use crate::{
    error::{CompressionUnsupported, ParseError, ValidateError},
    xtea::{self, NULL_KEYS},
};

/// Supported compression types.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Compression {
    None,
    Bzip2,
    Gzip,
}

/// Marker struct conveying `State` of a [`Buffer`](Buffer).
pub struct Encoded;
/// Marker struct conveying `State` of a [`Buffer`](Buffer).
pub struct Decoded;

/// An archive payload, either still enveloped (`Encoded`) or in plain form
/// (`Decoded`), together with the codec settings that carry it across.
pub struct Buffer<State> {
    compression: Compression,
    buffer: Vec<u8>,
    version: Option<i16>,
    keys: Option<[u32; 4]>,
    force_cipher: bool,
    _state: PhantomData<State>,
}

impl Buffer<Decoded> {
    /// Wraps the plain data in the payload envelope.
    ///
    /// Compresses with the selected [`Compression`], prepends the tag and
    /// length fields, enciphers the payload range when keys are attached and
    /// appends the version when one is set.
    pub fn encode(self) -> crate::Result<Buffer<Encoded>> {
        let decompressed_len = self.buffer.len();
        let compressed_data = match self.compression {
            Compression::None => self.buffer,
            Compression::Bzip2 => compress_bzip2(&self.buffer)?,
            Compression::Gzip => compress_gzip(&self.buffer)?,
        };

        let mut buffer = Vec::with_capacity(compressed_data.len() + 11);
        buffer.push(self.compression as u8);
        buffer.extend(&u32::to_be_bytes(compressed_data.len() as u32));
        if self.compression != Compression::None {
            buffer.extend(&u32::to_be_bytes(decompressed_len as u32));
        }
        buffer.extend(compressed_data);

        let cipher_end = buffer.len();
        if let Some(keys) = &self.keys {
            if self.force_cipher {
                if *keys == NULL_KEYS {
                    return Err(ValidateError::KeyRejected.into());
                }
                xtea::encipher_forced(&mut buffer, keys, 5, cipher_end);
            } else {
                xtea::encipher(&mut buffer, keys, 5, cipher_end);
            }
        }

        if let Some(version) = self.version {
            buffer.extend(&i16::to_be_bytes(version));
        }

        Ok(Buffer {
            compression: self.compression,
            buffer,
            version: self.version,
            keys: self.keys,
            force_cipher: self.force_cipher,
            _state: PhantomData,
        })
    }
}

impl Buffer<Encoded> {
    /// Unwraps the payload envelope back into plain data.
    ///
    /// Deciphers the payload range when keys are attached, decompresses
    /// according to the tag and captures the trailing version when present.
    ///
    /// # Errors
    ///
    /// Fails on an unknown compression tag, a truncated envelope, or when
    /// the decompressed data does not match the recorded length.
    pub fn decode(mut self) -> crate::Result<Buffer<Decoded>> {
        let (compression, compressed_len) = {
            let (buffer, tag) = be_u8(self.buffer.as_slice())?;
            let (_, len) = be_u32(buffer)?;

            (Compression::try_from(tag)?, len as usize)
        };

        let cipher_end = match compression {
            Compression::None => 5 + compressed_len,
            _ => 9 + compressed_len,
        };
        if cipher_end > self.buffer.len() {
            return Err(ParseError::Unknown.into());
        }

        if let Some(keys) = &self.keys {
            if self.force_cipher {
                if *keys == NULL_KEYS {
                    return Err(ValidateError::KeyRejected.into());
                }
                xtea::decipher_forced(&mut self.buffer, keys, 5, cipher_end);
            } else {
                xtea::decipher(&mut self.buffer, keys, 5, cipher_end);
            }
        }

        let version = if self.buffer.len() - cipher_end >= 2 {
            let (_, version) = be_i16(&self.buffer[self.buffer.len() - 2..])?;
            Some(version)
        } else {
            None
        };

        let buffer = match compression {
            Compression::None => self.buffer[5..cipher_end].to_vec(),
            Compression::Bzip2 | Compression::Gzip => {
                let (_, decompressed_len) = be_u32(&self.buffer[5..9])?;
                let decompressed_len = decompressed_len as usize;

                let body = &self.buffer[9..cipher_end];
                let decompressed_data = match compression {
                    Compression::Bzip2 => decompress_bzip2(body)?,
                    _ => decompress_gzip(body)?,
                };

                if decompressed_data.len() != decompressed_len {
                    return Err(ValidateError::LengthMismatch {
                        expected: decompressed_len,
                        actual: decompressed_data.len(),
                    }
                    .into());
                }

                decompressed_data
            }
        };

        Ok(Buffer {
            compression,
            buffer,
            version,
            keys: self.keys,
            force_cipher: self.force_cipher,
            _state: PhantomData,
        })
    }
}

impl<State> Buffer<State> {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_version(mut self, version: i16) -> Self {
        self.version = Some(version);
        self
    }

    /// Attaches XTEA keys under the producers' null-key rule: a key with any
    /// zero word silently disables ciphering.
    pub fn with_xtea_keys(mut self, keys: [u32; 4]) -> Self {
        self.keys = Some(keys);
        self.force_cipher = false;
        self
    }

    /// Attaches XTEA keys that cipher even when a key word is zero.
    ///
    /// The all-zero key stays reserved as the "no encryption" sentinel and
    /// is rejected at encode/decode time.
    pub fn with_xtea_keys_forced(mut self, keys: [u32; 4]) -> Self {
        self.keys = Some(keys);
        self.force_cipher = true;
        self
    }

    pub const fn compression(&self) -> Compression {
        self.compression
    }

    pub const fn version(&self) -> Option<i16> {
        self.version
    }

    #[inline]
    pub fn finalize(self) -> Vec<u8> {
        self.buffer
    }
}

impl<State> Default for Buffer<State> {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            buffer: Vec::new(),
            version: None,
            keys: None,
            force_cipher: false,
            _state: PhantomData,
        }
    }
}

impl<State> std::fmt::Debug for Buffer<State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("compression", &self.compression)
            .field("keys", &self.keys)
            .field("version", &self.version)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<State> From<&[u8]> for Buffer<State> {
    fn from(buffer: &[u8]) -> Self {
        Self {
            buffer: Vec::from(buffer),
            ..Self::default()
        }
    }
}

impl<State> From<Vec<u8>> for Buffer<State> {
    fn from(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            ..Self::default()
        }
    }
}

impl<State> std::ops::Deref for Buffer<State> {
    type Target = Vec<u8>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl<State> std::convert::AsRef<[u8]> for Buffer<State> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_slice()
    }
}

impl<State> std::io::Write for Buffer<State> {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        self.buffer.write(buffer)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }
}

/// Unwraps an envelope without keys and hands back the plain data.
#[inline]
pub fn decode(buffer: &[u8]) -> crate::Result<Vec<u8>> {
    Ok(Buffer::<Encoded>::from(buffer).decode()?.finalize())
}

/// Wraps plain data in an envelope without keys.
#[inline]
pub fn encode(
    compression: Compression,
    data: &[u8],
    version: Option<i16>,
) -> crate::Result<Vec<u8>> {
    let mut buffer = Buffer::<Decoded>::from(data).with_compression(compression);
    if let Some(version) = version {
        buffer = buffer.with_version(version);
    }

    Ok(buffer.encode()?.finalize())
}

fn compress_bzip2(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut compressor = BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    compressor.write_all(data)?;
    let mut compressed_data = compressor.finish()?;
    // The leading "BZh1" magic is implied on disk.
    compressed_data.drain(..4);

    Ok(compressed_data)
}

fn compress_gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut compressor = GzEncoder::new(Vec::new(), flate2::Compression::best());
    compressor.write_all(data)?;
    let compressed_data: Vec<u8> = compressor.finish()?;

    Ok(compressed_data)
}

fn decompress_bzip2(body: &[u8]) -> crate::Result<Vec<u8>> {
    let mut compressed_data = Vec::with_capacity(body.len() + 4);
    compressed_data.extend(b"BZh1");
    compressed_data.extend(body);

    let mut decompressed_data = Vec::new();
    let mut decompressor = BzDecoder::new(compressed_data.as_slice());
    decompressor.read_to_end(&mut decompressed_data)?;

    Ok(decompressed_data)
}

fn decompress_gzip(body: &[u8]) -> crate::Result<Vec<u8>> {
    let mut decompressed_data = Vec::new();
    let mut decompressor = GzDecoder::new(body);
    decompressor.read_to_end(&mut decompressed_data)?;

    Ok(decompressed_data)
}

impl Default for Compression {
    #[inline]
    fn default() -> Self {
        Self::None
    }
}

impl From<Compression> for u8 {
    fn from(compression: Compression) -> Self {
        match compression {
            Compression::None => 0,
            Compression::Bzip2 => 1,
            Compression::Gzip => 2,
        }
    }
}

impl TryFrom<u8> for Compression {
    type Error = CompressionUnsupported;

    fn try_from(compression: u8) -> Result<Self, Self::Error> {
        match compression {
            0 => Ok(Self::None),
            1 => Ok(Self::Bzip2),
            2 => Ok(Self::Gzip),
            _ => Err(CompressionUnsupported(compression)),
        }
    }
}
