//! Archive references and multi-file archive groups.

use std::slice::Iter;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use nom::number::complete::be_u24;

use crate::error::ParseError;
use crate::sector::SectorHeaderSize;

pub const ARCHIVE_REF_LEN: usize = 6;

/// A reference to an archive segment.
///
/// Archives are not stored in a contiguous fashion. An `ArchiveRef` is
/// _basically_ a wide pointer, like `&str` or `&[u8]`: it knows where the
/// archive's memory starts inside the [`Dat2`](crate::Dat2) file and its
/// total length. Each block of memory belonging to the archive is viewed as
/// a [`Sector`](crate::Sector), which carries a pointer to the next sector.
/// Once that chain is exhausted you are left with all of the archive data.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ArchiveRef {
    pub id: u32,
    pub index_id: u8,
    pub sector: usize,
    pub length: usize,
}

impl ArchiveRef {
    /// Transforms an [`Index`](crate::Index) sub-buffer into an archive
    /// reference.
    ///
    /// # Errors
    ///
    /// Will fail if the buffer is not exactly 6 bytes in length.
    pub fn from_buffer(id: u32, index_id: u8, buffer: &[u8]) -> crate::Result<Self> {
        let (buffer, length) = be_u24(buffer)?;
        let (_, sector) = be_u24(buffer)?;

        Ok(Self {
            id,
            index_id,
            sector: sector as usize,
            length: length as usize,
        })
    }

    /// Generate a data block iterator from this archive reference.
    pub fn data_blocks(&self) -> DataBlocks {
        let (header_len, data_len) = SectorHeaderSize::from_archive_id(self.id).layout();

        let n = self.length / data_len;
        let rem = self.length % data_len;
        let n = if rem > 0 { n + 1 } else { n };

        DataBlocks {
            count: n,
            remainder: rem,
            header_len,
            data_len,
        }
    }
}

/// Iterator over the byte counts of an archive's sector chain.
///
/// When reading an archive from [`Dat2`](crate::Dat2) every hop needs to
/// know how many bytes of the sector are live; the final block only
/// contributes the remainder.
pub struct DataBlocks {
    count: usize,
    remainder: usize,
    header_len: usize,
    data_len: usize,
}

impl Iterator for DataBlocks {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count == 0 {
            return None;
        }

        let n = if self.count == 1 && self.remainder != 0 {
            self.remainder
        } else {
            self.data_len
        };

        self.count -= 1;
        Some(self.header_len + n)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.count, Some(self.count))
    }
}

impl ExactSizeIterator for DataBlocks {
    fn len(&self) -> usize {
        self.count
    }
}

/// Holds a file id with its data.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct FileData {
    pub id: u32,
    pub data: Vec<u8>,
}

/// All of the files packed into a single archive.
///
/// Larger archives split every file into chunks and interleave them:
/// chunk 0 of every file, then chunk 1 of every file, and so on. The chunk
/// sizes live in a delta-encoded footer, with the chunk count as the very
/// last byte.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct FileGroup(Vec<FileData>);

impl FileGroup {
    /// Splits a decoded archive buffer into its `entry_count` files.
    ///
    /// # Errors
    ///
    /// Fails when `entry_count` is zero, when the footer would start before
    /// the buffer does, or when the recorded chunk sizes overrun the data.
    pub fn from_buffer(buffer: &[u8], entry_count: usize) -> crate::Result<Self> {
        if entry_count == 0 || buffer.is_empty() {
            return Err(ParseError::FileGroup.into());
        }

        let chunks = buffer[buffer.len() - 1] as usize;
        let footer_len = 1 + chunks * entry_count * 4;
        if footer_len > buffer.len() {
            return Err(ParseError::FileGroup.into());
        }

        let mut sizes = vec![0_usize; entry_count];
        let mut chunk_sizes = Vec::with_capacity(chunks * entry_count);
        let mut read_ptr = buffer.len() - footer_len;

        for _ in 0..chunks {
            let mut chunk_size = 0_i32;

            for (entry_id, size) in sizes.iter_mut().enumerate() {
                let mut bytes = [0; 4];
                bytes.copy_from_slice(&buffer[read_ptr..read_ptr + 4]);
                let delta = i32::from_be_bytes(bytes);
                read_ptr += 4;
                chunk_size = chunk_size.wrapping_add(delta);
                if chunk_size < 0 {
                    return Err(ParseError::FileGroup.into());
                }

                *size += chunk_size as usize;
                chunk_sizes.push((entry_id, chunk_size as usize));
            }
        }

        let mut files: Vec<FileData> = sizes
            .iter()
            .enumerate()
            .map(|(id, &size)| FileData {
                id: id as u32,
                data: Vec::with_capacity(size),
            })
            .collect();

        let data_len = buffer.len() - footer_len;
        let mut read_ptr = 0;
        for (entry_id, chunk_size) in chunk_sizes {
            if read_ptr + chunk_size > data_len {
                return Err(ParseError::FileGroup.into());
            }

            files[entry_id]
                .data
                .extend_from_slice(&buffer[read_ptr..read_ptr + chunk_size]);
            read_ptr += chunk_size;
        }

        Ok(Self(files))
    }

    /// Packs the files back into a single-chunk archive buffer.
    ///
    /// Every file's bytes are concatenated, followed by one signed size
    /// delta per file and the chunk count byte.
    pub fn encode(&self) -> Vec<u8> {
        let data_len: usize = self.0.iter().map(|file| file.data.len()).sum();
        let mut buffer = Vec::with_capacity(data_len + self.0.len() * 4 + 1);

        for file in &self.0 {
            buffer.extend_from_slice(&file.data);
        }

        let mut previous = 0_i32;
        for file in &self.0 {
            let len = file.data.len() as i32;
            buffer.extend(&len.wrapping_sub(previous).to_be_bytes());
            previous = len;
        }
        buffer.push(1);

        buffer
    }

    pub fn get(&self, id: u32) -> Option<&FileData> {
        self.0.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_, FileData> {
        self.0.iter()
    }
}

impl From<Vec<FileData>> for FileGroup {
    fn from(files: Vec<FileData>) -> Self {
        Self(files)
    }
}

impl IntoIterator for FileGroup {
    type Item = FileData;
    type IntoIter = std::vec::IntoIter<FileData>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FileGroup {
    type Item = &'a FileData;
    type IntoIter = Iter<'a, FileData>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_archive_ref() -> crate::Result<()> {
        let buffer = &[0, 0, 77, 0, 1, 196];
        let archive = ArchiveRef::from_buffer(10, 255, buffer)?;

        assert_eq!(
            archive,
            ArchiveRef {
                id: 10,
                index_id: 255,
                sector: 452,
                length: 77
            }
        );

        Ok(())
    }

    #[test]
    fn data_blocks_split_with_remainder() {
        let archive = ArchiveRef {
            id: 0,
            index_id: 2,
            sector: 1,
            length: 1000,
        };

        let blocks: Vec<usize> = archive.data_blocks().collect();
        assert_eq!(blocks, vec![8 + 512, 8 + 488]);
    }

    #[test]
    fn data_blocks_expanded_layout() {
        let archive = ArchiveRef {
            id: 0x10001,
            index_id: 2,
            sector: 1,
            length: 510,
        };

        let blocks: Vec<usize> = archive.data_blocks().collect();
        assert_eq!(blocks, vec![10 + 510]);
    }

    #[test]
    fn single_file_shape() {
        let group = FileGroup::from(vec![FileData {
            id: 0,
            data: vec![9, 8, 7],
        }]);

        let buffer = group.encode();
        assert_eq!(buffer, vec![9, 8, 7, 0, 0, 0, 3, 1]);

        let decoded = FileGroup::from_buffer(&buffer, 1).unwrap();
        assert_eq!(decoded, group);
    }

    #[test]
    fn round_trip() {
        let group = FileGroup::from(vec![
            FileData {
                id: 0,
                data: vec![1; 40],
            },
            FileData {
                id: 1,
                data: vec![2; 7],
            },
            FileData {
                id: 2,
                data: vec![3; 513],
            },
        ]);

        let decoded = FileGroup::from_buffer(&group.encode(), 3).unwrap();
        assert_eq!(decoded, group);
    }

    #[test]
    fn interleaved_chunks() {
        // Two files across two chunks: a = [1, 2] ++ [3], b = [9] ++ [8, 8].
        let mut buffer = vec![1, 2, 9, 3, 8, 8];
        for delta in [2_i32, -1, 1, 1] {
            buffer.extend(&delta.to_be_bytes());
        }
        buffer.push(2);

        let group = FileGroup::from_buffer(&buffer, 2).unwrap();
        assert_eq!(group.get(0).unwrap().data, vec![1, 2, 3]);
        assert_eq!(group.get(1).unwrap().data, vec![9, 8, 8]);
    }

    #[test]
    fn rejects_empty_and_overrun() {
        assert!(FileGroup::from_buffer(&[], 1).is_err());
        assert!(FileGroup::from_buffer(&[0, 0, 0, 4, 1], 1).is_err());
        // Footer larger than the buffer itself.
        assert!(FileGroup::from_buffer(&[4], 20).is_err());
    }
}
