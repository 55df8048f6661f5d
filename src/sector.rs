//! Linked sectors of the main data file.

use nom::{
    combinator::rest,
    number::complete::{be_u16, be_u24, be_u32, be_u8},
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ReadError;

pub const SECTOR_HEADER_SIZE: usize = 8;
pub const SECTOR_EXPANDED_HEADER_SIZE: usize = 10;
pub const SECTOR_DATA_SIZE: usize = 512;
pub const SECTOR_EXPANDED_DATA_SIZE: usize = 510;
pub const SECTOR_SIZE: usize = SECTOR_HEADER_SIZE + SECTOR_DATA_SIZE;

/// One 520-byte block of an archive, viewed in place.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Sector<'a> {
    pub header: SectorHeader,
    pub data_block: &'a [u8],
}

impl<'a> Sector<'a> {
    pub fn new(buffer: &'a [u8], header_size: &SectorHeaderSize) -> crate::Result<Self> {
        let (buffer, header) = SectorHeader::new(buffer, header_size)?;
        let (_, data_block) = rest(buffer)?;

        Ok(Self { header, data_block })
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct SectorHeader {
    pub archive_id: u32,
    pub chunk: usize,
    pub next: usize,
    pub index_id: u8,
}

impl<'a> SectorHeader {
    pub fn new(
        buffer: &'a [u8],
        header_size: &SectorHeaderSize,
    ) -> crate::Result<(&'a [u8], Self)> {
        let (buffer, archive_id) = match header_size {
            SectorHeaderSize::Normal => {
                let (buffer, archive_id) = be_u16(buffer)?;
                (buffer, archive_id as u32)
            }
            SectorHeaderSize::Expanded => be_u32(buffer)?,
        };
        let (buffer, chunk) = be_u16(buffer)?;
        let (buffer, next) = be_u24(buffer)?;
        let (buffer, index_id) = be_u8(buffer)?;

        Ok((
            buffer,
            Self {
                archive_id,
                chunk: chunk as usize,
                next: next as usize,
                index_id,
            },
        ))
    }

    /// Every sector on a chain must belong to the archive being walked.
    pub const fn validate(
        &self,
        archive_id: u32,
        chunk: usize,
        index_id: u8,
    ) -> Result<(), ReadError> {
        if self.archive_id != archive_id {
            return Err(ReadError::SectorArchiveMismatch(
                self.archive_id,
                archive_id,
            ));
        }

        if self.chunk != chunk {
            return Err(ReadError::SectorChunkMismatch(self.chunk, chunk));
        }

        if self.index_id != index_id {
            return Err(ReadError::SectorIndexMismatch(self.index_id, index_id));
        }

        Ok(())
    }
}

/// Archive ids past the u16 range widen the header and shrink the data
/// block; both layouts mix freely within one data file.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum SectorHeaderSize {
    Normal,
    Expanded,
}

impl SectorHeaderSize {
    pub const fn from_archive_id(archive_id: u32) -> Self {
        if archive_id > u16::MAX as u32 {
            Self::Expanded
        } else {
            Self::Normal
        }
    }

    pub const fn layout(&self) -> (usize, usize) {
        match self {
            Self::Normal => (SECTOR_HEADER_SIZE, SECTOR_DATA_SIZE),
            Self::Expanded => (SECTOR_EXPANDED_HEADER_SIZE, SECTOR_EXPANDED_DATA_SIZE),
        }
    }
}

impl Default for SectorHeaderSize {
    fn default() -> Self {
        Self::Normal
    }
}
