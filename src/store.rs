//! The on-disk file store: one data file, up to 256 index files.

use std::{collections::HashMap, fs::File, io::Write, path::Path};

use memmap2::Mmap;

use crate::{
    archive::ArchiveRef,
    error::{ParseError, ReadError},
    index::{Index, Indices, IDX_PREFIX},
    sector::{Sector, SectorHeaderSize, SECTOR_SIZE},
    MAIN_DATA, REFERENCE_TABLE_ID,
};

/// A virtual file type for the `.dat2` file.
///
/// Zero-length data files cannot be mapped and are held as empty; every
/// archive read against them fails, but the store still opens so a dataless
/// cache can be inspected.
#[derive(Debug)]
pub struct Dat2(Option<Mmap>);

impl Dat2 {
    /// Initializes a memory map over the specified `.dat2` file.
    pub fn new<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Ok(Self(None));
        }

        Ok(Self(Some(unsafe { Mmap::map(&file)? })))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Read all the data that belongs to the `ArchiveRef`.
    pub fn read(&self, archive: &ArchiveRef) -> crate::Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(archive.length);
        self.read_into_writer(archive, &mut buffer)?;

        debug_assert_eq!(buffer.len(), archive.length);

        Ok(buffer)
    }

    /// Read all the data that belongs to the `ArchiveRef` into the given
    /// writer.
    ///
    /// Walks the sector chain from `archive.sector`, validating every header
    /// against the expected archive id, chunk counter and index id. The
    /// chain is malformed if a sector points past the end of the map, or if
    /// it terminates (`next == 0`) while data remains.
    pub fn read_into_writer<W>(&self, archive: &ArchiveRef, writer: &mut W) -> crate::Result<()>
    where
        W: Write,
    {
        let header_size = SectorHeaderSize::from_archive_id(archive.id);
        let mut current = archive.sector;
        let mut blocks = archive.data_blocks();
        let mut chunk = 0;

        while let Some(block_len) = blocks.next() {
            let offset = current * SECTOR_SIZE;
            let data_block = self
                .as_slice()
                .get(offset..offset + block_len)
                .ok_or(ParseError::Sector(current))?;

            let sector = Sector::new(data_block, &header_size)
                .map_err(|_| ParseError::Sector(current))?;
            sector.header.validate(archive.id, chunk, archive.index_id)?;
            writer.write_all(sector.data_block)?;

            if blocks.len() != 0 && sector.header.next == 0 {
                return Err(ParseError::Sector(current).into());
            }

            current = sector.header.next;
            chunk += 1;
        }

        Ok(())
    }
}

/// Random access over the data file and the discovered index files.
///
/// Opening a store maps `main_file_cache.dat2`, reads the contiguous run of
/// `main_file_cache.idx0..idx254` (discovery stops at the first gap) and the
/// mandatory `main_file_cache.idx255` holding the reference tables. All
/// handles are released when the store is dropped.
#[derive(Debug)]
pub struct FileStore {
    data: Dat2,
    indices: Indices,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let data = Dat2::new(path.join(MAIN_DATA))?;

        let mut indices = HashMap::new();
        for index_id in 0..REFERENCE_TABLE_ID {
            let idx_path = path.join(format!("{}{}", IDX_PREFIX, index_id));

            if !idx_path.exists() {
                break;
            }
            indices.insert(index_id, Index::from_path(index_id, idx_path)?);
        }

        if indices.is_empty() {
            return Err(ReadError::IndexNotFound(0).into());
        }

        let ref_path = path.join(format!("{}{}", IDX_PREFIX, REFERENCE_TABLE_ID));
        if !ref_path.exists() {
            return Err(ReadError::ReferenceTableNotFound.into());
        }
        indices.insert(
            REFERENCE_TABLE_ID,
            Index::from_path(REFERENCE_TABLE_ID, ref_path)?,
        );

        Ok(Self {
            data,
            indices: Indices(indices),
        })
    }

    /// Looks up the 6-byte index record for `(index_id, archive_id)`.
    pub fn archive_ref(&self, index_id: u8, archive_id: u32) -> crate::Result<&ArchiveRef> {
        let index = self
            .indices
            .get(&index_id)
            .ok_or(ReadError::IndexNotFound(index_id))?;

        let archive = index
            .archive_refs
            .get(&archive_id)
            .ok_or(ReadError::ArchiveNotFound {
                idx: index_id,
                arc: archive_id,
            })?;

        Ok(archive)
    }

    /// Gathers the archive's bytes from its sector chain.
    pub fn read(&self, index_id: u8, archive_id: u32) -> crate::Result<Vec<u8>> {
        let archive = self.archive_ref(index_id, archive_id)?;
        self.data.read(archive)
    }

    /// Streams the archive's bytes from its sector chain into `writer`.
    pub fn read_into_writer<W: Write>(
        &self,
        index_id: u8,
        archive_id: u32,
        writer: &mut W,
    ) -> crate::Result<()> {
        let archive = self.archive_ref(index_id, archive_id)?;
        self.data.read_into_writer(archive, writer)
    }

    /// The number of data-plane index files (the meta index not included).
    pub fn index_count(&self) -> usize {
        self.indices.len() - 1
    }

    /// How many archives the given index file can address.
    pub fn entry_count(&self, index_id: u8) -> crate::Result<usize> {
        let index = self
            .indices
            .get(&index_id)
            .ok_or(ReadError::IndexNotFound(index_id))?;

        Ok(index.entry_count())
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    pub const fn indices(&self) -> &Indices {
        &self.indices
    }
}

#[cfg(test)]
fn is_normal<T: Send + Sync + Sized + Unpin>() {}

#[test]
fn normal_types() {
    is_normal::<Dat2>();
    is_normal::<FileStore>();
}
