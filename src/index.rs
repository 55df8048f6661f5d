//! Index files mapping archive ids to their sector chains.

use std::{
    collections::{hash_map, HashMap},
    fs::File,
    io::Read,
    path::Path,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    archive::{ArchiveRef, ARCHIVE_REF_LEN},
    error::ParseError,
};

pub const IDX_PREFIX: &str = "main_file_cache.idx";

/// The discovered set of index files, keyed by index id.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default)]
pub struct Indices(pub(crate) HashMap<u8, Index>);

impl Indices {
    pub fn get(&self, key: &u8) -> Option<&Index> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One `.idxN` file: a flat array of 6-byte archive references.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default)]
pub struct Index {
    pub id: u8,
    pub archive_refs: HashMap<u32, ArchiveRef>,
}

impl Index {
    /// Reads the index file at `path` into memory.
    ///
    /// # Panics
    ///
    /// Panics when `path` does not carry the `idx{id}` extension.
    pub fn from_path<P: AsRef<Path>>(id: u8, path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let index_extension = format!("idx{}", id);
        let extension = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("");

        if extension != index_extension {
            panic!("index extension mismatch: expected {index_extension} but found {extension}");
        }

        let mut file = File::open(path)?;
        let mut buffer = Vec::with_capacity(file.metadata()?.len() as usize);
        file.read_to_end(&mut buffer)?;

        Self::from_buffer(id, &buffer)
    }

    /// Parses every whole 6-byte record; a trailing partial record is
    /// ignored, matching the on-disk producers.
    pub fn from_buffer(id: u8, buffer: &[u8]) -> crate::Result<Self> {
        let mut archive_refs = HashMap::new();

        for (archive_id, archive_data) in buffer.chunks_exact(ARCHIVE_REF_LEN).enumerate() {
            let archive_id = archive_id as u32;

            let archive_ref = match ArchiveRef::from_buffer(archive_id, id, archive_data) {
                Ok(archive) => archive,
                Err(_) => return Err(ParseError::Archive(archive_id).into()),
            };
            archive_refs.insert(archive_id, archive_ref);
        }

        Ok(Self { id, archive_refs })
    }

    /// How many archives this index can address.
    pub fn entry_count(&self) -> usize {
        self.archive_refs.len()
    }
}

impl IntoIterator for Indices {
    type Item = (u8, Index);
    type IntoIter = hash_map::IntoIter<u8, Index>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Indices {
    type Item = (&'a u8, &'a Index);
    type IntoIter = hash_map::Iter<'a, u8, Index>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_buffer_parses_whole_records() -> crate::Result<()> {
        let buffer = &[
            0, 0, 3, 0, 0, 1, // archive 0: length 3, sector 1
            0, 1, 0, 0, 0, 9, // archive 1: length 256, sector 9
            7, 7, // trailing partial record
        ];
        let index = Index::from_buffer(2, buffer)?;

        assert_eq!(index.entry_count(), 2);
        assert_eq!(
            index.archive_refs[&1],
            ArchiveRef {
                id: 1,
                index_id: 2,
                sector: 9,
                length: 256
            }
        );

        Ok(())
    }
}
