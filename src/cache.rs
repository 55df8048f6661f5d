//! Main cache implementation.

use std::{cell::RefCell, collections::HashMap, convert::TryFrom, path::Path};

use crc::{Crc, CRC_32_ISO_HDLC};
use whirlpool::{Digest, Whirlpool};

use crate::{
    archive::FileGroup,
    checksum::{Checksum, Entry},
    codec::{Buffer, Decoded, Encoded},
    error::ReadError,
    meta::ReferenceTable,
    store::FileStore,
    util::djb2,
    REFERENCE_TABLE_ID,
};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Main cache struct providing basic utilities.
///
/// Opening a cache eagerly decodes the reference table of every data-plane
/// index from the meta index; a single malformed table aborts the open. The
/// tables stay immutable for the cache's lifetime, and all handles are
/// released when the cache is dropped.
///
/// A `Cache` is single-threaded by design; wrap it in a mutex to share it.
#[derive(Debug)]
pub struct Cache {
    store: FileStore,
    tables: HashMap<u8, ReferenceTable>,
    xteas: HashMap<u32, [u32; 4]>,
    names: RefCell<HashMap<(u8, i32), i32>>,
}

impl Cache {
    /// Constructs a new `Cache` without any XTEA keys.
    ///
    /// # Errors
    ///
    /// Any form of I/O error or a malformed reference table is returned as a
    /// wrapped [`Error`](crate::Error).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use js5fs::Cache;
    /// # fn main() -> js5fs::Result<()> {
    ///
    /// let cache = Cache::new("./data/cache")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        Self::with_xteas(path, HashMap::new())
    }

    /// Constructs a new `Cache` with a region id to XTEA key mapping.
    ///
    /// The keys are held for lookup through [`xtea_keys`](Self::xtea_keys);
    /// reads stay unciphered unless keys are passed to them explicitly.
    pub fn with_xteas<P: AsRef<Path>>(
        path: P,
        xteas: HashMap<u32, [u32; 4]>,
    ) -> crate::Result<Self> {
        let store = FileStore::open(path)?;

        let mut tables = HashMap::new();
        if store.has_data() {
            for index_id in 0..store.index_count() as u8 {
                let buffer = store.read(REFERENCE_TABLE_ID, index_id as u32)?;
                let table = ReferenceTable::try_from(Buffer::<Encoded>::from(buffer).decode()?)?;

                tables.insert(index_id, table);
            }
        }

        Ok(Self {
            store,
            tables,
            xteas,
            names: RefCell::new(HashMap::new()),
        })
    }

    /// Reads an archive and unwraps its payload envelope.
    ///
    /// The returned buffer carries the plain data together with the version
    /// the producer stamped, if any.
    ///
    /// # Errors
    ///
    /// Index 255 is refused here; reference tables are decoded at open time
    /// and raw reads of them go through the [`FileStore`]. Lookup failures
    /// return [`ReadError`](crate::error::ReadError) variants, and payloads
    /// that fail to decode surface their codec error. A failed read leaves
    /// the cache usable.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use js5fs::Cache;
    /// # fn main() -> js5fs::Result<()> {
    /// let cache = Cache::new("./data/cache")?;
    ///
    /// let index_id = 2; // Config index.
    /// let archive_id = 10;
    ///
    /// let buffer = cache.read(index_id, archive_id, None)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn read(
        &self,
        index_id: u8,
        archive_id: u32,
        keys: Option<[u32; 4]>,
    ) -> crate::Result<Buffer<Decoded>> {
        if index_id == REFERENCE_TABLE_ID {
            return Err(ReadError::ReferenceTableRestricted.into());
        }

        let mut buffer = Buffer::<Encoded>::from(self.store.read(index_id, archive_id)?);
        if let Some(keys) = keys {
            buffer = buffer.with_xtea_keys(keys);
        }

        buffer.decode()
    }

    /// Reads a single file out of a multi-file archive.
    ///
    /// The file count comes from the archive's reference table entry; the
    /// archive is decoded as a [`FileGroup`] and the requested file's bytes
    /// are handed back.
    pub fn read_file(
        &self,
        index_id: u8,
        archive_id: u32,
        file_id: u32,
        keys: Option<[u32; 4]>,
    ) -> crate::Result<Vec<u8>> {
        let entry = self
            .reference_table(index_id)?
            .entry(archive_id)
            .ok_or(ReadError::ArchiveNotFound {
                idx: index_id,
                arc: archive_id,
            })?;

        let capacity = entry.capacity();
        if file_id as usize >= capacity {
            return Err(ReadError::FileNotFound {
                idx: index_id,
                arc: archive_id,
                file: file_id,
            }
            .into());
        }

        let data = self.read(index_id, archive_id, keys)?;
        let group = FileGroup::from_buffer(data.as_ref(), capacity)?;

        let file = group
            .into_iter()
            .nth(file_id as usize)
            .ok_or(ReadError::FileNotFound {
                idx: index_id,
                arc: archive_id,
                file: file_id,
            })?;

        Ok(file.data)
    }

    /// Resolves an archive name to its id within the given index.
    ///
    /// Hashes the name and queries the reference table's identifier table;
    /// -1 when no archive carries the name. Results are memoised per cache
    /// instance.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use js5fs::Cache;
    /// # fn main() -> js5fs::Result<()> {
    /// # let cache = Cache::new("./data/cache")?;
    /// let archive_id = cache.archive_id_by_name(10, "huffman")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn archive_id_by_name<T: AsRef<str>>(&self, index_id: u8, name: T) -> crate::Result<i32> {
        let table = self.reference_table(index_id)?;
        let hash = djb2::hash(name);

        if let Some(&archive_id) = self.names.borrow().get(&(index_id, hash)) {
            return Ok(archive_id);
        }

        let archive_id = table.archive_id(hash);
        self.names.borrow_mut().insert((index_id, hash), archive_id);

        Ok(archive_id)
    }

    /// Creates a [`Checksum`] over every index, for the update protocol.
    ///
    /// Per index the still-encoded reference table archive is crc'd and
    /// whirlpool-digested; version, file count and total size come from the
    /// decoded table. A cache without data yields zeroed entries.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use js5fs::Cache;
    /// # fn main() -> js5fs::Result<()> {
    /// # let cache = Cache::new("./data/cache")?;
    /// let checksum = cache.create_checksum()?;
    /// let buffer = checksum.encode();
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_checksum(&self) -> crate::Result<Checksum> {
        let mut checksum = Checksum::new(self.store.index_count());

        for index_id in 0..self.store.index_count() as u32 {
            if !self.store.has_data() {
                checksum.push(Entry::default());
                continue;
            }

            let buffer = self.store.read(REFERENCE_TABLE_ID, index_id)?;
            let table = &self.tables[&(index_id as u8)];

            let mut hasher = Whirlpool::new();
            hasher.update(&buffer);
            let mut whirlpool = [0; 64];
            whirlpool.copy_from_slice(hasher.finalize().as_slice());

            checksum.push(Entry {
                crc: CRC32.checksum(&buffer),
                version: table.version as u32,
                file_count: table.capacity() as u32,
                size: table.total_size() as u32,
                whirlpool,
            });
        }

        Ok(checksum)
    }

    pub fn reference_table(&self, index_id: u8) -> crate::Result<&ReferenceTable> {
        let table = self
            .tables
            .get(&index_id)
            .ok_or(ReadError::IndexNotFound(index_id))?;

        Ok(table)
    }

    /// The number of data-plane index files.
    pub fn index_count(&self) -> usize {
        self.store.index_count()
    }

    /// The XTEA keys registered for the given region id.
    pub fn xtea_keys(&self, region: u32) -> Option<[u32; 4]> {
        self.xteas.get(&region).copied()
    }

    pub const fn store(&self) -> &FileStore {
        &self.store
    }
}
