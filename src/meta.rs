//! Reference tables: the per-index metadata describing every archive.
//!
//! One reference table lives in the meta index (255) per data-plane index.
//! It records which archive ids exist, their crcs, versions, optional name
//! identifiers, whirlpool digests and sizes, and the per-archive file sets.
//! The id sets are delta-encoded; presence of the optional columns is gated
//! by the flag byte.

use std::collections::{btree_map, BTreeMap};

use itertools::izip;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_big_array::big_array;
#[cfg(feature = "serde")]
big_array! { BigArray; }

use nom::{
    bytes::complete::take,
    combinator::cond,
    multi::many_m_n,
    number::complete::{be_i32, be_u16, be_u8},
    sequence::pair,
};

use crate::codec::{Buffer, Decoded};
use crate::error::ParseError;
use crate::parse::{be_u32_smart, put_u32_smart};

/// Entries carry name identifiers.
pub const FLAG_IDENTIFIERS: u8 = 0x01;
/// Entries carry 64-byte whirlpool digests.
pub const FLAG_WHIRLPOOL: u8 = 0x02;
/// Entries carry compressed/decompressed sizes.
pub const FLAG_SIZES: u8 = 0x04;
/// Entries carry an extra hash column.
pub const FLAG_HASH: u8 = 0x08;

/// Metadata for every archive of one index.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct ReferenceTable {
    pub format: u8,
    pub version: i32,
    pub flags: u8,
    entries: BTreeMap<u32, Entry>,
    identifiers: Option<Identifiers>,
}

/// Metadata on a single archive.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Entry {
    pub id: u32,
    /// Zero-based position in declaration order.
    pub slot: usize,
    pub identifier: i32,
    pub crc: i32,
    pub hash: i32,
    #[cfg_attr(feature = "serde", serde(with = "BigArray"))]
    pub whirlpool: [u8; 64],
    pub compressed: i32,
    pub uncompressed: i32,
    pub version: i32,
    files: BTreeMap<u32, FileEntry>,
    file_identifiers: Option<Identifiers>,
}

/// Metadata on a single file within an archive.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FileEntry {
    pub id: u32,
    pub slot: usize,
    pub identifier: i32,
}

impl ReferenceTable {
    pub fn new(format: u8, version: i32, flags: u8) -> Self {
        Self {
            format,
            version,
            flags,
            entries: BTreeMap::new(),
            identifiers: None,
        }
    }

    /// Decodes a reference table from its (already unwrapped) buffer.
    ///
    /// # Errors
    ///
    /// Fails on formats outside `5..=7` and on truncated buffers.
    pub fn decode(buffer: &[u8]) -> crate::Result<Self> {
        let (buffer, format) = be_u8(buffer)?;
        if !(5..=7).contains(&format) {
            return Err(ParseError::Format(format).into());
        }
        let (buffer, version) = cond(format >= 6, be_i32)(buffer)?;
        let version = version.unwrap_or(0);
        let (buffer, flags) = be_u8(buffer)?;

        let identified = flags & FLAG_IDENTIFIERS != 0;
        let whirlpooled = flags & FLAG_WHIRLPOOL != 0;
        let sized = flags & FLAG_SIZES != 0;
        let hashed = flags & FLAG_HASH != 0;

        let (buffer, entry_count) = parse_count(buffer, format)?;
        let (buffer, ids) = parse_ids(buffer, format, entry_count)?;
        let capacity = ids.last().map_or(0, |&id| id as usize + 1);

        let (buffer, identifier_col) =
            cond(identified, many_m_n(entry_count, entry_count, be_i32))(buffer)?;
        let (buffer, crcs) = many_m_n(entry_count, entry_count, be_i32)(buffer)?;
        let (buffer, hashes) = cond(hashed, many_m_n(entry_count, entry_count, be_i32))(buffer)?;
        let (buffer, whirlpools) = parse_whirlpools(buffer, whirlpooled, entry_count)?;
        let (buffer, sizes) = cond(
            sized,
            many_m_n(entry_count, entry_count, pair(be_i32, be_i32)),
        )(buffer)?;
        let (buffer, versions) = many_m_n(entry_count, entry_count, be_i32)(buffer)?;

        let (mut buffer, file_counts) = parse_counts(buffer, format, entry_count)?;
        let mut file_ids = Vec::with_capacity(entry_count);
        for &count in &file_counts {
            let (buf, ids) = parse_ids(buffer, format, count)?;
            buffer = buf;
            file_ids.push(ids);
        }

        let identifiers = identified.then(|| {
            let mut dense = vec![0; capacity];
            for (&id, &identifier) in ids.iter().zip(identifier_col.iter().flatten()) {
                dense[id as usize] = identifier;
            }

            Identifiers::new(&dense)
        });

        let mut file_sets = Vec::with_capacity(entry_count);
        for ids in &file_ids {
            let mut files: BTreeMap<u32, FileEntry> = ids
                .iter()
                .enumerate()
                .map(|(slot, &id)| {
                    (
                        id,
                        FileEntry {
                            id,
                            slot,
                            identifier: -1,
                        },
                    )
                })
                .collect();

            let file_identifiers = if identified {
                let file_capacity = ids.last().map_or(0, |&id| id as usize + 1);
                let mut dense = vec![0; file_capacity];
                for &id in ids {
                    let (buf, identifier) = be_i32(buffer)?;
                    buffer = buf;

                    if let Some(file) = files.get_mut(&id) {
                        file.identifier = identifier;
                    }
                    dense[id as usize] = identifier;
                }

                Some(Identifiers::new(&dense))
            } else {
                None
            };

            file_sets.push((files, file_identifiers));
        }

        let identifier_col = identifier_col.unwrap_or_else(|| vec![-1; entry_count]);
        let hashes = hashes.unwrap_or_else(|| vec![0; entry_count]);
        let sizes = sizes.unwrap_or_else(|| vec![(0, 0); entry_count]);

        let mut entries = BTreeMap::new();
        let columns = izip!(
            ids,
            identifier_col,
            crcs,
            hashes,
            whirlpools,
            sizes,
            versions,
            file_sets
        );
        for (slot, row) in columns.enumerate() {
            let (
                id,
                identifier,
                crc,
                hash,
                whirlpool,
                (compressed, uncompressed),
                version,
                (files, file_identifiers),
            ) = row;

            entries.insert(
                id,
                Entry {
                    id,
                    slot,
                    identifier,
                    crc,
                    hash,
                    whirlpool,
                    compressed,
                    uncompressed,
                    version,
                    files,
                    file_identifiers,
                },
            );
        }

        Ok(Self {
            format,
            version,
            flags,
            entries,
            identifiers,
        })
    }

    /// Encodes the table into the exact byte form [`decode`](Self::decode)
    /// accepts.
    ///
    /// Formats 5 and 6 address ids and counts as `u16`; callers picking
    /// those formats keep their ids within that range.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.push(self.format);
        if self.format >= 6 {
            buffer.extend(&self.version.to_be_bytes());
        }
        buffer.push(self.flags);

        put_count(&mut buffer, self.format, self.entries.len());
        let mut previous = 0;
        for &id in self.entries.keys() {
            put_count(&mut buffer, self.format, (id - previous) as usize);
            previous = id;
        }

        if self.flags & FLAG_IDENTIFIERS != 0 {
            for entry in self.entries.values() {
                buffer.extend(&entry.identifier.to_be_bytes());
            }
        }
        for entry in self.entries.values() {
            buffer.extend(&entry.crc.to_be_bytes());
        }
        if self.flags & FLAG_HASH != 0 {
            for entry in self.entries.values() {
                buffer.extend(&entry.hash.to_be_bytes());
            }
        }
        if self.flags & FLAG_WHIRLPOOL != 0 {
            for entry in self.entries.values() {
                buffer.extend(&entry.whirlpool);
            }
        }
        if self.flags & FLAG_SIZES != 0 {
            for entry in self.entries.values() {
                buffer.extend(&entry.compressed.to_be_bytes());
                buffer.extend(&entry.uncompressed.to_be_bytes());
            }
        }
        for entry in self.entries.values() {
            buffer.extend(&entry.version.to_be_bytes());
        }

        for entry in self.entries.values() {
            put_count(&mut buffer, self.format, entry.files.len());
        }
        for entry in self.entries.values() {
            let mut previous = 0;
            for &id in entry.files.keys() {
                put_count(&mut buffer, self.format, (id - previous) as usize);
                previous = id;
            }
        }
        if self.flags & FLAG_IDENTIFIERS != 0 {
            for entry in self.entries.values() {
                for file in entry.files.values() {
                    buffer.extend(&file.identifier.to_be_bytes());
                }
            }
        }

        buffer
    }

    /// Adds an entry, assigning it the next declaration slot.
    pub fn insert(&mut self, mut entry: Entry) {
        entry.slot = self.entries.len();
        self.entries.insert(entry.id, entry);
    }

    pub fn entry(&self, id: u32) -> Option<&Entry> {
        self.entries.get(&id)
    }

    /// One past the highest archive id, or 0 for an empty table.
    pub fn capacity(&self) -> usize {
        self.entries
            .keys()
            .next_back()
            .map_or(0, |&id| id as usize + 1)
    }

    /// Sum of the decompressed archive sizes, narrowed with wraparound.
    pub fn total_size(&self) -> i32 {
        self.entries
            .values()
            .map(|entry| entry.uncompressed as i64)
            .sum::<i64>() as i32
    }

    /// Resolves a name identifier to its archive id, -1 when absent.
    pub fn archive_id(&self, identifier: i32) -> i32 {
        self.identifiers
            .as_ref()
            .map_or(-1, |identifiers| identifiers.lookup(identifier))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, u32, Entry> {
        self.entries.iter()
    }
}

impl std::convert::TryFrom<Buffer<Decoded>> for ReferenceTable {
    type Error = crate::error::Error;

    fn try_from(buffer: Buffer<Decoded>) -> Result<Self, Self::Error> {
        Self::decode(buffer.as_slice())
    }
}

impl IntoIterator for ReferenceTable {
    type Item = (u32, Entry);
    type IntoIter = btree_map::IntoIter<u32, Entry>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReferenceTable {
    type Item = (&'a u32, &'a Entry);
    type IntoIter = btree_map::Iter<'a, u32, Entry>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Entry {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Adds a file entry, assigning it the next declaration slot.
    pub fn insert_file(&mut self, id: u32, identifier: i32) {
        let slot = self.files.len();
        self.files.insert(
            id,
            FileEntry {
                id,
                slot,
                identifier,
            },
        );
    }

    pub fn file(&self, id: u32) -> Option<&FileEntry> {
        self.files.get(&id)
    }

    /// One past the highest file id, or 0 when the archive has no files.
    pub fn capacity(&self) -> usize {
        self.files
            .keys()
            .next_back()
            .map_or(0, |&id| id as usize + 1)
    }

    /// Resolves a name identifier to its file id, -1 when absent.
    pub fn file_id(&self, identifier: i32) -> i32 {
        self.file_identifiers
            .as_ref()
            .map_or(-1, |identifiers| identifiers.lookup(identifier))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn files(&self) -> btree_map::Iter<'_, u32, FileEntry> {
        self.files.iter()
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            id: 0,
            slot: 0,
            identifier: -1,
            crc: 0,
            hash: 0,
            whirlpool: [0; 64],
            compressed: 0,
            uncompressed: 0,
            version: 0,
            files: BTreeMap::new(),
            file_identifiers: None,
        }
    }
}

/// Open-addressed name lookup table, stored flat as `key, value` pairs.
///
/// The probe space is sized so the load factor stays at or below two thirds,
/// then doubled once more. Both steps feed the probe masks; insertion masks
/// on half the pair count and lookup recomputes the same mask from the
/// table length, so the two always agree.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Identifiers {
    table: Vec<i32>,
}

impl Identifiers {
    /// Builds the table over a dense identifier array indexed by id; ids
    /// absent from the declaration keep identifier 0.
    pub fn new(identifiers: &[i32]) -> Self {
        let len = identifiers.len();
        let half = len >> 1;

        let mut mask = 1;
        let mut size = 2;
        let mut i = 1;
        while i <= len + half {
            mask = i;
            size = i << 1;
            i <<= 1;
        }
        mask <<= 1;
        size <<= 1;

        let mut table = vec![-1; size + size];
        for (id, &identifier) in identifiers.iter().enumerate() {
            let mut slot = (identifier & (mask as i32 - 1)) as usize;
            while table[slot + slot + 1] != -1 {
                slot = (slot + 1) & (mask - 1);
            }
            table[slot + slot] = identifier;
            table[slot + slot + 1] = id as i32;
        }

        Self { table }
    }

    /// Probes for the identifier; returns its id or -1 when absent.
    pub fn lookup(&self, identifier: i32) -> i32 {
        let mask = (self.table.len() >> 2) - 1;
        let mut slot = (identifier & mask as i32) as usize;

        loop {
            let value = self.table[slot + slot + 1];
            if value == -1 {
                return -1;
            }
            if self.table[slot + slot] == identifier {
                return value;
            }
            slot = (slot + 1) & mask;
        }
    }
}

fn parse_count(buffer: &[u8], format: u8) -> crate::Result<(&[u8], usize)> {
    let (buffer, value) = if format >= 7 {
        be_u32_smart(buffer)?
    } else {
        let (buf, value) = be_u16(buffer)?;
        (buf, value as u32)
    };

    Ok((buffer, value as usize))
}

fn parse_counts(buffer: &[u8], format: u8, count: usize) -> crate::Result<(&[u8], Vec<usize>)> {
    let mut counts = Vec::with_capacity(count);
    let mut buffer = buffer;
    for _ in 0..count {
        let (buf, value) = parse_count(buffer, format)?;
        buffer = buf;
        counts.push(value);
    }

    Ok((buffer, counts))
}

fn parse_ids(buffer: &[u8], format: u8, count: usize) -> crate::Result<(&[u8], Vec<u32>)> {
    let (buffer, deltas) = if format >= 7 {
        many_m_n(count, count, be_u32_smart)(buffer)?
    } else {
        let (buf, deltas) = many_m_n(count, count, be_u16)(buffer)?;
        (buf, deltas.iter().map(|&delta| delta as u32).collect())
    };

    let mut ids = Vec::with_capacity(count);
    let mut id = 0;
    for delta in deltas {
        id += delta;
        ids.push(id);
    }

    Ok((buffer, ids))
}

fn parse_whirlpools(
    buffer: &[u8],
    whirlpooled: bool,
    count: usize,
) -> crate::Result<(&[u8], Vec<[u8; 64]>)> {
    let (buffer, taken) = cond(whirlpooled, take(count * 64))(buffer)?;
    let mut whirlpools = vec![[0; 64]; count];

    for (index, chunk) in taken.unwrap_or(&[]).chunks_exact(64).enumerate() {
        whirlpools[index].copy_from_slice(chunk);
    }

    Ok((buffer, whirlpools))
}

fn put_count(buffer: &mut Vec<u8>, format: u8, value: usize) {
    if format >= 7 {
        put_u32_smart(buffer, value as u32);
    } else {
        debug_assert!(value <= u16::MAX as usize);
        buffer.extend(&(value as u16).to_be_bytes());
    }
}
