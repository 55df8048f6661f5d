#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const SECTOR_SIZE: usize = 520;

/// Lays out `main_file_cache.dat2` and the index files the way the game's
/// own updater does, so the crate's readers can be exercised against an
/// independently written cache.
#[derive(Default)]
pub struct CacheWriter {
    data: Vec<u8>,
    indices: BTreeMap<u8, Vec<u8>>,
}

impl CacheWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an archive as a fresh sector chain and records it in its
    /// index file.
    pub fn put(&mut self, index_id: u8, archive_id: u32, data: &[u8]) {
        let expanded = archive_id > u16::MAX as u32;
        let data_len = if expanded { 510 } else { 512 };
        let first_sector = self.data.len() / SECTOR_SIZE;

        let chunks: Vec<&[u8]> = data.chunks(data_len).collect();
        for (chunk_id, chunk) in chunks.iter().enumerate() {
            let current = self.data.len() / SECTOR_SIZE;
            let next = if chunk_id + 1 == chunks.len() {
                0
            } else {
                current + 1
            };

            let mut sector = Vec::with_capacity(SECTOR_SIZE);
            if expanded {
                sector.extend(&archive_id.to_be_bytes());
            } else {
                sector.extend(&(archive_id as u16).to_be_bytes());
            }
            sector.extend(&(chunk_id as u16).to_be_bytes());
            sector.extend(&(next as u32).to_be_bytes()[1..]);
            sector.push(index_id);
            sector.extend(*chunk);
            sector.resize(SECTOR_SIZE, 0);

            self.data.extend(sector);
        }

        let index = self.indices.entry(index_id).or_default();
        let offset = archive_id as usize * 6;
        if index.len() < offset + 6 {
            index.resize(offset + 6, 0);
        }
        index[offset..offset + 3].copy_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
        index[offset + 3..offset + 6].copy_from_slice(&(first_sector as u32).to_be_bytes()[1..]);
    }

    /// Writes the cache into `dir`, filling index file gaps below the
    /// highest data-plane id and guaranteeing an idx255.
    pub fn write_to(&self, dir: &Path) {
        fs::write(dir.join("main_file_cache.dat2"), &self.data).unwrap();

        let max_data_index = self
            .indices
            .keys()
            .filter(|&&id| id != 255)
            .max()
            .copied()
            .unwrap_or(0);
        for index_id in 0..=max_data_index {
            let buffer = self.indices.get(&index_id).cloned().unwrap_or_default();
            fs::write(dir.join(format!("main_file_cache.idx{}", index_id)), buffer).unwrap();
        }

        let reference = self.indices.get(&255).cloned().unwrap_or_default();
        fs::write(dir.join("main_file_cache.idx255"), reference).unwrap();
    }
}
