//! Read/write virtual file types for JS5 game asset caches.
//!
//! A cache packs tens of thousands of compressed, optionally enciphered
//! archives into a handful of flat files: one data file
//! (`main_file_cache.dat2`) holding 520-byte chained sectors, up to 255
//! index files (`main_file_cache.idxN`) of 6-byte records pointing into it,
//! and a meta index (`main_file_cache.idx255`) whose archives are the
//! reference tables describing everything else.
//!
//! The crate is layered the same way the format is:
//!
//! - [`FileStore`]/[`Dat2`] gather an archive's raw bytes from its sector
//!   chain,
//! - [`codec`] unwraps the compression/XTEA/version envelope around them,
//! - [`FileGroup`](archive::FileGroup) splits a multi-file archive into its
//!   members and [`ReferenceTable`](meta::ReferenceTable) describes them,
//! - [`Cache`] wires it all together and produces the update-protocol
//!   [`Checksum`](checksum::Checksum).
//!
//! # Quick Start
//!
//! ```no_run
//! use js5fs::Cache;
//!
//! # fn main() -> js5fs::Result<()> {
//! let cache = Cache::new("./data/cache")?;
//!
//! let index_id = 2; // Config index.
//! let archive_id = 10;
//!
//! let buffer = cache.read(index_id, archive_id, None)?;
//! # Ok(())
//! # }
//! ```
//!
//! No cache data ships with this crate; the data these formats carry is
//! copyrighted by its publisher.

#![deny(
    clippy::all,
    clippy::correctness,
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf
)]

pub mod archive;
mod cache;
pub mod checksum;
pub mod codec;
pub mod error;
mod index;
pub mod meta;
pub mod parse;
mod sector;
mod store;
pub mod util;
pub mod xtea;

#[doc(inline)]
pub use error::{Error, Result};

pub use archive::{ArchiveRef, FileData, FileGroup};
pub use cache::Cache;
pub use index::{Index, Indices};
pub use sector::{Sector, SectorHeader, SectorHeaderSize};
pub use store::{Dat2, FileStore};

/// Main data name.
pub const MAIN_DATA: &str = "main_file_cache.dat2";
/// Reference table id.
pub const REFERENCE_TABLE_ID: u8 = 255;
