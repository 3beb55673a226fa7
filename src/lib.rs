//! Reader layer over a read-only columnar genomic data store.
//!
//! A [`RunSet`] groups one or more opened data sources ("runs"), scans each
//! run's REFERENCE table once into a [`ReferenceIndex`], and then serves the
//! indexed reference sequences (chromosomes/contigs) to sequence-search
//! consumers through four read paths:
//!
//! 1. a shared sequential stream of 2-bit packed bases ([`RunSet::read_packed`])
//! 2. the same stream in zero-copy page-sized chunks ([`RunSet::next_packed_chunk`])
//! 3. per-caller random access to unpacked bases ([`RandomReader::read_unpacked`])
//! 4. per-caller zero-copy chunks of unpacked bases ([`RandomReader::next_unpacked_chunk`])
//!
//! Circular references repeat once (signalled via [`ReadStatus::CircularRepeat`]),
//! and every read identifier carries a reference tag bit managed by [`ReadId`].
//! The store itself is abstracted behind the traits in [`store`]; an in-memory
//! backend ([`store::mem`]) is provided for tests and self-contained fixtures.

mod error;
mod index;
mod read_id;
mod reader;
mod run;

pub mod nuc;
pub mod store;

pub use error::{Error, IndexError, ReadError, Result, StoreError};
pub use index::{ReferenceIndex, ReferenceRecord};
pub use read_id::ReadId;
pub use reader::{
    PackedChunk, PackedChunkSlot, PackedRead, RandomRead, RandomReader, ReadStatus, UnpackedChunk,
};
pub use run::{Run, RunSet};

/// Nominal base capacity of one REFERENCE table row.
///
/// Every row of a stored reference except the last holds exactly this many
/// bases; the last row holds the remainder. Circular sizing and random-access
/// addressing both rely on this layout as a precondition.
pub const ROW_BASE_CAPACITY: u64 = 5000;
