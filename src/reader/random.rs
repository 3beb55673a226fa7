//! Random access into individual references, one base per byte.
//!
//! Each [`RandomReader`] is owned by exactly one caller and carries its own
//! store cursor, so no locking is involved; any number of readers may address
//! the same read-only runs concurrently. The reader caches its cursor per
//! target reference and, for the zero-copy form, at most one page at a time.

use tracing::error;

use crate::reader::{aggregate_rows, ReadStatus};
use crate::store::{Blob, BlobOf, Cursor, CursorOf, Store, Table, COL_READ_UNPACKED};
use crate::{ReadError, ReadId, Result, RunSet, ROW_BASE_CAPACITY};

/// Outcome of one random-access copy read.
#[derive(Debug)]
pub struct RandomRead {
    /// Bytes written to the caller's buffer, one base each.
    pub bytes: usize,
    pub status: ReadStatus,
}

/// One zero-copy span of an unpacked reference.
#[derive(Debug)]
pub struct UnpackedChunk<'a> {
    /// The span's bases, one per byte; valid until the reader's next call.
    pub data: &'a [u8],
    pub status: ReadStatus,
}

/// A per-caller random-access reader over a run-set's references.
pub struct RandomReader<'rs, S: Store> {
    set: &'rs RunSet<S>,
    cursor: Option<CursorOf<S>>,
    /// Logical reference the cached cursor serves.
    target: Option<u64>,
    /// The one live page of the zero-copy walk.
    blob: Option<BlobOf<S>>,
    /// Next row of the zero-copy walk; `None` before it starts.
    row: Option<i64>,
    second_pass: bool,
}

impl<'rs, S: Store> RandomReader<'rs, S> {
    pub(crate) fn new(set: &'rs RunSet<S>) -> Self {
        Self {
            set,
            cursor: None,
            target: None,
            blob: None,
            row: None,
            second_pass: false,
        }
    }

    /// Copies bases of reference `id` starting at `starting_base` into `buf`.
    ///
    /// For circular references a `starting_base` at or past the base count
    /// addresses the repeat pass; reaching the end of the first pass reports
    /// `CircularRepeat`. Addressing past the end of a non-circular reference
    /// produces zero bytes.
    pub fn read_unpacked(
        &mut self,
        id: ReadId,
        starting_base: u64,
        buf: &mut [u8],
    ) -> Result<RandomRead> {
        let slot = self.retarget(id)?;
        let refs = self.set.reference_index()?;
        let rec = refs.get(slot).expect("slot bounds checked by retarget");

        let mut starting_base = starting_base;
        let mut second_pass = false;
        if rec.circular() {
            let base_count = rec
                .base_count()
                .ok_or(ReadError::UnsizedCircular(slot))?;
            if starting_base >= base_count {
                starting_base -= base_count;
                second_pass = true;
            }
        }

        let mut row = rec.first_row() + (starting_base / ROW_BASE_CAPACITY) as i64;
        if row >= rec.end_row() {
            return Ok(RandomRead {
                bytes: 0,
                status: ReadStatus::Ok,
            });
        }
        let mut start = (starting_base % ROW_BASE_CAPACITY) as u32;

        let cursor = self.cursor.as_ref().expect("cursor cached by retarget");
        let mut total = 0usize;
        let mut status = ReadStatus::Ok;
        while total < buf.len() {
            let got = cursor
                .read_bits(row, 0, 8, start, &mut buf[total..])
                .map_err(|err| {
                    error!(row, %err, "unpacked READ failed");
                    err
                })?;
            total += got.num_read as usize;
            if total >= buf.len() || got.remaining > 0 {
                break;
            }
            row += 1;
            if row >= rec.end_row() {
                if rec.circular() && !second_pass {
                    status = ReadStatus::CircularRepeat;
                }
                break;
            }
            start = 0;
        }
        Ok(RandomRead {
            bytes: total,
            status,
        })
    }

    /// Serves the next zero-copy span of reference `id`.
    ///
    /// Walks the reference page by page from its first row, repeating once
    /// for circular references; returns `Ok(None)` when the walk is done.
    /// Addressing a different reference restarts the walk there. The
    /// previous page is released before the next is fetched.
    pub fn next_unpacked_chunk(&mut self, id: ReadId) -> Result<Option<UnpackedChunk<'_>>> {
        let slot = self.retarget(id)?;
        let refs = self.set.reference_index()?;
        let rec = refs.get(slot).expect("slot bounds checked by retarget");

        self.blob = None;
        let start_row = self.row.unwrap_or(rec.first_row());
        if start_row >= rec.end_row() {
            return Ok(None);
        }

        let cursor = self.cursor.as_ref().expect("cursor cached by retarget");
        let blob = cursor.blob(start_row, 0).map_err(|err| {
            error!(row = start_row, %err, "unpacked READ page fetch failed");
            err
        })?;
        let (first, count) = blob.row_range();
        if start_row < first || start_row >= first + count as i64 {
            return Err(ReadError::RowNotInBlob {
                row: start_row,
                first,
                count,
            }
            .into());
        }
        if first > rec.end_row() {
            return Err(ReadError::BlobPastReference {
                page_first: first,
                reference_end: rec.end_row(),
            }
            .into());
        }

        let last = (first + count as i64).min(rec.end_row());
        let (bytes, next_row) = aggregate_rows(&blob, start_row, last, 8)?;

        let status = if next_row < rec.end_row() {
            self.row = Some(next_row);
            ReadStatus::Chunked
        } else if rec.circular() && !self.second_pass {
            self.second_pass = true;
            self.row = Some(rec.first_row());
            ReadStatus::CircularRepeat
        } else {
            self.row = Some(next_row);
            ReadStatus::Ok
        };

        self.blob = Some(blob);
        let page = self.blob.as_ref().expect("page stored above");
        let cell = page.cell(start_row)?;
        if cell.bit_offset != 0 {
            return Err(ReadError::UnalignedCell(start_row).into());
        }
        let need = bytes as usize;
        if cell.data.len() < need {
            return Err(ReadError::ShortPage {
                row: start_row,
                have: cell.data.len() as u64 * 8,
                need: bytes * 8,
            }
            .into());
        }
        Ok(Some(UnpackedChunk {
            data: &cell.data[..need],
            status,
        }))
    }

    /// Resolves `id` to its index slot, repointing the cached cursor when the
    /// target reference changed.
    fn retarget(&mut self, id: ReadId) -> Result<usize> {
        let refs = self.set.reference_index()?;
        let logical = id.reference_index()?;
        if logical >= refs.len() as u64 {
            return Err(ReadError::OutOfRange {
                requested: logical,
                available: refs.len() as u64,
            }
            .into());
        }
        if self.target != Some(logical) {
            // release before opening: at most one cursor and one page live
            self.blob = None;
            self.cursor = None;
            self.row = None;
            self.second_pass = false;
            self.target = None;

            let rec = refs.get(logical as usize).expect("bounds checked above");
            let run = self
                .set
                .runs()
                .get(rec.run_index())
                .ok_or(ReadError::RunOutOfRange {
                    run_index: rec.run_index(),
                    runs: self.set.runs().len(),
                })?;
            let cursor = run.reference_table()?.read_cursor(&[COL_READ_UNPACKED])?;
            self.cursor = Some(cursor);
            self.target = Some(logical);
        }
        Ok(logical as usize)
    }
}
