//! Sequential packed stream over every reference of a run-set.
//!
//! One shared cursor walks the whole reference index in order, producing one
//! continuous 2-bit packed stream. The cursor lives in the run-set behind a
//! mutex held for the full duration of each call, so concurrent callers are
//! serialized and each observes strictly increasing stream consumption.

use tracing::error;

use crate::reader::{aggregate_rows, ReadStatus};
use crate::store::{Blob, BlobOf, Cursor, CursorOf, Store, Table, COL_READ_PACKED};
use crate::{ReadError, ReadId, ReferenceIndex, ReferenceRecord, Result, RunSet};

/// The shared sequential stream position.
///
/// `slot` is the index-slot being read; `resume` is the slot the next call
/// should be reading. The two differ by exactly one while a finished
/// reference waits for the next call to advance past it; any larger gap is an
/// internal inconsistency.
pub(crate) struct StreamState<S: Store> {
    slot: usize,
    resume: u64,
    /// Current row; `None` until the first call positions the stream.
    row: Option<i64>,
    /// Intra-row base offset left by a buffer-filling partial read.
    base: u64,
    /// Set while replaying a circular reference's second pass.
    second_pass: bool,
    eos: bool,
    /// Run the open cursor belongs to; same-run transitions reuse it.
    run: Option<usize>,
    cursor: Option<CursorOf<S>>,
}

impl<S: Store> StreamState<S> {
    pub(crate) fn new() -> Self {
        Self {
            slot: 0,
            resume: 0,
            row: None,
            base: 0,
            second_pass: false,
            eos: false,
            run: None,
            cursor: None,
        }
    }
}

/// Outcome of one sequential packed copy read.
#[derive(Debug)]
pub struct PackedRead {
    /// Bases written to the caller's buffer, four per byte.
    pub bases: u64,
    /// Identifier of the reference the bases belong to; `None` only at end
    /// of stream.
    pub read_id: Option<ReadId>,
    pub status: ReadStatus,
}

/// Caller-owned slot for the one live page of the zero-copy stream.
pub struct PackedChunkSlot<S: Store> {
    blob: Option<BlobOf<S>>,
}

impl<S: Store> Default for PackedChunkSlot<S> {
    fn default() -> Self {
        Self { blob: None }
    }
}

impl<S: Store> PackedChunkSlot<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// One zero-copy span of the packed stream.
#[derive(Debug)]
pub struct PackedChunk<'a> {
    /// Page bytes holding the span; valid until the slot is reused.
    pub data: &'a [u8],
    /// Offset of the first base within `data[0]`, in bits.
    pub bit_offset: u8,
    /// Span length in bases.
    pub bases: u64,
    pub read_id: ReadId,
    pub status: ReadStatus,
}

impl<S: Store> RunSet<S> {
    /// Copies the next stretch of the packed reference stream into `buf`.
    ///
    /// Each call serves bases of exactly one reference; a reference boundary,
    /// a circular rewind, or a full buffer ends the call. A full buffer is
    /// not an error: the intra-row position is kept for the next call.
    pub fn read_packed(&self, buf: &mut [u8]) -> Result<PackedRead> {
        let refs = self.reference_index()?;
        let mut state = self.stream.lock();

        let Some(slot) = self.position_stream(&mut state, refs)? else {
            return Ok(PackedRead {
                bases: 0,
                read_id: None,
                status: ReadStatus::EndOfStream,
            });
        };
        let rec = refs.get(slot).expect("positioned slot in range");
        let read_id = ReadId::for_reference(slot as u64)?;

        let capacity = buf.len() as u64 * 4;
        let mut total: u64 = 0;
        let mut status = ReadStatus::Ok;
        while total < capacity {
            let row = state.row.expect("stream positioned");
            let cursor = state.cursor.as_ref().expect("cursor open while positioned");
            let dest = &mut buf[(total / 4) as usize..];
            let got = cursor
                .read_bits(row, 0, 2, state.base as u32, dest)
                .map_err(|err| {
                    error!(row, %err, "packed READ failed");
                    err
                })?;
            total += u64::from(got.num_read);

            if got.remaining > 0 {
                // buffer filled mid-row; resume here next call
                if got.num_read == 0 {
                    return Err(ReadError::EmptyRead { row }.into());
                }
                state.base += u64::from(got.num_read);
                break;
            }

            state.base = 0;
            let next = row + 1;
            if next >= rec.end_row() {
                if rec.circular() && !state.second_pass {
                    state.second_pass = true;
                    state.row = Some(rec.first_row());
                    status = ReadStatus::CircularRepeat;
                } else {
                    state.resume = slot as u64 + 1;
                }
                break;
            }
            state.row = Some(next);
            if total % 4 != 0 {
                // only a reference's final row may end off byte alignment
                return Err(ReadError::UnalignedRowBoundary { row, bases: total }.into());
            }
        }

        Ok(PackedRead {
            bases: total,
            read_id: Some(read_id),
            status,
        })
    }

    /// Serves the next zero-copy span of the packed stream.
    ///
    /// The span covers the rows of the current reference that sit physically
    /// contiguous inside one page; `Chunked` status means the reference
    /// continues in the next page. Returns `Ok(None)` once the stream is
    /// drained. The caller's slot keeps the page alive; it is released on
    /// the next call.
    pub fn next_packed_chunk<'a>(
        &self,
        slot: &'a mut PackedChunkSlot<S>,
    ) -> Result<Option<PackedChunk<'a>>> {
        let refs = self.reference_index()?;
        let mut state = self.stream.lock();
        slot.blob = None;

        let Some(slot_ix) = self.position_stream(&mut state, refs)? else {
            return Ok(None);
        };
        let rec = refs.get(slot_ix).expect("positioned slot in range");
        let read_id = ReadId::for_reference(slot_ix as u64)?;
        let start_row = state.row.expect("stream positioned");

        let cursor = state.cursor.as_ref().expect("cursor open while positioned");
        let blob = cursor.blob(start_row, 0).map_err(|err| {
            error!(row = start_row, %err, "packed READ page fetch failed");
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
        let (bases, next_row) = aggregate_rows(&blob, start_row, last, 2)?;

        let status = if next_row < rec.end_row() {
            state.row = Some(next_row);
            ReadStatus::Chunked
        } else if rec.circular() && !state.second_pass {
            state.second_pass = true;
            state.row = Some(rec.first_row());
            state.base = 0;
            ReadStatus::CircularRepeat
        } else {
            state.row = Some(next_row);
            state.resume = slot_ix as u64 + 1;
            ReadStatus::Ok
        };

        slot.blob = Some(blob);
        let page = slot.blob.as_ref().expect("page stored above");
        let cell = page.cell(start_row)?;
        let need = u64::from(cell.bit_offset) + bases * 2;
        let have = cell.data.len() as u64 * 8;
        if have < need {
            return Err(ReadError::ShortPage {
                row: start_row,
                have,
                need,
            }
            .into());
        }
        Ok(Some(PackedChunk {
            data: cell.data,
            bit_offset: cell.bit_offset,
            bases,
            read_id,
            status,
        }))
    }

    /// Positions the stream for one call: advances at most one reference,
    /// opening or reusing the store cursor, or reports end of stream.
    fn position_stream(
        &self,
        state: &mut StreamState<S>,
        refs: &ReferenceIndex,
    ) -> Result<Option<usize>> {
        if refs.is_empty() {
            state.eos = true;
        }
        if state.eos {
            return Ok(None);
        }

        if state.resume != state.slot as u64 {
            if state.resume != state.slot as u64 + 1 {
                return Err(ReadError::ReferenceSkipped {
                    at: state.slot,
                    resume: state.resume,
                }
                .into());
            }
            state.slot += 1;
            state.row = None;
            state.base = 0;
            state.second_pass = false;
            if state.slot >= refs.len() {
                state.eos = true;
                return Ok(None);
            }
        }

        if state.row.is_none() {
            let rec = refs.get(state.slot).expect("slot bounds checked above");
            self.open_stream_cursor(state, rec)?;
            state.row = Some(rec.first_row());
            state.base = 0;
        }
        Ok(Some(state.slot))
    }

    /// Opens the packed READ cursor for `rec`'s run, releasing the previous
    /// run's cursor first; transitions within one run reuse the open cursor.
    fn open_stream_cursor(&self, state: &mut StreamState<S>, rec: &ReferenceRecord) -> Result<()> {
        if state.cursor.is_some() && state.run == Some(rec.run_index()) {
            return Ok(());
        }
        state.cursor = None;
        state.run = None;
        let run = self
            .runs()
            .get(rec.run_index())
            .ok_or(ReadError::RunOutOfRange {
                run_index: rec.run_index(),
                runs: self.runs().len(),
            })?;
        let cursor = run.reference_table()?.read_cursor(&[COL_READ_PACKED])?;
        state.cursor = Some(cursor);
        state.run = Some(rec.run_index());
        Ok(())
    }
}
