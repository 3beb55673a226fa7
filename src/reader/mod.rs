//! The four reference read paths.
//!
//! [`sequential`] walks every reference of the run-set through one shared,
//! mutex-guarded stream cursor (2-bit packed, copy and zero-copy forms).
//! [`random`] serves direct `(read_id, starting_base)` addressing through
//! per-caller cursors (unpacked, copy and zero-copy forms). Both families
//! share the same position machine: stay inside a row until it or the output
//! buffer is exhausted, advance row by row, rewind once for circular
//! references, then move to the next reference or finish.

mod random;
mod sequential;

pub use random::{RandomRead, RandomReader, UnpackedChunk};
pub use sequential::{PackedChunk, PackedChunkSlot, PackedRead};

pub(crate) use sequential::StreamState;

use crate::store::Blob;
use crate::{ReadError, Result};

/// Non-error outcome of a read call.
///
/// Anything other than `Ok` asks the caller to follow up: `CircularRepeat`
/// and `Chunked` mean the same logical sequence continues on the next call,
/// `EndOfStream` means the stream is drained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// Data produced, nothing special to report.
    Ok,
    /// The first pass of a circular reference just finished; the next call
    /// replays the same reference from its start.
    CircularRepeat,
    /// The logical read continues in the next page.
    Chunked,
    /// No references remain.
    EndOfStream,
}

/// Sums the row lengths of `[start, end)` as long as the rows form one
/// physically contiguous element stream inside the page, returning the
/// element total and the first row not merged.
///
/// Aggregation stops (without error) at the first discontinuity; the caller
/// resumes there on its next call.
pub(crate) fn aggregate_rows<B: Blob>(
    blob: &B,
    start: i64,
    end: i64,
    elem_bits: u32,
) -> Result<(u64, i64)> {
    let first = blob.cell(start)?;
    if first.elem_bits != elem_bits {
        return Err(ReadError::ElementShape {
            row: start,
            expected: elem_bits,
            found: first.elem_bits,
        }
        .into());
    }
    let origin = first.data.as_ptr() as u64 * 8 + u64::from(first.bit_offset);
    let mut total = u64::from(first.len);
    let mut row = start + 1;
    while row < end {
        let cell = blob.cell(row)?;
        if cell.elem_bits != elem_bits {
            return Err(ReadError::ElementShape {
                row,
                expected: elem_bits,
                found: cell.elem_bits,
            }
            .into());
        }
        let pos = cell.data.as_ptr() as u64 * 8 + u64::from(cell.bit_offset);
        if pos != origin + total * u64::from(elem_bits) {
            break;
        }
        total += u64::from(cell.len);
        row += 1;
    }
    Ok((total, row))
}
