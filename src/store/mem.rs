//! In-memory columnar store backend.
//!
//! Implements the [`super`] seam over plain vectors: one ASCII base per byte
//! internally, served packed or unpacked on request, with pages of a
//! configurable row width so page-boundary behavior can be exercised. Used by
//! the test suite and by embedders that want a self-contained fixture.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use crate::nuc::{self, PackedWriter};
use crate::store::{
    Blob, BitsRead, Cell, Cursor, Store, Table, COL_CIRCULAR, COL_CMP_READ, COL_READ_LEN,
    COL_READ_PACKED, COL_READ_UNPACKED, COL_SEQ_ID, TABLE_REFERENCE,
};
use crate::{Result, StoreError, ROW_BASE_CAPACITY};

const FIRST_ROW: i64 = 1;

/// Default number of rows served per page.
pub const DEFAULT_ROWS_PER_BLOB: u64 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColKind {
    SeqId,
    Circular,
    CmpRead,
    ReadLen,
    ReadPacked,
    ReadUnpacked,
}

impl ColKind {
    fn resolve(name: &str) -> Result<Self, StoreError> {
        match name {
            COL_SEQ_ID => Ok(Self::SeqId),
            COL_CIRCULAR => Ok(Self::Circular),
            COL_CMP_READ => Ok(Self::CmpRead),
            COL_READ_LEN => Ok(Self::ReadLen),
            COL_READ_PACKED => Ok(Self::ReadPacked),
            COL_READ_UNPACKED => Ok(Self::ReadUnpacked),
            other => Err(StoreError::ColumnNotFound(other.to_string())),
        }
    }

    fn elem_bits(self) -> u32 {
        match self {
            Self::ReadPacked => 2,
            Self::ReadLen => 32,
            _ => 8,
        }
    }
}

#[derive(Debug)]
struct RowData {
    seq_id: String,
    circular: [u8; 1],
    /// ASCII bases of this row.
    read: Vec<u8>,
    /// 2-bit packed form of `read`, first base in the high bits.
    packed: Vec<u8>,
    /// Whether the bases live outside this table (CMP_READ empty).
    external: bool,
    read_len: [u8; 4],
}

#[derive(Debug)]
struct TableData {
    rows: Vec<RowData>,
    rows_per_blob: u64,
    fail_read_len: bool,
}

impl TableData {
    fn row_ix(&self, row: i64) -> Result<usize, StoreError> {
        let count = self.rows.len() as u64;
        if row < FIRST_ROW || (row - FIRST_ROW) as u64 >= count {
            return Err(StoreError::RowOutOfRange {
                row,
                first: FIRST_ROW,
                count,
            });
        }
        Ok((row - FIRST_ROW) as usize)
    }

    /// The logical bytes of one cell for byte-granular columns.
    fn cell_bytes(&self, ix: usize, kind: ColKind) -> Result<&[u8], StoreError> {
        let row = &self.rows[ix];
        match kind {
            ColKind::SeqId => Ok(row.seq_id.as_bytes()),
            ColKind::Circular => Ok(&row.circular),
            ColKind::CmpRead => {
                if row.external {
                    Ok(&[])
                } else {
                    Ok(&row.read)
                }
            }
            ColKind::ReadLen => {
                if self.fail_read_len {
                    return Err(StoreError::Io(io::Error::other(
                        "simulated READ_LEN column fault",
                    )));
                }
                Ok(&row.read_len)
            }
            ColKind::ReadUnpacked => Ok(&row.read),
            ColKind::ReadPacked => Ok(&row.packed),
        }
    }

    /// Row length in elements.
    fn cell_len(&self, ix: usize, kind: ColKind) -> u32 {
        let row = &self.rows[ix];
        match kind {
            ColKind::SeqId => row.seq_id.len() as u32,
            ColKind::Circular => 1,
            ColKind::CmpRead => {
                if row.external {
                    0
                } else {
                    row.read.len() as u32
                }
            }
            ColKind::ReadLen => 1,
            ColKind::ReadPacked | ColKind::ReadUnpacked => row.read.len() as u32,
        }
    }
}

/// An in-memory read-only data source.
#[derive(Clone, Default)]
pub struct MemStore {
    tables: HashMap<String, Arc<TableData>>,
}

impl MemStore {
    /// A source exposing no tables at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    type Table = MemTable;

    fn open_table(&self, name: &str) -> Result<Self::Table, StoreError> {
        self.tables
            .get(name)
            .cloned()
            .map(|data| MemTable { data })
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}

/// A handle on one in-memory table.
#[derive(Clone, Debug)]
pub struct MemTable {
    data: Arc<TableData>,
}

impl Table for MemTable {
    type Cursor = MemCursor;

    fn read_cursor(&self, columns: &[&str]) -> Result<Self::Cursor, StoreError> {
        let cols = columns
            .iter()
            .map(|name| ColKind::resolve(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MemCursor {
            data: Arc::clone(&self.data),
            cols,
        })
    }
}

/// An opened cursor over an in-memory table.
#[derive(Debug)]
pub struct MemCursor {
    data: Arc<TableData>,
    cols: Vec<ColKind>,
}

impl MemCursor {
    fn col_kind(&self, col: usize) -> Result<ColKind, StoreError> {
        self.cols
            .get(col)
            .copied()
            .ok_or_else(|| StoreError::ColumnNotFound(format!("column slot {col}")))
    }
}

impl Cursor for MemCursor {
    type Blob = MemBlob;

    fn row_range(&self, col: usize) -> Result<(i64, u64), StoreError> {
        self.col_kind(col)?;
        Ok((FIRST_ROW, self.data.rows.len() as u64))
    }

    fn cell(&self, row: i64, col: usize) -> Result<Cell<'_>, StoreError> {
        let kind = self.col_kind(col)?;
        let ix = self.data.row_ix(row)?;
        Ok(Cell {
            data: self.data.cell_bytes(ix, kind)?,
            bit_offset: 0,
            elem_bits: kind.elem_bits(),
            len: self.data.cell_len(ix, kind),
        })
    }

    fn read_bits(
        &self,
        row: i64,
        col: usize,
        elem_bits: u32,
        start: u32,
        buf: &mut [u8],
    ) -> Result<BitsRead, StoreError> {
        let kind = self.col_kind(col)?;
        if elem_bits != kind.elem_bits() {
            return Err(StoreError::ElemSizeMismatch {
                requested: elem_bits,
                actual: kind.elem_bits(),
            });
        }
        let ix = self.data.row_ix(row)?;
        let len = self.data.cell_len(ix, kind);
        if start >= len {
            return Ok(BitsRead::default());
        }
        let due = len - start;
        if kind == ColKind::ReadPacked {
            // Repack from the requested base so output always begins at bit 0.
            let bases = &self.data.rows[ix].read;
            let capacity = (buf.len() * 4) as u32;
            let num_read = due.min(capacity);
            let mut w = PackedWriter::new();
            for &b in &bases[start as usize..(start + num_read) as usize] {
                w.push(b).map_err(|_| StoreError::InvalidBase(b))?;
            }
            let bytes = w.as_bytes();
            buf[..bytes.len()].copy_from_slice(bytes);
            return Ok(BitsRead {
                num_read,
                remaining: due - num_read,
            });
        }
        let elem_bytes = (elem_bits / 8) as usize;
        let capacity = (buf.len() / elem_bytes) as u32;
        let num_read = due.min(capacity);
        let bytes = self.data.cell_bytes(ix, kind)?;
        let lo = start as usize * elem_bytes;
        let hi = lo + num_read as usize * elem_bytes;
        buf[..hi - lo].copy_from_slice(&bytes[lo..hi]);
        Ok(BitsRead {
            num_read,
            remaining: due - num_read,
        })
    }

    fn blob(&self, row: i64, col: usize) -> Result<Self::Blob, StoreError> {
        let kind = self.col_kind(col)?;
        let ix = self.data.row_ix(row)?;
        let rpb = self.data.rows_per_blob.max(1) as usize;
        let lo = ix - ix % rpb;
        let hi = (lo + rpb).min(self.data.rows.len());

        // Pages are one continuous bit stream across their rows, so packed
        // cells of adjacent rows stay contiguous even off byte boundaries.
        let mut offsets = Vec::with_capacity(hi - lo);
        let mut lens = Vec::with_capacity(hi - lo);
        let data = if kind == ColKind::ReadPacked {
            let mut w = PackedWriter::new();
            for i in lo..hi {
                offsets.push(w.len() * 2);
                lens.push(self.data.cell_len(i, kind));
                for &b in &self.data.rows[i].read {
                    w.push(b).map_err(|_| StoreError::InvalidBase(b))?;
                }
            }
            w.into_bytes()
        } else {
            let mut bytes = Vec::new();
            for i in lo..hi {
                offsets.push(bytes.len() as u64 * 8);
                lens.push(self.data.cell_len(i, kind));
                bytes.extend_from_slice(self.data.cell_bytes(i, kind)?);
            }
            bytes
        };

        Ok(MemBlob {
            first: FIRST_ROW + lo as i64,
            count: (hi - lo) as u64,
            elem_bits: kind.elem_bits(),
            data,
            offsets,
            lens,
        })
    }
}

/// An owned page covering a group of contiguous rows.
pub struct MemBlob {
    first: i64,
    count: u64,
    elem_bits: u32,
    data: Vec<u8>,
    /// Start bit of each row inside `data`.
    offsets: Vec<u64>,
    lens: Vec<u32>,
}

impl Blob for MemBlob {
    fn row_range(&self) -> (i64, u64) {
        (self.first, self.count)
    }

    fn cell(&self, row: i64) -> Result<Cell<'_>, StoreError> {
        if row < self.first || (row - self.first) as u64 >= self.count {
            return Err(StoreError::RowOutOfRange {
                row,
                first: self.first,
                count: self.count,
            });
        }
        let ix = (row - self.first) as usize;
        let bit = self.offsets[ix];
        Ok(Cell {
            data: &self.data[(bit / 8) as usize..],
            bit_offset: (bit % 8) as u8,
            elem_bits: self.elem_bits,
            len: self.lens[ix],
        })
    }
}

struct PendingSequence {
    seq_id: String,
    bases: Vec<u8>,
    circular: bool,
    external: bool,
}

/// Builds a [`MemStore`] holding one REFERENCE table.
///
/// Sequences are laid out in [`ROW_BASE_CAPACITY`]-sized rows, the last row
/// holding the remainder, matching the persisted layout the readers expect.
#[derive(Default)]
pub struct MemRunBuilder {
    rows_per_blob: u64,
    fail_read_len: bool,
    pending: Vec<PendingSequence>,
}

impl MemRunBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows_per_blob: DEFAULT_ROWS_PER_BLOB,
            fail_read_len: false,
            pending: Vec::new(),
        }
    }

    /// Sets the page width in rows.
    #[must_use]
    pub fn rows_per_blob(mut self, rows: u64) -> Self {
        self.rows_per_blob = rows;
        self
    }

    /// Makes every READ_LEN cell read fail, for index-builder fault tests.
    #[must_use]
    pub fn fail_read_len(mut self) -> Self {
        self.fail_read_len = true;
        self
    }

    /// Adds a reference stored inline in the table.
    #[must_use]
    pub fn reference(mut self, seq_id: &str, bases: &[u8], circular: bool) -> Self {
        self.pending.push(PendingSequence {
            seq_id: seq_id.to_string(),
            bases: bases.to_vec(),
            circular,
            external: false,
        });
        self
    }

    /// Adds a reference whose bases live outside the table (empty CMP_READ).
    #[must_use]
    pub fn external_reference(mut self, seq_id: &str, bases: &[u8], circular: bool) -> Self {
        self.pending.push(PendingSequence {
            seq_id: seq_id.to_string(),
            bases: bases.to_vec(),
            circular,
            external: true,
        });
        self
    }

    pub fn build(self) -> Result<MemStore> {
        let mut rows = Vec::new();
        for seq in &self.pending {
            for chunk in seq.bases.chunks(ROW_BASE_CAPACITY as usize) {
                rows.push(RowData {
                    seq_id: seq.seq_id.clone(),
                    circular: [u8::from(seq.circular)],
                    read: chunk.to_vec(),
                    packed: nuc::pack(chunk)?,
                    external: seq.external,
                    read_len: (chunk.len() as u32).to_le_bytes(),
                });
            }
        }
        let mut tables = HashMap::new();
        tables.insert(
            TABLE_REFERENCE.to_string(),
            Arc::new(TableData {
                rows,
                rows_per_blob: self.rows_per_blob,
                fail_read_len: self.fail_read_len,
            }),
        );
        Ok(MemStore { tables })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> MemStore {
        MemRunBuilder::new()
            .rows_per_blob(2)
            .reference("chr1", b"ACGTACGTACGT", false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_open_missing_table() {
        let store = MemStore::empty();
        assert!(!store.has_table(TABLE_REFERENCE));
        let err = store.open_table(TABLE_REFERENCE).unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(_)));
    }

    #[test]
    fn test_cursor_rejects_unknown_column() {
        let store = fixture();
        let table = store.open_table(TABLE_REFERENCE).unwrap();
        let err = table.read_cursor(&["NAME"]).unwrap_err();
        assert!(matches!(err, StoreError::ColumnNotFound(_)));
    }

    #[test]
    fn test_seq_id_cell() {
        let store = fixture();
        let table = store.open_table(TABLE_REFERENCE).unwrap();
        let curs = table.read_cursor(&[COL_SEQ_ID]).unwrap();
        assert_eq!(curs.row_range(0).unwrap(), (1, 1));
        let cell = curs.cell(1, 0).unwrap();
        assert_eq!(&cell.data[..cell.len as usize], b"chr1");
        assert_eq!(cell.elem_bits, 8);
    }

    #[test]
    fn test_read_bits_packed_partial_buffer() {
        let store = fixture();
        let table = store.open_table(TABLE_REFERENCE).unwrap();
        let curs = table.read_cursor(&[COL_READ_PACKED]).unwrap();
        // 1-byte buffer holds four of the twelve bases
        let mut buf = [0u8; 1];
        let got = curs.read_bits(1, 0, 2, 0, &mut buf).unwrap();
        assert_eq!(got.num_read, 4);
        assert_eq!(got.remaining, 8);
        assert_eq!(nuc::unpack(&buf, 0, 4), b"ACGT");

        // resume off byte alignment inside the stored stream
        let got = curs.read_bits(1, 0, 2, 6, &mut buf).unwrap();
        assert_eq!(got.num_read, 4);
        assert_eq!(got.remaining, 2);
        assert_eq!(nuc::unpack(&buf, 0, 4), b"GTAC");
    }

    #[test]
    fn test_read_bits_elem_size_checked() {
        let store = fixture();
        let table = store.open_table(TABLE_REFERENCE).unwrap();
        let curs = table.read_cursor(&[COL_READ_PACKED]).unwrap();
        let mut buf = [0u8; 4];
        let err = curs.read_bits(1, 0, 8, 0, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            StoreError::ElemSizeMismatch {
                requested: 8,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_blob_grouping_and_cells() {
        // 12000 bases -> rows of 5000/5000/2000, pages of two rows
        let bases: Vec<u8> = (0..12000u64).map(|i| b"ACGT"[(i % 4) as usize]).collect();
        let store = MemRunBuilder::new()
            .rows_per_blob(2)
            .reference("chr1", &bases, false)
            .build()
            .unwrap();
        let table = store.open_table(TABLE_REFERENCE).unwrap();
        let curs = table.read_cursor(&[COL_READ_PACKED]).unwrap();

        let blob = curs.blob(1, 0).unwrap();
        assert_eq!(blob.row_range(), (1, 2));
        let c0 = blob.cell(1).unwrap();
        assert_eq!(c0.len, 5000);
        let c1 = blob.cell(2).unwrap();
        assert_eq!(c1.len, 5000);
        // both rows decode from the first cell's slice: one continuous stream
        assert_eq!(
            nuc::unpack(c0.data, u64::from(c0.bit_offset), 10000),
            &bases[..10000]
        );

        let blob = curs.blob(3, 0).unwrap();
        assert_eq!(blob.row_range(), (3, 1));
        assert_eq!(blob.cell(3).unwrap().len, 2000);
        assert!(blob.cell(1).is_err());
    }

    #[test]
    fn test_blob_bit_contiguity_with_odd_tail() {
        // first reference ends after 5001 bases; the second reference's rows
        // then sit off byte alignment inside the shared page
        let mut bases = vec![b'A'; 5001];
        bases[5000] = b'T';
        let store = MemRunBuilder::new()
            .rows_per_blob(4)
            .reference("chr1", &bases, false)
            .reference("chr2", b"GATTACA", false)
            .build()
            .unwrap();
        let table = store.open_table(TABLE_REFERENCE).unwrap();
        let curs = table.read_cursor(&[COL_READ_PACKED]).unwrap();
        let blob = curs.blob(3, 0).unwrap();
        let cell = blob.cell(3).unwrap();
        assert_eq!(cell.bit_offset, 2);
        assert_eq!(
            nuc::unpack(cell.data, u64::from(cell.bit_offset), 7),
            b"GATTACA"
        );
    }

    #[test]
    fn test_external_reference_cmp_read_empty() {
        let store = MemRunBuilder::new()
            .external_reference("chrX", b"ACGT", false)
            .build()
            .unwrap();
        let table = store.open_table(TABLE_REFERENCE).unwrap();
        let curs = table.read_cursor(&[COL_CMP_READ, COL_READ_UNPACKED]).unwrap();
        assert_eq!(curs.cell(1, 0).unwrap().len, 0);
        // the READ column still serves the bases
        assert_eq!(curs.cell(1, 1).unwrap().len, 4);
    }

    #[test]
    fn test_read_len_cell_and_fault_knob() {
        let bases = vec![b'C'; 6200];
        let store = MemRunBuilder::new()
            .reference("chr1", &bases, true)
            .build()
            .unwrap();
        let table = store.open_table(TABLE_REFERENCE).unwrap();
        let curs = table.read_cursor(&[COL_READ_LEN]).unwrap();
        let cell = curs.cell(2, 0).unwrap();
        assert_eq!(cell.elem_bits, 32);
        assert_eq!(cell.len, 1);
        assert_eq!(u32::from_le_bytes(cell.data[..4].try_into().unwrap()), 1200);

        let broken = MemRunBuilder::new()
            .reference("chr1", &bases, true)
            .fail_read_len()
            .build()
            .unwrap();
        let table = broken.open_table(TABLE_REFERENCE).unwrap();
        let curs = table.read_cursor(&[COL_READ_LEN]).unwrap();
        assert!(curs.cell(2, 0).is_err());
    }
}
