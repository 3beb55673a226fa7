//! Columnar store seam.
//!
//! The reference readers never touch a storage medium directly; they consume
//! the narrow read-only surface below. A backend exposes named tables, read
//! cursors over named columns, direct bit-level cell reads, and zero-copy
//! pages ("blobs") spanning contiguous rows. The [`mem`] module implements
//! the seam in memory for tests and self-contained fixtures.

pub mod mem;

use crate::error::StoreError;

/// REFERENCE table name.
pub const TABLE_REFERENCE: &str = "REFERENCE";

/// Reference name column (one string per row; rows of one reference repeat it).
pub const COL_SEQ_ID: &str = "SEQ_ID";
/// Circularity flag column (one boolean per row).
pub const COL_CIRCULAR: &str = "CIRCULAR";
/// Inline sequence column; an empty cell means the bases live outside this table.
pub const COL_CMP_READ: &str = "CMP_READ";
/// Per-row base count column (32-bit).
pub const COL_READ_LEN: &str = "READ_LEN";
/// The READ column requested in its dense 2-bit packed encoding.
pub const COL_READ_PACKED: &str = "(2na:packed)READ";
/// The READ column requested unpacked, one base per byte.
pub const COL_READ_UNPACKED: &str = "(4na:bin)READ";

/// The cursor type of a store.
pub type CursorOf<S> = <<S as Store>::Table as Table>::Cursor;
/// The blob type of a store.
pub type BlobOf<S> = <CursorOf<S> as Cursor>::Blob;

/// One cell of a column, served without copying.
///
/// `data` begins at the cell's first byte but runs to the end of the backing
/// page, so rows that are physically contiguous within one page can be read
/// through a single slice. `bit_offset` locates the first element inside
/// `data[0]` and is always less than 8.
#[derive(Clone, Copy, Debug)]
pub struct Cell<'a> {
    pub data: &'a [u8],
    pub bit_offset: u8,
    pub elem_bits: u32,
    /// Row length in elements.
    pub len: u32,
}

/// Outcome of a bit-level cell read.
///
/// `remaining` counts the elements of the row left unread because the output
/// buffer filled first; a full buffer is an ordinary outcome here, never an
/// error.
#[derive(Clone, Copy, Debug, Default)]
pub struct BitsRead {
    pub num_read: u32,
    pub remaining: u32,
}

/// One opened read-only data source.
pub trait Store {
    type Table: Table;

    /// Opens a named table for reading.
    fn open_table(&self, name: &str) -> Result<Self::Table, StoreError>;

    /// Whether a named table exists in this source.
    fn has_table(&self, name: &str) -> bool;
}

/// A read-only table handle.
pub trait Table {
    type Cursor: Cursor;

    /// Creates an opened read cursor over the named columns.
    ///
    /// Column names may carry an encoding qualifier (for example
    /// [`COL_READ_PACKED`]). Columns are addressed afterwards by their
    /// position in `columns`.
    fn read_cursor(&self, columns: &[&str]) -> Result<Self::Cursor, StoreError>;
}

/// An opened read cursor.
pub trait Cursor {
    type Blob: Blob;

    /// The row-id range `(first, count)` of a column.
    fn row_range(&self, col: usize) -> Result<(i64, u64), StoreError>;

    /// Serves one cell directly by row.
    fn cell(&self, row: i64, col: usize) -> Result<Cell<'_>, StoreError>;

    /// Copies up to `buf`'s capacity of elements out of a cell, starting at
    /// element `start`. `elem_bits` must match the column's stored encoding.
    ///
    /// Packed output is written from bit 0 of `buf` regardless of `start`'s
    /// alignment inside the stored stream.
    fn read_bits(
        &self,
        row: i64,
        col: usize,
        elem_bits: u32,
        start: u32,
        buf: &mut [u8],
    ) -> Result<BitsRead, StoreError>;

    /// Fetches the zero-copy page covering `row`.
    fn blob(&self, row: i64, col: usize) -> Result<Self::Blob, StoreError>;
}

/// A zero-copy page covering one or more contiguous rows of a column.
pub trait Blob {
    /// The row-id range `(first, count)` this page covers.
    fn row_range(&self) -> (i64, u64);

    /// Serves one of the page's cells without copying.
    fn cell(&self, row: i64) -> Result<Cell<'_>, StoreError>;
}
