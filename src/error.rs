/// Custom Result type for refseq operations, wrapping the custom [`Error`] type
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The main error type for the refseq library.
///
/// Informational conditions (circular repeat, chunked continuation, end of
/// stream) are *not* errors; they travel as [`crate::ReadStatus`] alongside a
/// definite produced-count. Everything here aborts the current call.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors raised while building the reference index
    #[error("Error building reference index: {0}")]
    Index(#[from] IndexError),

    /// Errors raised inside a read call
    #[error("Error reading reference sequence: {0}")]
    Read(#[from] ReadError),

    /// Failures reported by the underlying columnar store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Whether this error rejects the caller-supplied read identifier
    /// (out of range, flag bit missing, or flag bit already set).
    #[must_use]
    pub fn is_invalid_id(&self) -> bool {
        matches!(
            self,
            Self::Read(
                ReadError::FlagAlreadySet(_)
                    | ReadError::NotAReference(_)
                    | ReadError::OutOfRange { .. }
            )
        )
    }

    /// Whether this error is a violated internal invariant.
    ///
    /// After an inconsistency the reader instance's state is unspecified and
    /// the instance must be discarded, not retried.
    #[must_use]
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            Self::Read(
                ReadError::ReferenceSkipped { .. }
                    | ReadError::RunOutOfRange { .. }
                    | ReadError::RowNotInBlob { .. }
                    | ReadError::BlobPastReference { .. }
                    | ReadError::ElementShape { .. }
                    | ReadError::UnalignedRowBoundary { .. }
                    | ReadError::UnalignedCell(_)
                    | ReadError::UnsizedCircular(_)
                    | ReadError::ShortPage { .. }
                    | ReadError::EmptyRead { .. }
            )
        )
    }
}

/// Errors specific to the one-time REFERENCE table scan.
///
/// A broken run is skipped during the scan and the build continues; the
/// variants below are the conditions that instead abort the whole build,
/// because an unsized circular record would silently corrupt later reads.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// Reading READ_LEN at a circular reference's final row failed
    #[error("Reading circular tail length of '{accession}' at row {row}: {source}")]
    CircularTailLength {
        accession: String,
        row: i64,
        source: StoreError,
    },

    /// READ_LEN at a circular reference's final row had an unexpected shape
    #[error("Circular tail length at row {row} has {elem_bits}-bit elements, row length {len}")]
    CircularTailShape { row: i64, elem_bits: u32, len: u32 },
}

/// Errors that can occur while serving a read call
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// The identifier already carries the reference flag and cannot be encoded again
    #[error("Read id {0:#x} already carries the reference flag")]
    FlagAlreadySet(u64),

    /// The identifier does not carry the reference flag
    #[error("Read id {0:#x} does not name a reference")]
    NotAReference(u64),

    /// The identifier names a reference slot beyond the built index
    #[error("Reference index {requested} is out of range ({available} references)")]
    OutOfRange { requested: u64, available: u64 },

    /// The stream position tried to jump over a reference; the shared cursor
    /// advances exactly one reference at a time
    #[error("Stream cursor at reference {at} asked to resume at {resume}")]
    ReferenceSkipped { at: usize, resume: u64 },

    /// A reference record names a run slot the run-set does not hold
    #[error("Reference names run {run_index} but the run-set holds {runs} runs")]
    RunOutOfRange { run_index: usize, runs: usize },

    /// A fetched page does not cover the row it was fetched for
    #[error("Row {row} outside fetched page rows {first}..{first}+{count}")]
    RowNotInBlob { row: i64, first: i64, count: u64 },

    /// A fetched page starts beyond the current reference's row range
    #[error("Page starting at row {page_first} begins past reference end row {reference_end}")]
    BlobPastReference { page_first: i64, reference_end: i64 },

    /// A cell was stored with an element size other than the requested encoding
    #[error("Cell at row {row} has {found}-bit elements, expected {expected}-bit")]
    ElementShape { row: i64, expected: u32, found: u32 },

    /// A packed row ended off a byte boundary mid-stream
    #[error("Row {row} ended after {bases} bases, not a whole byte of packed stream")]
    UnalignedRowBoundary { row: i64, bases: u64 },

    /// An unpacked cell started off byte alignment
    #[error("Unpacked cell at row {0} starts off byte alignment")]
    UnalignedCell(i64),

    /// A circular reference reached a circular-aware path without a base count
    #[error("Circular reference {0} has no base count")]
    UnsizedCircular(usize),

    /// A page was too small for the row lengths it claims to cover
    #[error("Page at row {row} holds {have} bits, need {need}")]
    ShortPage { row: i64, have: u64, need: u64 },

    /// The store produced no data where at least one element was due
    #[error("Empty read at row {row}")]
    EmptyRead { row: i64 },
}

/// Failures reported by a columnar store backend.
///
/// This is the error type of the [`crate::store`] traits; backends outside
/// this crate convert their native failures into these variants.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The named table does not exist in this run
    #[error("No table named '{0}'")]
    TableNotFound(String),

    /// The named column does not exist in the table
    #[error("No column named '{0}'")]
    ColumnNotFound(String),

    /// The addressed row lies outside the column's row range
    #[error("Row {row} outside rows {first}..{first}+{count}")]
    RowOutOfRange { row: i64, first: i64, count: u64 },

    /// The caller requested an element size the column is not stored with
    #[error("Requested {requested}-bit elements, column holds {actual}-bit")]
    ElemSizeMismatch { requested: u32, actual: u32 },

    /// A sequence cell contained a byte outside the nucleotide alphabet
    #[error("Invalid nucleotide base: {0}")]
    InvalidBase(u8),

    /// The store could not allocate working memory
    #[error("Out of memory")]
    OutOfMemory,

    /// An I/O failure in the backing medium
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
