//! One-time REFERENCE table scan.
//!
//! Each run contributes its REFERENCE rows exactly once; consecutive rows
//! sharing a SEQ_ID *value* form one logical reference. The resulting index
//! is immutable and owned by the run-set for its whole lifetime; both reader
//! families resolve row ranges through it.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::run::Run;
use crate::store::{Cursor, Store, Table, COL_CIRCULAR, COL_CMP_READ, COL_READ_LEN, COL_SEQ_ID};
use crate::{IndexError, Result, ROW_BASE_CAPACITY};

/// One logical reference: a contiguous row range of one run's REFERENCE table.
#[derive(Debug, Clone)]
pub struct ReferenceRecord {
    pub(crate) run_index: usize,
    pub(crate) seq_id: String,
    pub(crate) first_row: i64,
    pub(crate) row_count: u64,
    pub(crate) circular: bool,
    pub(crate) external: bool,
    /// Total bases; set only for circular references, where it gates the
    /// wraparound arithmetic.
    pub(crate) base_count: Option<u64>,
}

impl ReferenceRecord {
    /// Index of the owning run within the run-set.
    #[must_use]
    pub fn run_index(&self) -> usize {
        self.run_index
    }

    /// The reference's SEQ_ID.
    #[must_use]
    pub fn seq_id(&self) -> &str {
        &self.seq_id
    }

    /// First REFERENCE table row of this reference.
    #[must_use]
    pub fn first_row(&self) -> i64 {
        self.first_row
    }

    /// Number of REFERENCE table rows.
    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// One past the last row.
    #[must_use]
    pub fn end_row(&self) -> i64 {
        self.first_row + self.row_count as i64
    }

    /// Whether the sequence wraps biologically.
    #[must_use]
    pub fn circular(&self) -> bool {
        self.circular
    }

    /// Whether the bases live outside the REFERENCE table (empty CMP_READ).
    #[must_use]
    pub fn external(&self) -> bool {
        self.external
    }

    /// Total base count; `Some` only for circular references.
    #[must_use]
    pub fn base_count(&self) -> Option<u64> {
        self.base_count
    }
}

/// Ordered, immutable list of every reference across a run-set.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    records: Vec<ReferenceRecord>,
}

impl ReferenceIndex {
    /// Scans every run's REFERENCE table into an index.
    ///
    /// Runs without a REFERENCE table, runs whose accession was already
    /// indexed, and runs whose scan fails are skipped. A failure sizing a
    /// circular reference's tail aborts the whole build: an unsized circular
    /// record would corrupt every later circular-aware read.
    pub fn build<S: Store>(runs: &[Run<S>]) -> Result<Self> {
        const IX_SEQ_ID: usize = 0;
        const IX_CIRCULAR: usize = 1;
        const IX_CMP_READ: usize = 2;
        const IX_READ_LEN: usize = 3;

        let mut records: Vec<ReferenceRecord> = Vec::new();
        let mut seen = HashSet::new();

        for (run_index, run) in runs.iter().enumerate() {
            if !seen.insert(run.accession().to_string()) {
                continue; // repeated accessions contribute once
            }
            let table = match run.reference_table() {
                Ok(table) => table,
                Err(err) => {
                    debug!(accession = run.accession(), %err, "run without references, skipped");
                    continue;
                }
            };
            let curs = match table.read_cursor(&[COL_SEQ_ID, COL_CIRCULAR, COL_CMP_READ, COL_READ_LEN])
            {
                Ok(curs) => curs,
                Err(err) => {
                    warn!(accession = run.accession(), %err, "REFERENCE cursor failed, run skipped");
                    continue;
                }
            };
            let (first, count) = match curs.row_range(IX_SEQ_ID) {
                Ok(range) => range,
                Err(err) => {
                    warn!(accession = run.accession(), %err, "REFERENCE row range failed, run skipped");
                    continue;
                }
            };

            let run_start = records.len();
            let end = first + count as i64;
            let mut scanned_to = end;
            for row in first..end {
                let seq = match curs.cell(row, IX_SEQ_ID) {
                    Ok(cell) if cell.elem_bits == 8 && cell.bit_offset == 0 => cell,
                    Ok(cell) => {
                        warn!(accession = run.accession(), row, elem_bits = cell.elem_bits, "malformed SEQ_ID cell, scan stopped");
                        scanned_to = row;
                        break;
                    }
                    Err(err) => {
                        warn!(accession = run.accession(), row, %err, "SEQ_ID read failed, scan stopped");
                        scanned_to = row;
                        break;
                    }
                };
                let seq_id = &seq.data[..seq.len as usize];

                // compare by content: the same name can arrive under a fresh
                // allocation from one page to the next
                if records.len() > run_start
                    && records[records.len() - 1].seq_id.as_bytes() == seq_id
                {
                    continue;
                }

                let circular = match curs.cell(row, IX_CIRCULAR) {
                    Ok(cell) if cell.elem_bits == 8 && cell.len >= 1 => cell.data[0] != 0,
                    _ => {
                        warn!(accession = run.accession(), row, "CIRCULAR read failed, scan stopped");
                        scanned_to = row;
                        break;
                    }
                };
                let external = match curs.cell(row, IX_CMP_READ) {
                    Ok(cell) => cell.len == 0 || cell.elem_bits == 0,
                    Err(err) => {
                        warn!(accession = run.accession(), row, %err, "CMP_READ read failed, scan stopped");
                        scanned_to = row;
                        break;
                    }
                };

                // close the record being built before starting the next; rows
                // of earlier runs are already closed
                if records.len() > run_start {
                    let prev = records.last_mut().expect("record open for this run");
                    prev.row_count = (row - prev.first_row) as u64;
                }
                records.push(ReferenceRecord {
                    run_index,
                    seq_id: String::from_utf8_lossy(seq_id).into_owned(),
                    first_row: row,
                    row_count: 0,
                    circular,
                    external,
                    base_count: None,
                });
            }
            if records.len() > run_start {
                let last = records.last_mut().expect("record open for this run");
                last.row_count = (scanned_to - last.first_row) as u64;
            }

            // size this run's circular references while its cursor is live
            for rec in &mut records[run_start..] {
                if !rec.circular || rec.row_count == 0 {
                    continue;
                }
                let tail_row = rec.first_row + rec.row_count as i64 - 1;
                let cell =
                    curs.cell(tail_row, IX_READ_LEN)
                        .map_err(|source| IndexError::CircularTailLength {
                            accession: run.accession().to_string(),
                            row: tail_row,
                            source,
                        })?;
                if cell.elem_bits != 32 || cell.len != 1 || cell.data.len() < 4 {
                    return Err(IndexError::CircularTailShape {
                        row: tail_row,
                        elem_bits: cell.elem_bits,
                        len: cell.len,
                    }
                    .into());
                }
                let tail_len = u32::from_le_bytes(
                    cell.data[..4].try_into().expect("four bytes checked above"),
                );
                rec.base_count = Some((rec.row_count - 1) * ROW_BASE_CAPACITY + u64::from(tail_len));
                debug!(
                    seq_id = rec.seq_id,
                    rows = rec.row_count,
                    bases = rec.base_count,
                    "sized circular reference"
                );
            }
        }

        Ok(Self { records })
    }

    /// Number of references across all runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, ix: usize) -> Option<&ReferenceRecord> {
        self.records.get(ix)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::{MemRunBuilder, MemStore};
    use crate::RunSet;

    fn bases(n: usize) -> Vec<u8> {
        (0..n).map(|i| b"ACGT"[i % 4]).collect()
    }

    fn single_run(store: MemStore) -> Vec<Run<MemStore>> {
        let mut rs = RunSet::new();
        rs.add_run("RUN1", store);
        rs.into_runs()
    }

    #[test]
    fn test_grouping_and_row_counts() {
        let store = MemRunBuilder::new()
            .reference("chr1", &bases(11200), false)
            .reference("chr2", &bases(5000), false)
            .reference("chr3", &bases(400), false)
            .build()
            .unwrap();
        let index = ReferenceIndex::build(&single_run(store)).unwrap();
        assert_eq!(index.len(), 3);

        let chr1 = index.get(0).unwrap();
        assert_eq!(chr1.seq_id(), "chr1");
        assert_eq!(chr1.first_row(), 1);
        assert_eq!(chr1.row_count(), 3);
        assert!(!chr1.circular());
        assert!(!chr1.external());
        assert_eq!(chr1.base_count(), None);

        let chr2 = index.get(1).unwrap();
        assert_eq!((chr2.first_row(), chr2.row_count()), (4, 1));
        let chr3 = index.get(2).unwrap();
        assert_eq!((chr3.first_row(), chr3.row_count()), (5, 1));
    }

    #[test]
    fn test_row_ranges_disjoint_and_increasing() {
        let store = MemRunBuilder::new()
            .reference("a", &bases(7000), false)
            .reference("b", &bases(5001), true)
            .reference("c", &bases(1), false)
            .build()
            .unwrap();
        let index = ReferenceIndex::build(&single_run(store)).unwrap();
        let mut prev_end = 0i64;
        for rec in index.iter() {
            assert!(rec.first_row() > prev_end);
            assert!(rec.row_count() > 0);
            prev_end = rec.end_row() - 1;
        }
    }

    #[test]
    fn test_adjacent_same_seq_id_collapses() {
        // same name written twice in a row is one reference
        let store = MemRunBuilder::new()
            .reference("chr1", &bases(5000), false)
            .reference("chr1", &bases(3000), false)
            .build()
            .unwrap();
        let index = ReferenceIndex::build(&single_run(store)).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0).unwrap().row_count(), 2);
    }

    #[test]
    fn test_circular_base_count_from_tail_row() {
        let store = MemRunBuilder::new()
            .reference("plasmid", &bases(7500), true)
            .build()
            .unwrap();
        let index = ReferenceIndex::build(&single_run(store)).unwrap();
        let rec = index.get(0).unwrap();
        assert!(rec.circular());
        assert_eq!(rec.row_count(), 2);
        assert_eq!(rec.base_count(), Some(7500));
    }

    #[test]
    fn test_external_reference_flagged() {
        let store = MemRunBuilder::new()
            .external_reference("chrX", &bases(100), false)
            .reference("chrY", &bases(100), false)
            .build()
            .unwrap();
        let index = ReferenceIndex::build(&single_run(store)).unwrap();
        assert!(index.get(0).unwrap().external());
        assert!(!index.get(1).unwrap().external());
    }

    #[test]
    fn test_duplicate_accession_contributes_once() {
        let store = MemRunBuilder::new()
            .reference("chr1", &bases(100), false)
            .build()
            .unwrap();
        let mut rs = RunSet::new();
        rs.add_run("RUN1", store.clone());
        rs.add_run("RUN1", store);
        let index = ReferenceIndex::build(&rs.into_runs()).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_run_without_reference_table_skipped() {
        let good = MemRunBuilder::new()
            .reference("chr1", &bases(100), false)
            .build()
            .unwrap();
        let mut rs = RunSet::new();
        rs.add_run("EMPTY", MemStore::empty());
        rs.add_run("RUN1", good);
        let index = ReferenceIndex::build(&rs.into_runs()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0).unwrap().run_index(), 1);
    }

    #[test]
    fn test_multi_run_indexing() {
        let a = MemRunBuilder::new()
            .reference("chr1", &bases(5000), false)
            .build()
            .unwrap();
        let b = MemRunBuilder::new()
            .reference("chr1", &bases(200), false)
            .reference("chr2", &bases(300), false)
            .build()
            .unwrap();
        let mut rs = RunSet::new();
        rs.add_run("A", a);
        rs.add_run("B", b);
        let index = ReferenceIndex::build(&rs.into_runs()).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(0).unwrap().run_index(), 0);
        assert_eq!(index.get(1).unwrap().run_index(), 1);
        // row numbering restarts per run
        assert_eq!(index.get(1).unwrap().first_row(), 1);
    }

    #[test]
    fn test_circular_tail_failure_aborts_build() {
        let broken = MemRunBuilder::new()
            .reference("plasmid", &bases(7500), true)
            .fail_read_len()
            .build()
            .unwrap();
        let err = ReferenceIndex::build(&single_run(broken)).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Index(IndexError::CircularTailLength { .. })
        ));
    }

    #[test]
    fn test_read_len_fault_without_circular_is_harmless() {
        // READ_LEN is only consulted for circular tails
        let broken = MemRunBuilder::new()
            .reference("chr1", &bases(7500), false)
            .fail_read_len()
            .build()
            .unwrap();
        let index = ReferenceIndex::build(&single_run(broken)).unwrap();
        assert_eq!(index.len(), 1);
    }
}
