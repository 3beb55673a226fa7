//! Runs and the run-set that owns them.

use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::reader::{RandomReader, StreamState};
use crate::store::{Store, TABLE_REFERENCE};
use crate::{ReferenceIndex, Result, StoreError};

/// One opened data source.
///
/// Owns its store exclusively and opens its REFERENCE table handle lazily on
/// first use; the handle then lives as long as the run.
pub struct Run<S: Store> {
    accession: String,
    store: S,
    ref_table: OnceLock<S::Table>,
}

impl<S: Store> Run<S> {
    pub fn new(accession: impl Into<String>, store: S) -> Self {
        Self {
            accession: accession.into(),
            store,
            ref_table: OnceLock::new(),
        }
    }

    /// The accession this run was opened under.
    #[must_use]
    pub fn accession(&self) -> &str {
        &self.accession
    }

    /// The run's REFERENCE table, opened on first call.
    pub(crate) fn reference_table(&self) -> Result<&S::Table, StoreError> {
        if self.ref_table.get().is_none() {
            let table = self.store.open_table(TABLE_REFERENCE)?;
            let _ = self.ref_table.set(table);
        }
        Ok(self
            .ref_table
            .get()
            .expect("reference table initialized above"))
    }
}

/// A set of opened runs and the reader state shared across them.
///
/// The run-set owns every run, the lazily-built [`ReferenceIndex`], and the
/// single sequential stream cursor. Sequential reads serialize on that
/// cursor's mutex; random-access readers created via
/// [`RunSet::random_reader`] carry their own state and need no locking.
pub struct RunSet<S: Store> {
    runs: Vec<Run<S>>,
    index: OnceLock<ReferenceIndex>,
    pub(crate) stream: Mutex<StreamState<S>>,
}

impl<S: Store> Default for RunSet<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> RunSet<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            runs: Vec::new(),
            index: OnceLock::new(),
            stream: Mutex::new(StreamState::new()),
        }
    }

    /// Adds an opened run to the set.
    ///
    /// Runs must be added before the first read; the reference index is
    /// built over whatever runs are present when it is first needed.
    pub fn add_run(&mut self, accession: impl Into<String>, store: S) {
        self.runs.push(Run::new(accession, store));
    }

    /// The runs in insertion order.
    #[must_use]
    pub fn runs(&self) -> &[Run<S>] {
        &self.runs
    }

    /// The reference index, built on first use and immutable thereafter.
    pub fn reference_index(&self) -> Result<&ReferenceIndex> {
        if self.index.get().is_none() {
            let built = ReferenceIndex::build(&self.runs)?;
            // a concurrent builder may have won the race; both scans read
            // identical data, so either result is the index
            let _ = self.index.set(built);
        }
        Ok(self
            .index
            .get()
            .expect("reference index initialized above"))
    }

    /// Creates an independent random-access reader over this run-set.
    #[must_use]
    pub fn random_reader(&self) -> RandomReader<'_, S> {
        RandomReader::new(self)
    }

    #[cfg(test)]
    pub(crate) fn into_runs(self) -> Vec<Run<S>> {
        self.runs
    }
}
