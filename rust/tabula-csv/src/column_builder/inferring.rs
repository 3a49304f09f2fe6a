//! Type-inferring column builder.
//!
//! All conversion tasks of a column share one [`InferState`] behind a mutex: the
//! current candidate [`InferKind`] and, per chunk index, the retained source chunk
//! together with its latest conversion result. The lock is held only to inspect or
//! update that state, never across a conversion.
//!
//! A task converts its chunk under the candidate it reads from the state. On a type
//! mismatch it widens the candidate (if nobody else did so in the meantime) and
//! retries. Once its own chunk is stored under the current candidate, the task keeps
//! going: it re-converts every finished chunk whose stored kind has gone stale, so
//! widening is always completed by the task that triggered it. Chunks that are still
//! in flight are left to their own tasks.
//!
//! A chunk submitted after the last widening may still be converted under a narrower
//! kind by a task that raced with it. [`ColumnBuilder::finish`] therefore runs a final
//! reconciliation pass that brings every chunk to the final candidate.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use arrow_array::ArrayRef;
use tabula_common::{Result, error::Error};
use tabula_workflow::task_group::TaskGroup;

use super::{ChunkIndices, ColumnBuilder, verify_joined};
use crate::{
    chunk::TextChunk,
    column::Column,
    ladder::{InferKind, InferenceLadder},
    options::ConvertOptions,
};

/// Infers the narrowest ladder kind that accepts every chunk of the column.
pub struct InferringColumnBuilder {
    task_group: Arc<dyn TaskGroup>,
    indices: ChunkIndices,
    shared: Arc<Shared>,
}

impl InferringColumnBuilder {
    pub fn try_new(
        row_hint: usize,
        options: Arc<ConvertOptions>,
        task_group: Arc<dyn TaskGroup>,
    ) -> Result<InferringColumnBuilder> {
        let ladder = InferenceLadder::new(&options)?;
        Ok(Self::with_ladder(ladder, row_hint, task_group))
    }

    /// Creates a builder that converts through the given ladder.
    pub fn with_ladder(
        ladder: InferenceLadder,
        row_hint: usize,
        task_group: Arc<dyn TaskGroup>,
    ) -> InferringColumnBuilder {
        log::debug!("inferring column builder: row hint {row_hint}");
        let kind = ladder.first();
        InferringColumnBuilder {
            task_group,
            indices: ChunkIndices::default(),
            shared: Arc::new(Shared {
                ladder,
                state: Mutex::new(InferState {
                    kind,
                    entries: BTreeMap::new(),
                }),
            }),
        }
    }

    fn schedule(&self, index: usize, chunk: Arc<TextChunk>) {
        // Registered before scheduling: a serial task group runs the task right away.
        self.shared.lock().submit(index, chunk);
        let shared = self.shared.clone();
        self.task_group
            .append(Box::new(move || shared.convert_chunk(index)));
    }
}

impl ColumnBuilder for InferringColumnBuilder {
    fn append(&mut self, chunk: Arc<TextChunk>) {
        let index = self.indices.next_index();
        self.insert(index, chunk);
    }

    fn insert(&mut self, index: usize, chunk: Arc<TextChunk>) {
        if self.indices.claim(index) {
            self.schedule(index, chunk);
        }
    }

    fn task_group(&self) -> &Arc<dyn TaskGroup> {
        &self.task_group
    }

    fn finish(self: Box<Self>) -> Result<Column> {
        verify_joined(self.task_group.as_ref())?;
        let num_chunks = self.indices.verify_complete()?;

        let mut state = self.shared.lock();
        state.reconcile(&self.shared.ladder)?;

        let kind = state.kind;
        let mut entries = std::mem::take(&mut state.entries);
        let arrays = (0..num_chunks)
            .map(|index| match entries.remove(&index).map(|e| e.stored) {
                Some(Stored::Converted { array, .. }) => Ok(array),
                _ => Err(Error::invalid_state(format!(
                    "chunk {index} was not converted"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "inferring column builder finished: {} chunks of {:?}",
            arrays.len(),
            kind
        );
        Column::try_new(kind.data_type(), arrays)
    }
}

struct Shared {
    ladder: InferenceLadder,
    state: Mutex<InferState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, InferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Body of the conversion task for chunk `index`.
    fn convert_chunk(&self, index: usize) -> Result<()> {
        let (mut target, mut source, mut kind) = {
            let state = self.lock();
            (index, state.source(index)?, state.kind)
        };

        loop {
            let result = self.ladder.converter(kind).convert(&source);

            let mut state = self.lock();
            match result {
                Ok(array) if kind == state.kind => {
                    log::trace!("chunk {target} converted as {kind:?}");
                    state.store(target, kind, array);
                }
                Ok(_) => {
                    // Widened by another task while converting.
                    kind = state.kind;
                    continue;
                }
                Err(e) if e.is_type_mismatch() => {
                    log::trace!("chunk {target} does not fit {kind:?}: {e}");
                    if kind == state.kind {
                        state.widen(&self.ladder, target)?;
                    }
                    kind = state.kind;
                    continue;
                }
                Err(e) => return Err(e),
            }

            match state.claim_stale() {
                Some((stale, stale_source)) => {
                    target = stale;
                    source = stale_source;
                    kind = state.kind;
                }
                None => return Ok(()),
            }
        }
    }
}

/// Shared mutable state of one inferring builder.
struct InferState {
    /// Current candidate kind; only ever moves up the ladder.
    kind: InferKind,
    /// Keyed by chunk index.
    entries: BTreeMap<usize, Entry>,
}

struct Entry {
    /// Retained for re-conversion under a wider kind.
    source: Arc<TextChunk>,
    stored: Stored,
}

/// Latest conversion result of a chunk.
enum Stored {
    /// A task is converting (or re-converting) the chunk.
    InFlight,
    /// Converted under `kind`, which may lag the current candidate.
    Converted { kind: InferKind, array: ArrayRef },
}

impl InferState {
    fn submit(&mut self, index: usize, source: Arc<TextChunk>) {
        self.entries.insert(
            index,
            Entry {
                source,
                stored: Stored::InFlight,
            },
        );
    }

    fn source(&self, index: usize) -> Result<Arc<TextChunk>> {
        self.entries
            .get(&index)
            .map(|entry| entry.source.clone())
            .ok_or_else(|| Error::invalid_state(format!("chunk {index} was never submitted")))
    }

    fn store(&mut self, index: usize, kind: InferKind, array: ArrayRef) {
        if let Some(entry) = self.entries.get_mut(&index) {
            entry.stored = Stored::Converted { kind, array };
        }
    }

    /// Moves the candidate to the next enabled rung after a chunk failed under it.
    fn widen(&mut self, ladder: &InferenceLadder, index: usize) -> Result<()> {
        let from = self.kind;
        let Some(to) = ladder.next_enabled(from) else {
            return Err(Error::invalid_state(format!(
                "chunk {index} does not fit the terminal kind {from:?}"
            )));
        };
        log::debug!("widening column type from {from:?} to {to:?} (chunk {index})");
        self.kind = to;
        Ok(())
    }

    /// Picks a finished chunk whose stored kind lags the candidate and marks it in flight.
    fn claim_stale(&mut self) -> Option<(usize, Arc<TextChunk>)> {
        let kind = self.kind;
        let (&index, entry) = self
            .entries
            .iter_mut()
            .find(|(_, e)| matches!(e.stored, Stored::Converted { kind: k, .. } if k != kind))?;
        entry.stored = Stored::InFlight;
        Some((index, entry.source.clone()))
    }

    /// Brings every chunk to a single final kind. Runs after the join, so no task
    /// touches the state concurrently and conversions may happen under the lock.
    fn reconcile(&mut self, ladder: &InferenceLadder) -> Result<()> {
        loop {
            let kind = self.kind;
            let stale = self.entries.iter().find_map(|(&i, e)| match &e.stored {
                Stored::Converted { kind: k, .. } if *k == kind => None,
                Stored::Converted { .. } => Some(Ok((i, e.source.clone()))),
                Stored::InFlight => Some(Err(Error::invalid_state(format!(
                    "chunk {i} was not converted"
                )))),
            });
            let Some(stale) = stale else {
                return Ok(());
            };
            let (index, source) = stale?;

            match ladder.converter(kind).convert(&source) {
                Ok(array) => {
                    log::debug!("reconciled chunk {index} to {kind:?}");
                    self.store(index, kind, array);
                }
                Err(e) if e.is_type_mismatch() => self.widen(ladder, index)?,
                Err(e) => return Err(e),
            }
        }
    }
}
