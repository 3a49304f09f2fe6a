use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use arrow_array::ArrayRef;
use arrow_schema::DataType;
use tabula_common::{Result, error::Error};
use tabula_workflow::task_group::TaskGroup;

use super::{ChunkIndices, ColumnBuilder, verify_joined};
use crate::{
    chunk::TextChunk,
    column::Column,
    converter::{Converter, make_converter},
    options::ConvertOptions,
};

/// Converts every chunk to one caller-supplied type, without widening.
pub struct FixedColumnBuilder {
    converter: Arc<dyn Converter>,
    task_group: Arc<dyn TaskGroup>,
    indices: ChunkIndices,
    chunks: Arc<Mutex<BTreeMap<usize, ArrayRef>>>,
}

impl FixedColumnBuilder {
    pub fn try_new(
        data_type: &DataType,
        row_hint: usize,
        options: Arc<ConvertOptions>,
        task_group: Arc<dyn TaskGroup>,
    ) -> Result<FixedColumnBuilder> {
        let converter = make_converter(data_type, &options)?;
        Ok(Self::with_converter(converter, row_hint, task_group))
    }

    /// Creates a builder that converts through the given converter.
    pub fn with_converter(
        converter: Arc<dyn Converter>,
        row_hint: usize,
        task_group: Arc<dyn TaskGroup>,
    ) -> FixedColumnBuilder {
        log::debug!(
            "fixed column builder: type {}, row hint {row_hint}",
            converter.data_type()
        );
        FixedColumnBuilder {
            converter,
            task_group,
            indices: ChunkIndices::default(),
            chunks: Default::default(),
        }
    }

    fn schedule(&self, index: usize, chunk: Arc<TextChunk>) {
        let converter = self.converter.clone();
        let chunks = self.chunks.clone();
        self.task_group.append(Box::new(move || {
            let array = converter.convert(&chunk)?;
            log::trace!("converted chunk {index}: {} rows", chunk.num_rows());
            chunks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(index, array);
            Ok(())
        }));
    }
}

impl ColumnBuilder for FixedColumnBuilder {
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

        let mut chunks = std::mem::take(
            &mut *self.chunks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let arrays = (0..num_chunks)
            .map(|i| {
                chunks
                    .remove(&i)
                    .ok_or_else(|| Error::invalid_state(format!("chunk {i} was not converted")))
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "fixed column builder finished: {} chunks of {}",
            arrays.len(),
            self.converter.data_type()
        );
        Column::try_new(self.converter.data_type().clone(), arrays)
    }
}
