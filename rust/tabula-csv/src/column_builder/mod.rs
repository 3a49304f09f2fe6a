//! Column builders: turn a column's textual chunks into one typed [`Column`].
//!
//! A builder schedules one conversion task per submitted chunk on a [`TaskGroup`].
//! Submission never blocks. The caller joins the task group (see
//! [`ColumnBuilder::task_group`]) and then calls [`ColumnBuilder::finish`], which
//! assembles the converted arrays in submission-index order regardless of the order
//! in which the tasks completed.
//!
//! Two builders exist:
//!
//! - [`FixedColumnBuilder`] converts every chunk to a caller-supplied type. A value that
//!   does not fit is a hard error.
//! - [`InferringColumnBuilder`] starts from the narrowest inference kind and widens it
//!   whenever a chunk fails to convert, re-converting already finished chunks so that
//!   the whole column ends up with a single type.

use std::{collections::BTreeSet, sync::Arc};

use arrow_schema::DataType;
use tabula_common::{Result, error::Error};
use tabula_workflow::task_group::TaskGroup;

use crate::{chunk::TextChunk, column::Column, options::ConvertOptions};

mod fixed;
mod inferring;

#[cfg(test)]
mod tests;

pub use fixed::FixedColumnBuilder;
pub use inferring::InferringColumnBuilder;

/// Drives the conversion of one column.
pub trait ColumnBuilder: Send {
    /// Submits the next chunk, assigning it the index after the highest one seen so far.
    fn append(&mut self, chunk: Arc<TextChunk>);

    /// Submits a chunk at an explicit index. Indices may arrive in any order, but every
    /// index in `0..N` must eventually be submitted exactly once.
    fn insert(&mut self, index: usize, chunk: Arc<TextChunk>);

    /// The task group that runs this builder's conversions. It must be joined before
    /// calling [`finish`](Self::finish).
    fn task_group(&self) -> &Arc<dyn TaskGroup>;

    /// Assembles the column.
    ///
    /// # Errors
    ///
    /// - The first failure recorded by the task group, with its original kind.
    /// - `InvalidState` if the task group has not been joined since the last
    ///   submission, or if the submitted indices do not cover `0..N` exactly once.
    /// - A fatal conversion error raised while reconciling chunk types.
    fn finish(self: Box<Self>) -> Result<Column>;
}

/// Creates a builder that converts every chunk to `data_type`.
///
/// `row_hint` is the expected number of rows; it is advisory only.
///
/// # Errors
///
/// Returns `InvalidArgument` if `data_type` is not a supported conversion target or
/// the options are inconsistent.
pub fn make_column_builder(
    data_type: &DataType,
    row_hint: usize,
    options: Arc<ConvertOptions>,
    task_group: Arc<dyn TaskGroup>,
) -> Result<Box<dyn ColumnBuilder>> {
    options.validate()?;
    let builder = FixedColumnBuilder::try_new(data_type, row_hint, options, task_group)?;
    Ok(Box::new(builder))
}

/// Creates a builder that infers the column type from the data.
///
/// # Errors
///
/// Returns `InvalidArgument` if the options are inconsistent.
pub fn make_inferring_column_builder(
    row_hint: usize,
    options: Arc<ConvertOptions>,
    task_group: Arc<dyn TaskGroup>,
) -> Result<Box<dyn ColumnBuilder>> {
    options.validate()?;
    let builder = InferringColumnBuilder::try_new(row_hint, options, task_group)?;
    Ok(Box::new(builder))
}

/// Tracks which chunk indices have been submitted.
///
/// Indices are kept sparse: an arbitrary caller index costs one set entry, and
/// gaps are only reported by [`verify_complete`](Self::verify_complete).
#[derive(Debug, Default)]
struct ChunkIndices {
    submitted: BTreeSet<usize>,
    duplicate: Option<usize>,
}

impl ChunkIndices {
    /// One past the highest index submitted so far.
    ///
    /// Saturates at `usize::MAX`, which then shows up as a duplicate.
    fn next_index(&self) -> usize {
        self.submitted
            .last()
            .map_or(0, |&last| last.saturating_add(1))
    }

    /// Records `index` as submitted. Returns `false` for a duplicate submission, which
    /// must not be scheduled.
    fn claim(&mut self, index: usize) -> bool {
        if !self.submitted.insert(index) {
            log::warn!("chunk {index} was submitted more than once");
            self.duplicate.get_or_insert(index);
            return false;
        }
        true
    }

    /// Returns the number of chunks if indices `0..N` were each submitted exactly once.
    fn verify_complete(&self) -> Result<usize> {
        if let Some(index) = self.duplicate {
            return Err(Error::invalid_state(format!(
                "chunk {index} was submitted more than once"
            )));
        }
        if let Some(missing) = self
            .submitted
            .iter()
            .enumerate()
            .find_map(|(expected, &index)| (index != expected).then_some(expected))
        {
            return Err(Error::invalid_state(format!(
                "chunk {missing} was never submitted"
            )));
        }
        Ok(self.submitted.len())
    }
}

/// A builder may only be finished after a successful join of its task group.
fn verify_joined(task_group: &dyn TaskGroup) -> Result<()> {
    if let Some(failure) = task_group.failure() {
        return Err(failure);
    }
    if !task_group.is_finished() {
        return Err(Error::invalid_state(
            "the task group must be joined before finishing the column",
        ));
    }
    Ok(())
}
