//! The assembled output of a column builder.

use arrow_array::{Array, ArrayRef, new_empty_array};
use arrow_schema::DataType;
use tabula_common::{Result, error::Error};

/// An ordered sequence of array chunks sharing one data type.
///
/// Chunk `i` holds the converted values of the `i`-th textual chunk submitted to the
/// builder that produced this column.
#[derive(Debug, Clone)]
pub struct Column {
    data_type: DataType,
    chunks: Vec<ArrayRef>,
}

impl Column {
    /// Creates a column, verifying that every chunk has type `data_type`.
    pub fn try_new(data_type: DataType, chunks: Vec<ArrayRef>) -> Result<Column> {
        if let Some((i, chunk)) = chunks
            .iter()
            .enumerate()
            .find(|(_, chunk)| chunk.data_type() != &data_type)
        {
            return Err(Error::invalid_arg(
                "chunks",
                format!(
                    "chunk {i} has type {}, expected {data_type}",
                    chunk.data_type()
                ),
            ));
        }
        Ok(Column { data_type, chunks })
    }

    /// A column with no chunks.
    pub fn empty(data_type: DataType) -> Column {
        Column {
            data_type,
            chunks: Vec::new(),
        }
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, i: usize) -> &ArrayRef {
        &self.chunks[i]
    }

    pub fn chunks(&self) -> &[ArrayRef] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<ArrayRef> {
        self.chunks
    }

    /// Total number of rows across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        self.chunks.iter().map(|c| c.logical_null_count()).sum()
    }

    /// Concatenates all chunks into one array.
    pub fn concat(&self) -> Result<ArrayRef> {
        if self.chunks.is_empty() {
            return Ok(new_empty_array(&self.data_type));
        }
        let arrays = self.chunks.iter().map(|c| c.as_ref()).collect::<Vec<_>>();
        arrow_select::concat::concat(&arrays).map_err(|e| Error::arrow("concat column", e))
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.data_type == other.data_type
            && self.chunks.len() == other.chunks.len()
            && self
                .chunks
                .iter()
                .zip(&other.chunks)
                .all(|(a, b)| a.to_data() == b.to_data())
    }
}
