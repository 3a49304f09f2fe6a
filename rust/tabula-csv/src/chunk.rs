//! Raw textual chunks, as produced by the CSV tokenizer for a single column.

use tabula_common::{Result, error::Error};

/// An immutable batch of raw field values for one column, one value per row.
///
/// All values are stored back to back in a single byte buffer, delimited by an
/// offsets vector with `num_rows + 1` entries. Values are not required to be valid
/// UTF-8; the conversion step decides what to make of the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    data: Vec<u8>,
    offsets: Vec<usize>,
}

impl TextChunk {
    /// Builds a chunk by copying each value into the contiguous buffer.
    pub fn from_values<I, V>(values: I) -> TextChunk
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[u8]>,
    {
        let values = values.into_iter();
        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(values.size_hint().0 + 1);
        offsets.push(0);
        for value in values {
            data.extend_from_slice(value.as_ref());
            offsets.push(data.len());
        }
        TextChunk { data, offsets }
    }

    /// Wraps tokenizer output without copying.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `offsets` is empty, does not start at zero,
    /// decreases anywhere, or points past the end of `data`.
    pub fn try_new(data: Vec<u8>, offsets: Vec<usize>) -> Result<TextChunk> {
        if offsets.first() != Some(&0) {
            return Err(Error::invalid_format("text chunk", "offsets must start at zero"));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::invalid_format("text chunk", "offsets are not monotonic"));
        }
        let end = offsets.last().copied().unwrap_or_default();
        if end > data.len() {
            return Err(Error::invalid_format(
                "text chunk",
                format!("offset {end} is past the end of {} data bytes", data.len()),
            ));
        }
        Ok(TextChunk { data, offsets })
    }

    pub fn empty() -> TextChunk {
        TextChunk {
            data: Vec::new(),
            offsets: vec![0],
        }
    }

    /// Number of rows (values) spanned by this chunk.
    pub fn num_rows(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Raw bytes of the value at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= num_rows()`.
    pub fn value(&self, row: usize) -> &[u8] {
        &self.data[self.offsets[row]..self.offsets[row + 1]]
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
        self.offsets.windows(2).map(|w| &self.data[w[0]..w[1]])
    }

    /// Total byte length of all values.
    pub fn data_len(&self) -> usize {
        self.offsets.last().copied().unwrap_or_default()
    }
}

impl<V: AsRef<[u8]>> FromIterator<V> for TextChunk {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        TextChunk::from_values(iter)
    }
}
