//! Conversion of raw textual chunks into typed Arrow arrays.
//!
//! A [`Converter`] is bound to one target [`DataType`] and one set of
//! [`ConvertOptions`]. Converting a chunk either yields an array with exactly one
//! entry per raw value, fails with a `TypeMismatch` error naming the first value that
//! is not representable in the target type, or fails fatally (`InvalidFormat`) when
//! the chunk cannot be materialized at all.
//!
//! # Null Handling
//!
//! For every non-text type a raw value that matches one of the configured null tokens
//! becomes a null entry. The `Utf8` and `Binary` types keep every value verbatim,
//! null tokens included, unless [`ConvertOptions::strings_can_be_null`] is set.

use std::{collections::HashSet, marker::PhantomData, sync::Arc};

use arrow_array::{
    ArrayRef, ArrowPrimitiveType, NullArray,
    builder::{BinaryBuilder, BooleanBuilder, PrimitiveBuilder, StringBuilder},
    types::{
        Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
        TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
        TimestampSecondType, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
    },
};
use arrow_cast::parse::Parser;
use arrow_schema::{DataType, TimeUnit};
use tabula_common::{Result, error::Error};

use crate::{chunk::TextChunk, options::ConvertOptions};

/// Converts textual chunks to arrays of one fixed type.
pub trait Converter: Send + Sync {
    /// The type of every array produced by [`convert`](Self::convert).
    fn data_type(&self) -> &DataType;

    fn convert(&self, chunk: &TextChunk) -> Result<ArrayRef>;
}

/// Creates a converter for `data_type`.
///
/// # Errors
///
/// Returns `InvalidArgument` if the type is not supported as a conversion target.
pub fn make_converter(
    data_type: &DataType,
    options: &ConvertOptions,
) -> Result<Arc<dyn Converter>> {
    let converter: Arc<dyn Converter> = match data_type {
        DataType::Null => Arc::new(NullConverter {
            data_type: DataType::Null,
            nulls: TokenSet::new(&options.null_values),
        }),
        DataType::Boolean => Arc::new(BooleanConverter {
            data_type: DataType::Boolean,
            nulls: TokenSet::new(&options.null_values),
            true_values: TokenSet::new(&options.true_values),
            false_values: TokenSet::new(&options.false_values),
        }),
        DataType::Int8 => PrimitiveConverter::<Int8Type>::make(data_type, options),
        DataType::Int16 => PrimitiveConverter::<Int16Type>::make(data_type, options),
        DataType::Int32 => PrimitiveConverter::<Int32Type>::make(data_type, options),
        DataType::Int64 => PrimitiveConverter::<Int64Type>::make(data_type, options),
        DataType::UInt8 => PrimitiveConverter::<UInt8Type>::make(data_type, options),
        DataType::UInt16 => PrimitiveConverter::<UInt16Type>::make(data_type, options),
        DataType::UInt32 => PrimitiveConverter::<UInt32Type>::make(data_type, options),
        DataType::UInt64 => PrimitiveConverter::<UInt64Type>::make(data_type, options),
        DataType::Float32 => PrimitiveConverter::<Float32Type>::make(data_type, options),
        DataType::Float64 => PrimitiveConverter::<Float64Type>::make(data_type, options),
        DataType::Timestamp(unit, None) => match unit {
            TimeUnit::Second => PrimitiveConverter::<TimestampSecondType>::make(data_type, options),
            TimeUnit::Millisecond => {
                PrimitiveConverter::<TimestampMillisecondType>::make(data_type, options)
            }
            TimeUnit::Microsecond => {
                PrimitiveConverter::<TimestampMicrosecondType>::make(data_type, options)
            }
            TimeUnit::Nanosecond => {
                PrimitiveConverter::<TimestampNanosecondType>::make(data_type, options)
            }
        },
        DataType::Utf8 => Arc::new(StringConverter {
            data_type: DataType::Utf8,
            nulls: text_nulls(options),
        }),
        DataType::Binary => Arc::new(BinaryConverter {
            data_type: DataType::Binary,
            nulls: text_nulls(options),
        }),
        other => {
            return Err(Error::invalid_arg(
                "data_type",
                format!("conversion to {other} is not supported"),
            ));
        }
    };
    Ok(converter)
}

/// Converts one chunk to `data_type` in a single call.
pub fn convert(
    chunk: &TextChunk,
    options: &ConvertOptions,
    data_type: &DataType,
) -> Result<ArrayRef> {
    make_converter(data_type, options)?.convert(chunk)
}

struct TokenSet(HashSet<Vec<u8>>);

impl TokenSet {
    fn new(tokens: &[String]) -> TokenSet {
        TokenSet(tokens.iter().map(|t| t.as_bytes().to_vec()).collect())
    }

    fn none() -> TokenSet {
        TokenSet(HashSet::new())
    }

    #[inline]
    fn contains(&self, value: &[u8]) -> bool {
        !self.0.is_empty() && self.0.contains(value)
    }
}

fn text_nulls(options: &ConvertOptions) -> TokenSet {
    if options.strings_can_be_null {
        TokenSet::new(&options.null_values)
    } else {
        TokenSet::none()
    }
}

struct NullConverter {
    data_type: DataType,
    nulls: TokenSet,
}

impl Converter for NullConverter {
    fn data_type(&self) -> &DataType {
        &self.data_type
    }

    fn convert(&self, chunk: &TextChunk) -> Result<ArrayRef> {
        if let Some((row, value)) = chunk
            .iter()
            .enumerate()
            .find(|(_, value)| !self.nulls.contains(value))
        {
            return Err(Error::type_mismatch(&self.data_type, row, value));
        }
        Ok(Arc::new(NullArray::new(chunk.num_rows())))
    }
}

struct BooleanConverter {
    data_type: DataType,
    nulls: TokenSet,
    true_values: TokenSet,
    false_values: TokenSet,
}

impl Converter for BooleanConverter {
    fn data_type(&self) -> &DataType {
        &self.data_type
    }

    fn convert(&self, chunk: &TextChunk) -> Result<ArrayRef> {
        let mut builder = BooleanBuilder::with_capacity(chunk.num_rows());
        for (row, value) in chunk.iter().enumerate() {
            if self.nulls.contains(value) {
                builder.append_null();
            } else if self.true_values.contains(value) {
                builder.append_value(true);
            } else if self.false_values.contains(value) {
                builder.append_value(false);
            } else {
                return Err(Error::type_mismatch(&self.data_type, row, value));
            }
        }
        Ok(Arc::new(builder.finish()))
    }
}

/// Numeric and timestamp conversion through the Arrow text parsers.
struct PrimitiveConverter<T> {
    data_type: DataType,
    nulls: TokenSet,
    _type: PhantomData<fn() -> T>,
}

impl<T> PrimitiveConverter<T>
where
    T: ArrowPrimitiveType + Parser,
{
    fn make(data_type: &DataType, options: &ConvertOptions) -> Arc<dyn Converter> {
        Arc::new(PrimitiveConverter::<T> {
            data_type: data_type.clone(),
            nulls: TokenSet::new(&options.null_values),
            _type: PhantomData,
        })
    }
}

impl<T> Converter for PrimitiveConverter<T>
where
    T: ArrowPrimitiveType + Parser,
{
    fn data_type(&self) -> &DataType {
        &self.data_type
    }

    fn convert(&self, chunk: &TextChunk) -> Result<ArrayRef> {
        let mut builder = PrimitiveBuilder::<T>::with_capacity(chunk.num_rows())
            .with_data_type(self.data_type.clone());
        for (row, value) in chunk.iter().enumerate() {
            if self.nulls.contains(value) {
                builder.append_null();
                continue;
            }
            match std::str::from_utf8(value).ok().and_then(T::parse) {
                Some(parsed) => builder.append_value(parsed),
                None => return Err(Error::type_mismatch(&self.data_type, row, value)),
            }
        }
        Ok(Arc::new(builder.finish()))
    }
}

/// Variable-length arrays use 32-bit offsets.
fn verify_offset_capacity(data_type: &DataType, chunk: &TextChunk) -> Result<()> {
    if chunk.data_len() > i32::MAX as usize {
        return Err(Error::invalid_format(
            format!("{data_type} chunk"),
            format!("{} bytes exceed the 32-bit offset range", chunk.data_len()),
        ));
    }
    Ok(())
}

struct StringConverter {
    data_type: DataType,
    nulls: TokenSet,
}

impl Converter for StringConverter {
    fn data_type(&self) -> &DataType {
        &self.data_type
    }

    fn convert(&self, chunk: &TextChunk) -> Result<ArrayRef> {
        verify_offset_capacity(&self.data_type, chunk)?;
        let mut builder = StringBuilder::with_capacity(chunk.num_rows(), chunk.data_len());
        for (row, value) in chunk.iter().enumerate() {
            if self.nulls.contains(value) {
                builder.append_null();
                continue;
            }
            match std::str::from_utf8(value) {
                Ok(s) => builder.append_value(s),
                Err(_) => return Err(Error::type_mismatch(&self.data_type, row, value)),
            }
        }
        Ok(Arc::new(builder.finish()))
    }
}

struct BinaryConverter {
    data_type: DataType,
    nulls: TokenSet,
}

impl Converter for BinaryConverter {
    fn data_type(&self) -> &DataType {
        &self.data_type
    }

    fn convert(&self, chunk: &TextChunk) -> Result<ArrayRef> {
        verify_offset_capacity(&self.data_type, chunk)?;
        let mut builder = BinaryBuilder::with_capacity(chunk.num_rows(), chunk.data_len());
        for value in chunk.iter() {
            if self.nulls.contains(value) {
                builder.append_null();
            } else {
                builder.append_value(value);
            }
        }
        Ok(Arc::new(builder.finish()))
    }
}
