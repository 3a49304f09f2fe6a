//! # Tabula CSV
//!
//! Typed column conversion for CSV data that has already been split into per-column
//! textual chunks.
//!
//! A column arrives as an ordered sequence of [`TextChunk`]s. A [`ColumnBuilder`]
//! converts each chunk into an Arrow array on a
//! [`TaskGroup`](tabula_workflow::task_group::TaskGroup) and assembles the results into
//! a [`Column`] whose chunks keep the submission order.
//!
//! ## Fixed and Inferred Types
//!
//! - [`make_column_builder`] converts every chunk to a caller-supplied Arrow type.
//! - [`make_inferring_column_builder`] discovers the type. It walks the
//!   [`InferKind`] ladder `Null -> Int64 -> Boolean -> Timestamp -> Double -> Text ->
//!   Binary`, widening whenever a chunk fails to convert and re-converting the chunks
//!   that were already done, so the final column has the narrowest type that accepts
//!   every value.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use arrow_schema::DataType;
//! use tabula_csv::{ConvertOptions, TextChunk, make_inferring_column_builder};
//! use tabula_workflow::task_group;
//!
//! let mut builder = make_inferring_column_builder(
//!     0,
//!     Arc::new(ConvertOptions::defaults()),
//!     task_group::make_serial(),
//! )
//! .unwrap();
//! builder.append(Arc::new(TextChunk::from_values(["", "008"])));
//! builder.append(Arc::new(TextChunk::from_values(["NaN", "12.5"])));
//! builder.task_group().finish().unwrap();
//!
//! let column = builder.finish().unwrap();
//! assert_eq!(column.data_type(), &DataType::Float64);
//! assert_eq!(column.null_count(), 2);
//! ```

pub mod chunk;
pub mod column;
pub mod column_builder;
pub mod converter;
pub mod ladder;
pub mod options;

pub use chunk::TextChunk;
pub use column::Column;
pub use column_builder::{ColumnBuilder, make_column_builder, make_inferring_column_builder};
pub use converter::{Converter, make_converter};
pub use ladder::InferKind;
pub use options::ConvertOptions;
