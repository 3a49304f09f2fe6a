use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use arrow_array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Float64Array, Int32Array, Int64Array, NullArray,
    StringArray,
};
use arrow_schema::DataType;
use tabula_common::{
    Result,
    error::{Error, ErrorKind},
};
use tabula_workflow::{
    task_group::{self, TaskGroup},
    thread_pool::ThreadPool,
};

use super::{
    ColumnBuilder, FixedColumnBuilder, InferringColumnBuilder, make_column_builder,
    make_inferring_column_builder,
};
use crate::{
    chunk::TextChunk,
    column::Column,
    converter::{Converter, make_converter},
    ladder::{InferKind, InferenceLadder},
    options::ConvertOptions,
};

fn chunk(values: &[&str]) -> Arc<TextChunk> {
    Arc::new(TextChunk::from_values(values))
}

fn default_options() -> Arc<ConvertOptions> {
    Arc::new(ConvertOptions::defaults())
}

fn fixed(data_type: &DataType, task_group: Arc<dyn TaskGroup>) -> Box<dyn ColumnBuilder> {
    make_column_builder(data_type, 0, default_options(), task_group).unwrap()
}

fn inferring(task_group: Arc<dyn TaskGroup>) -> Box<dyn ColumnBuilder> {
    make_inferring_column_builder(0, default_options(), task_group).unwrap()
}

fn join_and_finish(builder: Box<dyn ColumnBuilder>) -> Column {
    builder.task_group().finish().unwrap();
    builder.finish().unwrap()
}

fn infer_serial(chunks: &[&[&str]]) -> Column {
    let mut builder = inferring(task_group::make_serial());
    for values in chunks {
        builder.append(chunk(values));
    }
    join_and_finish(builder)
}

fn assert_chunks(column: &Column, expected: &[ArrayRef]) {
    assert_eq!(column.num_chunks(), expected.len());
    for (i, (actual, expected)) in column.chunks().iter().zip(expected).enumerate() {
        assert_eq!(actual.to_data(), expected.to_data(), "chunk {i}");
    }
}

fn int64(values: &[Option<i64>]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

fn float64(values: &[Option<f64>]) -> ArrayRef {
    Arc::new(Float64Array::from(values.to_vec()))
}

fn utf8(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

fn assert_invalid_state(result: Result<Column>) {
    match result {
        Err(e) => assert!(
            matches!(e.kind(), ErrorKind::InvalidState { .. }),
            "unexpected error: {e}"
        ),
        Ok(column) => panic!("unexpected success: {:?}", column.data_type()),
    }
}

#[test]
fn test_fixed_empty() {
    let builder = fixed(&DataType::Int32, task_group::make_serial());
    let column = join_and_finish(builder);
    assert_eq!(column.data_type(), &DataType::Int32);
    assert_eq!(column.num_chunks(), 0);
}

#[test]
fn test_fixed_basics() {
    let mut builder = fixed(&DataType::Int32, task_group::make_serial());
    builder.append(chunk(&["123", "-456"]));
    let column = join_and_finish(builder);
    assert_eq!(column.data_type(), &DataType::Int32);
    assert_chunks(&column, &[Arc::new(Int32Array::from(vec![123, -456]))]);
}

#[test]
fn test_fixed_insert_out_of_order() {
    let mut builder = fixed(&DataType::Int32, task_group::make_serial());
    builder.insert(1, chunk(&["456"]));
    builder.insert(0, chunk(&["123", ""]));
    let column = join_and_finish(builder);
    assert_chunks(
        &column,
        &[
            Arc::new(Int32Array::from(vec![Some(123), None])),
            Arc::new(Int32Array::from(vec![456])),
        ],
    );
}

#[test]
fn test_fixed_multiple_chunks() {
    let mut builder = fixed(&DataType::Int32, task_group::make_serial());
    builder.append(chunk(&["1", "2"]));
    builder.append(chunk(&["3"]));
    builder.append(chunk(&["4", "NA", "6"]));
    let column = join_and_finish(builder);
    assert_eq!(column.len(), 6);
    assert_chunks(
        &column,
        &[
            Arc::new(Int32Array::from(vec![1, 2])),
            Arc::new(Int32Array::from(vec![3])),
            Arc::new(Int32Array::from(vec![Some(4), None, Some(6)])),
        ],
    );
}

#[test]
fn test_fixed_multiple_chunks_parallel() {
    let task_group = task_group::make_threaded(ThreadPool::new(4));
    let mut builder = fixed(&DataType::Int32, task_group);
    for i in 0..16 {
        let (a, b) = (i.to_string(), (i * 10).to_string());
        builder.append(chunk(&[a.as_str(), b.as_str()]));
    }
    let column = join_and_finish(builder);
    let expected = (0..16)
        .map(|i| Arc::new(Int32Array::from(vec![i, i * 10])) as ArrayRef)
        .collect::<Vec<_>>();
    assert_chunks(&column, &expected);
}

#[test]
fn test_fixed_other_types() {
    let mut builder = fixed(&DataType::Boolean, task_group::make_serial());
    builder.append(chunk(&["true", "", "False"]));
    let column = join_and_finish(builder);
    assert_chunks(
        &column,
        &[Arc::new(BooleanArray::from(vec![Some(true), None, Some(false)]))],
    );

    let mut builder = fixed(&DataType::Utf8, task_group::make_serial());
    builder.append(chunk(&["", "NA"]));
    let column = join_and_finish(builder);
    assert_chunks(&column, &[utf8(&["", "NA"])]);
}

#[test]
fn test_fixed_conversion_failure() {
    let mut builder = fixed(&DataType::Int32, task_group::make_serial());
    builder.append(chunk(&["1"]));
    builder.append(chunk(&["2", "x"]));
    builder.append(chunk(&["3"]));

    let err = builder.task_group().finish().unwrap_err();
    assert!(err.is_type_mismatch());
    assert!(!builder.task_group().ok());

    // The join's failure is what finish reports, not a generic state error.
    let err = builder.finish().err().unwrap();
    match err.kind() {
        ErrorKind::TypeMismatch { row, value, .. } => {
            assert_eq!(*row, 1);
            assert_eq!(value, "x");
        }
        other => panic!("unexpected error kind: {other:?}"),
    }
}

#[test]
fn test_fixed_failure_survives_threaded_join() {
    let mut builder = fixed(&DataType::Int32, task_group::make_threaded(ThreadPool::new(2)));
    builder.append(chunk(&["x"]));
    assert!(builder.task_group().finish().unwrap_err().is_type_mismatch());
    assert!(builder.task_group().finish().unwrap_err().is_type_mismatch());
    assert!(builder.finish().err().unwrap().is_type_mismatch());
}

#[test]
fn test_fixed_unsupported_type() {
    let err = make_column_builder(
        &DataType::Date32,
        0,
        default_options(),
        task_group::make_serial(),
    )
    .err()
    .unwrap();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
}

#[test]
fn test_conflicting_options_rejected() {
    let options = ConvertOptions::defaults().with_false_values(["false", "true"]);
    let err = make_inferring_column_builder(0, Arc::new(options), task_group::make_serial())
        .err()
        .unwrap();
    assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
}

#[test]
fn test_finish_requires_join() {
    // A serial group has run its tasks already but still needs the join.
    let mut builder = fixed(&DataType::Int32, task_group::make_serial());
    builder.append(chunk(&["1"]));
    assert_invalid_state(builder.finish());

    let mut builder = inferring(task_group::make_threaded(ThreadPool::new(2)));
    builder.append(chunk(&["1"]));
    builder.task_group().finish().unwrap();
    builder.append(chunk(&["2"]));
    assert_invalid_state(builder.finish());
}

#[test]
fn test_finish_rejects_gaps() {
    let mut builder = inferring(task_group::make_serial());
    builder.insert(0, chunk(&["1"]));
    builder.insert(2, chunk(&["3"]));
    builder.task_group().finish().unwrap();
    assert_invalid_state(builder.finish());

    let mut builder = fixed(&DataType::Int64, task_group::make_serial());
    builder.insert(1, chunk(&["1"]));
    builder.task_group().finish().unwrap();
    assert_invalid_state(builder.finish());
}

#[test]
fn test_out_of_range_index_is_a_gap() {
    let mut builder = fixed(&DataType::Int32, task_group::make_serial());
    builder.insert(0, chunk(&["1"]));
    builder.insert(usize::MAX, chunk(&["2"]));
    builder.task_group().finish().unwrap();
    assert_invalid_state(builder.finish());

    let mut builder = inferring(task_group::make_threaded(ThreadPool::new(2)));
    builder.insert(1 << 40, chunk(&["1"]));
    builder.insert(usize::MAX, chunk(&["2"]));
    // Appending past the last possible index collides with it.
    builder.append(chunk(&["3"]));
    builder.task_group().finish().unwrap();
    assert_invalid_state(builder.finish());
}

#[test]
fn test_finish_rejects_duplicates() {
    let mut builder = inferring(task_group::make_serial());
    builder.insert(0, chunk(&["1"]));
    builder.insert(0, chunk(&["2"]));
    builder.task_group().finish().unwrap();
    assert_invalid_state(builder.finish());
}

#[test]
fn test_append_after_insert() {
    let mut builder = inferring(task_group::make_serial());
    builder.insert(2, chunk(&["3"]));
    builder.append(chunk(&["4"]));
    builder.insert(0, chunk(&["1"]));
    builder.insert(1, chunk(&["2"]));
    let column = join_and_finish(builder);
    assert_chunks(
        &column,
        &[
            int64(&[Some(1)]),
            int64(&[Some(2)]),
            int64(&[Some(3)]),
            int64(&[Some(4)]),
        ],
    );
}

#[test]
fn test_inferring_empty() {
    let column = infer_serial(&[]);
    assert_eq!(column.data_type(), &DataType::Null);
    assert_eq!(column.num_chunks(), 0);
}

#[test]
fn test_inferring_single_chunk_null() {
    let column = infer_serial(&[&["", "NA"]]);
    assert_eq!(column.data_type(), &DataType::Null);
    assert_chunks(&column, &[Arc::new(NullArray::new(2))]);
}

#[test]
fn test_inferring_multiple_chunk_null() {
    let column = infer_serial(&[&["", "NA"], &["nan"], &["NULL"]]);
    assert_eq!(column.data_type(), &DataType::Null);
    assert_eq!(column.len(), 4);
    assert_eq!(column.null_count(), 4);
    assert_chunks(
        &column,
        &[
            Arc::new(NullArray::new(2)),
            Arc::new(NullArray::new(1)),
            Arc::new(NullArray::new(1)),
        ],
    );
}

#[test]
fn test_inferring_single_chunk_integer() {
    let column = infer_serial(&[&["", "NA", "123", "456"]]);
    assert_eq!(column.data_type(), &DataType::Int64);
    assert_chunks(&column, &[int64(&[None, None, Some(123), Some(456)])]);
}

#[test]
fn test_inferring_multiple_chunk_integer() {
    let column = infer_serial(&[&[""], &["NA", "123", "456"]]);
    assert_eq!(column.data_type(), &DataType::Int64);
    assert_chunks(
        &column,
        &[int64(&[None]), int64(&[None, Some(123), Some(456)])],
    );
}

#[test]
fn test_inferring_single_chunk_real() {
    let column = infer_serial(&[&["", "008", "NaN", "12.5"]]);
    assert_eq!(column.data_type(), &DataType::Float64);
    assert_chunks(&column, &[float64(&[None, Some(8.0), None, Some(12.5)])]);
}

#[test]
fn test_inferring_multiple_chunk_real() {
    let column = infer_serial(&[&[""], &["008"], &["NaN", "12.5"]]);
    assert_eq!(column.data_type(), &DataType::Float64);
    assert_chunks(
        &column,
        &[
            float64(&[None]),
            float64(&[Some(8.0)]),
            float64(&[None, Some(12.5)]),
        ],
    );
}

#[test]
fn test_inferring_single_chunk_string() {
    let column = infer_serial(&[&["", "008", "NaN", "bar"]]);
    assert_eq!(column.data_type(), &DataType::Utf8);
    assert_chunks(&column, &[utf8(&["", "008", "NaN", "bar"])]);
    assert_eq!(column.null_count(), 0);
}

#[test]
fn test_inferring_multiple_chunk_string() {
    let column = infer_serial(&[&[""], &["008"], &["NaN", "bar"]]);
    assert_eq!(column.data_type(), &DataType::Utf8);
    assert_chunks(&column, &[utf8(&[""]), utf8(&["008"]), utf8(&["NaN", "bar"])]);
    assert_eq!(column.null_count(), 0);
}

#[test]
fn test_inferring_boolean() {
    let column = infer_serial(&[&["NA"], &["true", "FALSE"]]);
    assert_eq!(column.data_type(), &DataType::Boolean);
    assert_chunks(
        &column,
        &[
            Arc::new(BooleanArray::from(vec![None])),
            Arc::new(BooleanArray::from(vec![Some(true), Some(false)])),
        ],
    );
}

#[test]
fn test_inferring_timestamp() {
    let column = infer_serial(&[&[""], &["1970-01-01T00:00:01"]]);
    assert_eq!(column.data_type(), &InferKind::Timestamp.data_type());
    assert_eq!(column.len(), 2);
    assert_eq!(column.null_count(), 1);
}

#[test]
fn test_inferring_rewidens_earlier_chunks() {
    // Int64 -> Boolean fails on "1"; the only kind accepting both chunks is Text.
    let column = infer_serial(&[&["1"], &["true"]]);
    assert_eq!(column.data_type(), &DataType::Utf8);
    assert_chunks(&column, &[utf8(&["1"]), utf8(&["true"])]);

    let column = infer_serial(&[&["1", "2"], &["3.5"], &["4"]]);
    assert_eq!(column.data_type(), &DataType::Float64);
    assert_chunks(
        &column,
        &[
            float64(&[Some(1.0), Some(2.0)]),
            float64(&[Some(3.5)]),
            float64(&[Some(4.0)]),
        ],
    );
}

#[test]
fn test_inferring_invalid_utf8_falls_back_to_binary() {
    let mut builder = inferring(task_group::make_serial());
    builder.append(chunk(&["abc"]));
    builder.append(Arc::new(TextChunk::from_values([&b""[..], &[0xffu8, 0x00][..]])));
    let column = join_and_finish(builder);
    assert_eq!(column.data_type(), &DataType::Binary);
    assert_chunks(
        &column,
        &[
            Arc::new(BinaryArray::from_vec(vec![&b"abc"[..]])),
            Arc::new(BinaryArray::from_vec(vec![&b""[..], &[0xffu8, 0x00][..]])),
        ],
    );
}

#[test]
fn test_inferring_without_utf8_check_skips_text() {
    let options = ConvertOptions::defaults().with_check_utf8(false);
    let mut builder =
        make_inferring_column_builder(0, Arc::new(options), task_group::make_serial()).unwrap();
    builder.append(chunk(&["1"]));
    builder.append(chunk(&["bar"]));
    let column = join_and_finish(builder);
    assert_eq!(column.data_type(), &DataType::Binary);
    assert_chunks(
        &column,
        &[
            Arc::new(BinaryArray::from_vec(vec![&b"1"[..]])),
            Arc::new(BinaryArray::from_vec(vec![&b"bar"[..]])),
        ],
    );
}

#[test]
fn test_inferring_strings_can_be_null() {
    let options = ConvertOptions::defaults().with_strings_can_be_null(true);
    let mut builder =
        make_inferring_column_builder(0, Arc::new(options), task_group::make_serial()).unwrap();
    builder.append(chunk(&["", "x"]));
    let column = join_and_finish(builder);
    assert_eq!(column.data_type(), &DataType::Utf8);
    assert_chunks(&column, &[Arc::new(StringArray::from(vec![None, Some("x")]))]);
}

#[test]
fn test_inferring_is_idempotent() {
    let chunks: &[&[&str]] = &[&["", "1"], &["NA"], &["2.5", "x"], &["7"]];
    assert_eq!(infer_serial(chunks), infer_serial(chunks));
}

#[test]
fn test_inferring_multiple_chunk_integer_parallel() {
    let task_group = task_group::make_threaded(ThreadPool::new(4));
    let mut builder = inferring(task_group);
    for values in [&["1", "2"][..], &["3"][..], &["4", "5", ""][..], &["6"][..]] {
        builder.append(chunk(values));
    }
    let column = join_and_finish(builder);
    assert_eq!(column.data_type(), &DataType::Int64);
    assert_chunks(
        &column,
        &[
            int64(&[Some(1), Some(2)]),
            int64(&[Some(3)]),
            int64(&[Some(4), Some(5), None]),
            int64(&[Some(6)]),
        ],
    );
}

#[test]
fn test_inferring_parallel_matches_serial() {
    let values = (0..64)
        .map(|i| match i % 7 {
            0 => vec![String::new(), i.to_string()],
            3 if i > 40 => vec![format!("{i}.5")],
            _ => vec![i.to_string()],
        })
        .collect::<Vec<_>>();
    let chunks = values
        .iter()
        .map(|v| Arc::new(TextChunk::from_values(v)))
        .collect::<Vec<_>>();

    let run = |task_group: Arc<dyn TaskGroup>, reverse: bool| {
        let mut builder = inferring(task_group);
        let mut order = (0..chunks.len()).collect::<Vec<_>>();
        if reverse {
            order.reverse();
        }
        for i in order {
            builder.insert(i, chunks[i].clone());
        }
        join_and_finish(builder)
    };

    let serial = run(task_group::make_serial(), false);
    assert_eq!(serial.data_type(), &DataType::Float64);
    for _ in 0..4 {
        let parallel = run(task_group::make_threaded(ThreadPool::new(4)), true);
        assert_eq!(parallel, serial);
    }
}

/// Delegates to an inner converter, failing fatally on a marker value.
struct FailingConverter {
    inner: Arc<dyn Converter>,
    marker: &'static [u8],
    calls: AtomicUsize,
}

impl Converter for FailingConverter {
    fn data_type(&self) -> &DataType {
        self.inner.data_type()
    }

    fn convert(&self, chunk: &TextChunk) -> Result<ArrayRef> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if chunk.iter().any(|value| value == self.marker) {
            return Err(Error::invalid_format("chunk", "marker value"));
        }
        self.inner.convert(chunk)
    }
}

fn ladder_failing_at(kind: InferKind, marker: &'static [u8]) -> InferenceLadder {
    let options = ConvertOptions::defaults();
    let converters = InferKind::ALL
        .iter()
        .map(|&k| {
            let converter = make_converter(&k.data_type(), &options).unwrap();
            if k == kind {
                Arc::new(FailingConverter {
                    inner: converter,
                    marker,
                    calls: AtomicUsize::new(0),
                }) as Arc<dyn Converter>
            } else {
                converter
            }
        })
        .collect();
    InferenceLadder::with_converters(true, converters).unwrap()
}

#[test]
fn test_fatal_error_during_widening() {
    let ladder = ladder_failing_at(InferKind::Double, b"1.5");
    let mut builder: Box<dyn ColumnBuilder> = Box::new(InferringColumnBuilder::with_ladder(
        ladder,
        0,
        task_group::make_serial(),
    ));
    builder.append(chunk(&["1"]));
    builder.append(chunk(&["1.5"]));
    builder.append(chunk(&["2"]));

    let err = builder.task_group().finish().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidFormat { .. }));
    let err = builder.finish().err().unwrap();
    assert!(matches!(err.kind(), ErrorKind::InvalidFormat { .. }));
}

#[test]
fn test_fixed_with_custom_converter() {
    let converter = Arc::new(FailingConverter {
        inner: make_converter(&DataType::Int64, &ConvertOptions::defaults()).unwrap(),
        marker: b"boom",
        calls: AtomicUsize::new(0),
    });
    let mut builder = FixedColumnBuilder::with_converter(
        converter.clone(),
        0,
        task_group::make_threaded(ThreadPool::new(2)),
    );
    builder.append(chunk(&["1"]));
    builder.append(chunk(&["2"]));
    let column = join_and_finish(Box::new(builder));
    assert_chunks(&column, &[int64(&[Some(1)]), int64(&[Some(2)])]);
    assert_eq!(converter.calls.load(Ordering::Relaxed), 2);
}
