//! Serial reads through the CSV input driver.

use shardcsv::metrics::{CONVERSION_ERRORS, HEADERS_SKIPPED, OBJECTS_OPENED, ROWS_READ};
use shardcsv::*;
use std::io::{self, Read};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod fixtures;
use fixtures::{as_strings, read_all, store_with, string_fields};

fn strs(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some((*v).to_string())).collect()
}

// ============================================================================
// Headers and basic reads
// ============================================================================

#[test]
fn test_header_and_enclosed_delimiter() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("people.csv", b"name,age\n\"Jo,e\",30\n")]);
    let config = CsvInputConfig {
        header_present: true,
        ..CsvInputConfig::new(names, string_fields(&["name", "age"]))
    };

    let rows = read_all(&config, &store)?;
    assert_eq!(as_strings(&rows), vec![strs(&["Jo,e", "30"])]);
    Ok(())
}

#[test]
fn test_header_skipped_once_per_object() -> anyhow::Result<()> {
    let (store, names) = store_with(&[
        ("a.csv", b"\xEF\xBB\xBFid,v\n1,a\n2,b\n"),
        ("b.csv", b"id,v\r\n3,c\r\n"),
    ]);
    let config = CsvInputConfig {
        header_present: true,
        ..CsvInputConfig::new(names, string_fields(&["id", "v"]))
    };

    let metrics = MetricsCollector::new();
    let mut input = CsvInput::new(config, Arc::new(store))?.with_metrics(metrics.clone());
    let rows = input.rows().collect::<Result<Vec<_>>>()?;

    assert_eq!(
        as_strings(&rows),
        vec![strs(&["1", "a"]), strs(&["2", "b"]), strs(&["3", "c"])]
    );
    assert_eq!(input.state(), InputState::AllObjectsExhausted);
    assert!(input.plan().is_none());
    assert_eq!(metrics.counter(HEADERS_SKIPPED), 2);
    assert_eq!(metrics.counter(OBJECTS_OPENED), 2);
    assert_eq!(metrics.counter(ROWS_READ), 3);
    Ok(())
}

#[test]
fn test_without_header_first_line_is_data() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"id,v\n1,a")]);
    let config = CsvInputConfig::new(names, string_fields(&["id", "v"]));

    let rows = read_all(&config, &store)?;
    assert_eq!(as_strings(&rows), vec![strs(&["id", "v"]), strs(&["1", "a"])]);
    Ok(())
}

#[test]
fn test_short_rows_are_null_filled_and_surplus_dropped() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"1\n2,b,extra,\"more,\"\n\n3,c\n")]);
    let config = CsvInputConfig::new(names, string_fields(&["id", "v"]));

    let rows = read_all(&config, &store)?;
    assert_eq!(
        as_strings(&rows),
        vec![
            vec![Some("1".to_string()), None],
            strs(&["2", "b"]),
            strs(&["3", "c"]),
        ]
    );
    Ok(())
}

#[test]
fn test_filename_and_row_number_fields() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"h\nx\ny\n"), ("b.csv", b"h\nz\n")]);
    let config = CsvInputConfig {
        header_present: true,
        include_filename: true,
        filename_field: Some("source".into()),
        row_number_field: Some("line".into()),
        ..CsvInputConfig::new(names.clone(), string_fields(&["value"]))
    };

    let mut input = CsvInput::new(config, Arc::new(store))?;
    assert_eq!(input.output_fields(), vec!["value", "source", "line"]);
    assert_eq!(input.config().row_number_field.as_deref(), Some("line"));

    let rows = input.rows().collect::<Result<Vec<_>>>()?;
    let seen: Vec<(String, String, i64)> = rows
        .iter()
        .map(|r| {
            (
                r.values[0].as_str().unwrap_or_default().to_string(),
                r.values[1].as_str().unwrap_or_default().to_string(),
                r.values[2].as_value().and_then(Value::as_i64).unwrap_or(-1),
            )
        })
        .collect();
    assert_eq!(
        seen,
        vec![
            ("x".to_string(), names[0].clone(), 1),
            ("y".to_string(), names[0].clone(), 2),
            ("z".to_string(), names[1].clone(), 1),
        ]
    );
    Ok(())
}

#[test]
fn test_header_names_drive_mapping() -> anyhow::Result<()> {
    let (store, names) = store_with(&[
        ("a.csv", b"ID,ignored,\"Name\"\n1,x,Ann\n"),
        ("b.csv", b"name,id\nBob,2\n"),
        ("c.csv", b"other\nq\n"),
    ]);
    let config = CsvInputConfig {
        header_present: true,
        match_header_names: true,
        ..CsvInputConfig::new(names, string_fields(&["id", "name"]))
    };

    let rows = read_all(&config, &store)?;
    assert_eq!(as_strings(&rows), vec![strs(&["1", "Ann"]), strs(&["2", "Bob"])]);
    Ok(())
}

// ============================================================================
// Conversion
// ============================================================================

fn typed_config(names: Vec<String>) -> CsvInputConfig {
    let mut amount = FieldDef::new("amount", FieldType::Number);
    amount.decimal_symbol = ",".into();
    CsvInputConfig {
        header_present: true,
        delimiter: ';',
        ..CsvInputConfig::new(
            names,
            vec![
                FieldDef::new("id", FieldType::Integer),
                amount,
                FieldDef::new("day", FieldType::Date).with_format("%Y-%m-%d"),
                FieldDef::new("ok", FieldType::Boolean),
            ],
        )
    }
}

#[test]
fn test_eager_conversion() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("t.csv", b"id;amount;day;ok\n7;12,5;2024-02-29;Y\n8;;;N\n")]);
    let rows = read_all(&typed_config(names), &store)?;

    assert_eq!(rows[0].values[0], FieldValue::Value(Value::Integer(7)));
    assert_eq!(rows[0].values[1], FieldValue::Value(Value::Number(12.5)));
    assert!(matches!(rows[0].values[2], FieldValue::Value(Value::Date(_))));
    assert_eq!(rows[0].values[3], FieldValue::Value(Value::Boolean(true)));
    assert!(rows[1].values[1].is_null());
    assert!(rows[1].values[2].is_null());

    let amounts: Vec<Option<f64>> = rows
        .iter()
        .flat_map(|r| &r.values[..2])
        .map(|v| v.as_value().and_then(Value::as_f64))
        .collect();
    assert_eq!(amounts, vec![Some(7.0), Some(12.5), Some(8.0), None]);
    Ok(())
}

#[test]
fn test_lazy_conversion_keeps_raw_bytes() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("t.csv", b"id;amount;day;ok\n7;12,5;2024-02-29;Y\n")]);
    let config = CsvInputConfig {
        lazy_conversion: true,
        ..typed_config(names)
    };

    let rows = read_all(&config, &store)?;
    assert_eq!(rows[0].values[1].as_raw(), Some(&b"12,5"[..]));

    let amount = rows[0].values[1]
        .clone()
        .materialize(&config.fields[1], &DefaultConverter)?;
    assert_eq!(amount, FieldValue::Value(Value::Number(12.5)));
    Ok(())
}

#[test]
fn test_conversion_failure_stops_read() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("t.csv", b"id;amount;day;ok\n1;1;2024-01-01;Y\nx;y;2024-01-01;Y\n3;3;2024-01-01;Y\n")]);
    let mut input = CsvInput::new(typed_config(names.clone()), Arc::new(store))?;

    assert!(input.next_row()?.is_some());
    let err = input.next_row().unwrap_err();
    match &err {
        CsvInputError::Conversion(errors) => {
            assert_eq!(errors.row_number, 2);
            assert_eq!(errors.object, names[0]);
            assert_eq!(errors.causes.len(), 2);
            assert_eq!(errors.causes[0].field, "id");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(input.next_row()?.is_none());
    assert_eq!(input.state(), InputState::AllObjectsExhausted);
    Ok(())
}

#[test]
fn test_conversion_failure_routed() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("t.csv", b"id;amount;day;ok\nx;1;bad;Y\n3;3;2024-01-01;Y\n")]);
    let config = CsvInputConfig {
        on_conversion_error: ConversionErrorPolicy::Route,
        ..typed_config(names)
    };
    let metrics = MetricsCollector::new();
    let mut input = CsvInput::new(config, Arc::new(store))?.with_metrics(metrics.clone());

    let rows = input.rows().collect::<Result<Vec<_>>>()?;
    assert_eq!(rows.len(), 2);
    assert!(rows[0].has_errors());
    assert_eq!(rows[0].errors.len(), 2);
    assert!(rows[0].values[0].is_null());
    assert_eq!(rows[0].values[1], FieldValue::Value(Value::Number(1.0)));
    assert!(!rows[1].has_errors());
    assert_eq!(metrics.counter(CONVERSION_ERRORS), 2);
    Ok(())
}

struct Upper;

impl ValueConverter for Upper {
    fn convert(&self, raw: &[u8], _field: &FieldDef) -> std::result::Result<Option<Value>, FieldConversionError> {
        Ok(Some(Value::String(String::from_utf8_lossy(raw).to_uppercase())))
    }
}

#[test]
fn test_custom_converter() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"abc\n")]);
    let config = CsvInputConfig::new(names, string_fields(&["v"]));
    let mut input = CsvInput::new(config, Arc::new(store))?.with_converter(Arc::new(Upper));

    let row = input.next_row()?.unwrap();
    assert_eq!(row.values[0].as_str(), Some("ABC"));
    Ok(())
}

// ============================================================================
// Object sources
// ============================================================================

#[test]
fn test_objects_from_upstream_rows() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"1\n"), ("b.csv", b"2\n")]);
    let config = CsvInputConfig {
        filename_field: Some("path".into()),
        ..CsvInputConfig::new(Vec::<String>::new(), string_fields(&["v"]))
    };
    let upstream = UpstreamRows::new(
        vec!["path".into()],
        names.iter().map(|n| vec![n.clone()]).collect::<Vec<_>>(),
    );

    let mut input = CsvInput::new(config, Arc::new(store))?.with_upstream(upstream);
    let rows = input.rows().collect::<Result<Vec<_>>>()?;
    assert_eq!(as_strings(&rows), vec![strs(&["1"]), strs(&["2"])]);
    Ok(())
}

#[test]
fn test_upstream_without_filename_column() -> anyhow::Result<()> {
    let (store, _) = store_with(&[]);
    let config = CsvInputConfig {
        filename_field: Some("path".into()),
        ..CsvInputConfig::new(Vec::<String>::new(), string_fields(&["v"]))
    };
    let upstream = UpstreamRows::new(vec!["file".into()], vec![vec!["data/a.csv".to_string()]]);

    let mut input = CsvInput::new(config, Arc::new(store))?.with_upstream(upstream);
    assert!(matches!(
        input.next_row(),
        Err(CsvInputError::FilenameFieldNotFound(field)) if field == "path"
    ));
    Ok(())
}

#[test]
fn test_no_objects_is_a_config_error() -> anyhow::Result<()> {
    let (store, _) = store_with(&[]);
    let config = CsvInputConfig::new(Vec::<String>::new(), string_fields(&["v"]));

    let mut input = CsvInput::new(config, Arc::new(store))?;
    assert!(matches!(input.next_row(), Err(CsvInputError::Config(_))));
    Ok(())
}

// ============================================================================
// Failures and cleanup
// ============================================================================

#[test]
fn test_missing_object() -> anyhow::Result<()> {
    let (store, _) = store_with(&[]);
    let config = CsvInputConfig::new(["data/missing.csv"], string_fields(&["v"]));

    let mut input = CsvInput::new(config, Arc::new(store))?;
    match input.next_row() {
        Err(CsvInputError::Storage(err)) => assert_eq!(err.kind, StorageErrorKind::NotFound),
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_read_error_reports_object_and_offset() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"1,a\n2,b\n3,c\n")]);
    store.fail_after(&names[0], 6)?;
    let config = CsvInputConfig {
        buffer_size: 4,
        ..CsvInputConfig::new(names.clone(), string_fields(&["id", "v"]))
    };

    let mut input = CsvInput::new(config, Arc::new(store))?;
    assert!(input.next_row()?.is_some());

    let err = input.next_row().unwrap_err();
    assert!(err.is_read_error());
    match err {
        CsvInputError::Read { object, offset, source } => {
            assert_eq!(object, names[0]);
            assert!(offset <= 6, "offset {offset}");
            assert_eq!(source.kind(), std::io::ErrorKind::ConnectionReset);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(input.next_row()?.is_none());
    Ok(())
}

#[test]
fn test_close_is_idempotent() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"1\n2\n")]);
    let config = CsvInputConfig::new(names, string_fields(&["v"]));

    let mut input = CsvInput::new(config, Arc::new(store))?;
    assert!(input.next_row()?.is_some());
    assert_eq!(input.state(), InputState::ObjectOpen);

    input.close();
    input.close();
    assert_eq!(input.state(), InputState::AllObjectsExhausted);
    assert!(input.next_row()?.is_none());
    Ok(())
}

#[test]
fn test_invalid_config_rejected() {
    let (store, names) = store_with(&[("a.csv", b"1\n")]);
    let config = CsvInputConfig {
        enclosure: Some(','),
        ..CsvInputConfig::new(names, string_fields(&["v"]))
    };
    assert!(matches!(
        CsvInput::new(config, Arc::new(store)),
        Err(CsvInputError::Config(_))
    ));
}

// ============================================================================
// Stream release
// ============================================================================

/// Store wrapper counting the readers it handed out that are still alive.
struct CountingStore {
    inner: FakeObjectStore,
    live: Arc<AtomicUsize>,
}

struct CountedReader {
    inner: ObjectReader,
    live: Arc<AtomicUsize>,
}

impl Read for CountedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for CountedReader {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ObjectStore for CountingStore {
    fn metadata(&self, object: &str) -> StorageResult<ObjectMetadata> {
        self.inner.metadata(object)
    }

    fn open(&self, object: &str, range: Option<Range<u64>>) -> StorageResult<ObjectReader> {
        let inner = self.inner.open(object, range)?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedReader {
            inner,
            live: Arc::clone(&self.live),
        }))
    }
}

fn counting_input(store: FakeObjectStore, config: CsvInputConfig) -> anyhow::Result<(CsvInput, Arc<AtomicUsize>)> {
    let live = Arc::new(AtomicUsize::new(0));
    let store = CountingStore {
        inner: store,
        live: Arc::clone(&live),
    };
    Ok((CsvInput::new(config, Arc::new(store))?, live))
}

#[test]
fn test_stream_released_after_read_error() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"1,a\n2,b\n3,c\n")]);
    store.fail_after(&names[0], 6)?;
    let config = CsvInputConfig {
        buffer_size: 4,
        ..CsvInputConfig::new(names, string_fields(&["id", "v"]))
    };

    let (mut input, live) = counting_input(store, config)?;
    assert!(input.next_row()?.is_some());
    assert_eq!(live.load(Ordering::SeqCst), 1);

    assert!(input.next_row().unwrap_err().is_read_error());
    assert_eq!(live.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_stream_released_after_close() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"1\n2\n")]);
    let config = CsvInputConfig::new(names, string_fields(&["v"]));

    let (mut input, live) = counting_input(store, config)?;
    assert!(input.next_row()?.is_some());
    assert_eq!(live.load(Ordering::SeqCst), 1);

    input.close();
    assert_eq!(live.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_stream_released_after_conversion_failure() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("t.csv", b"id;amount;day;ok\nx;1;2024-01-01;Y\n")]);

    let (mut input, live) = counting_input(store, typed_config(names))?;
    assert!(matches!(input.next_row(), Err(CsvInputError::Conversion(_))));
    assert_eq!(live.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_stream_released_on_drop() -> anyhow::Result<()> {
    let (store, names) = store_with(&[("a.csv", b"1\n2\n")]);
    let config = CsvInputConfig::new(names, string_fields(&["v"]));

    let (mut input, live) = counting_input(store, config)?;
    assert!(input.next_row()?.is_some());
    drop(input);
    assert_eq!(live.load(Ordering::SeqCst), 0);
    Ok(())
}
