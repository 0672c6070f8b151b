//! The CSV input driver.
//!
//! [`CsvInput`] turns a list of objects into a pull-based stream of [`Row`]s.
//! In serial mode it reads every object from start to end. In parallel mode
//! (`running_in_parallel` with more than one worker) it reads only the rows
//! starting inside its partition of the concatenated objects, so that a set
//! of workers configured alike emits every row exactly once.
//!
//! ```
//! use shardcsv::config::{CsvInputConfig, FieldDef};
//! use shardcsv::input::CsvInput;
//! use shardcsv::storage::FakeObjectStore;
//! use std::sync::Arc;
//!
//! # fn main() -> shardcsv::Result<()> {
//! let store = FakeObjectStore::new();
//! store.put_object("landing", "people.csv", "name,age\n\"Jo,e\",30\n");
//!
//! let config = CsvInputConfig {
//!     header_present: true,
//!     ..CsvInputConfig::new(["landing/people.csv"], vec![FieldDef::string("name"), FieldDef::string("age")])
//! };
//!
//! let mut input = CsvInput::new(config, Arc::new(store))?;
//! let row = input.next_row()?.unwrap();
//! assert_eq!(row.values[0].as_str(), Some("Jo,e"));
//! assert!(input.next_row()?.is_none());
//! # Ok(())
//! # }
//! ```

use crate::compression;
use crate::config::{ConversionErrorPolicy, CsvInputConfig};
use crate::convert::{DefaultConverter, Value, ValueConverter};
use crate::error::{ConversionErrors, CsvInputError, Result};
use crate::mapping::FieldsMapping;
use crate::metrics::{
    MetricsCollector, BYTES_READ, CONVERSION_ERRORS, HEADERS_SKIPPED, OBJECTS_OPENED,
    PARTIAL_ROWS_SKIPPED, ROWS_READ,
};
use crate::partition::{plan_partition, PartitionPlan, StartAction};
use crate::row::{FieldValue, Row};
use crate::source::{ObjectSource, UpstreamRows};
use crate::storage::{ObjectReader, ObjectStore};
use crate::tokenizer::Tokenizer;
use std::io;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of a [`CsvInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    NotStarted,
    ObjectOpen,
    /// The worker's byte budget is spent.
    PartitionExhausted,
    AllObjectsExhausted,
}

struct OpenObject {
    index: usize,
    name: String,
    tokenizer: Tokenizer<ObjectReader>,
    range: Option<Range<u64>>,
    mapping: FieldsMapping,
    row_number: u64,
}

impl OpenObject {
    /// Offset in the object of the tokenizer cursor.
    fn offset(&self) -> u64 {
        self.range.as_ref().map_or(0, |r| r.start) + self.tokenizer.position()
    }

    fn read_error(&self, source: io::Error) -> CsvInputError {
        CsvInputError::Read {
            object: self.name.clone(),
            offset: self.offset(),
            source,
        }
    }
}

enum Step {
    Row(Row),
    EndOfObject,
    BudgetSpent,
}

/// Pull-based reader over one partition of a set of CSV objects.
pub struct CsvInput {
    config: CsvInputConfig,
    store: Arc<dyn ObjectStore>,
    converter: Arc<dyn ValueConverter>,
    metrics: Option<MetricsCollector>,
    source: Option<ObjectSource>,
    worker_index: usize,
    worker_count: usize,
    objects: Vec<String>,
    plan: Option<PartitionPlan>,
    next_object: usize,
    current: Option<OpenObject>,
    state: InputState,
    rows_emitted: u64,
}

impl CsvInput {
    /// Create a reader over the objects listed in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CsvInputError::Config`] if the configuration is invalid.
    pub fn new(config: CsvInputConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        config.validate()?;
        let source = (!config.filenames.is_empty())
            .then(|| ObjectSource::Static(config.filenames.clone()));

        Ok(Self {
            config,
            store,
            converter: Arc::new(DefaultConverter),
            metrics: None,
            source,
            worker_index: 0,
            worker_count: 1,
            objects: Vec::new(),
            plan: None,
            next_object: 0,
            current: None,
            state: InputState::NotStarted,
            rows_emitted: 0,
        })
    }

    /// Run as worker `index` of `count`.
    #[must_use]
    pub fn with_worker(mut self, index: usize, count: usize) -> Self {
        self.worker_index = index;
        self.worker_count = count;
        self
    }

    /// Take object identifiers from upstream rows instead of the configured list.
    #[must_use]
    pub fn with_upstream(mut self, rows: UpstreamRows) -> Self {
        self.source = Some(ObjectSource::Upstream(rows));
        self
    }

    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = converter;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn state(&self) -> InputState {
        self.state
    }

    /// The partition plan, once reading started in parallel mode.
    #[must_use]
    pub fn plan(&self) -> Option<&PartitionPlan> {
        self.plan.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &CsvInputConfig {
        &self.config
    }

    /// Names of the values of every emitted row.
    #[must_use]
    pub fn output_fields(&self) -> Vec<String> {
        self.config.output_fields()
    }

    fn is_parallel(&self) -> bool {
        self.config.running_in_parallel && self.worker_count > 1
    }

    /// Read the next row of the partition, or `None` once it is exhausted.
    ///
    /// Any error ends the read: the current object is closed and later calls
    /// return `None`.
    ///
    /// # Errors
    ///
    /// Returns configuration, storage, read and (with
    /// [`ConversionErrorPolicy::Fail`]) conversion errors.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        let result = self.advance();
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Iterate over the remaining rows.
    pub fn rows(&mut self) -> Rows<'_> {
        Rows { input: self }
    }

    fn advance(&mut self) -> Result<Option<Row>> {
        loop {
            match self.state {
                InputState::NotStarted => self.start()?,
                InputState::PartitionExhausted | InputState::AllObjectsExhausted => {
                    return Ok(None);
                }
                InputState::ObjectOpen => {
                    let Some(mut open) = self.current.take() else {
                        self.open_next()?;
                        continue;
                    };
                    match self.read_step(&mut open) {
                        Ok(Step::Row(row)) => {
                            self.current = Some(open);
                            return Ok(Some(row));
                        }
                        Ok(Step::EndOfObject) => {
                            self.finish_object(open);
                            self.open_next()?;
                        }
                        Ok(Step::BudgetSpent) => {
                            debug!(
                                worker = self.worker_index,
                                object = %open.name,
                                "partition byte budget spent"
                            );
                            self.finish_object(open);
                            self.finish(InputState::PartitionExhausted);
                        }
                        Err(err) => {
                            self.finish_object(open);
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        let source = self.source.take().ok_or_else(|| {
            CsvInputError::config("no objects to read: configure filenames or provide upstream rows")
        })?;
        self.objects = source.resolve(self.config.filename_field.as_deref())?;

        if let Some(metrics) = &self.metrics {
            metrics.record_start();
        }

        if self.is_parallel() {
            if let Some(object) = self.objects.iter().find(|o| compression::is_compressed(o)) {
                return Err(CsvInputError::config(format!(
                    "compressed object {object} cannot be read in parallel"
                )));
            }
            if self.config.newline_possible_in_fields {
                warn!("newlines inside fields are not supported when reading in parallel, partition boundaries may split rows");
            }

            let sizes = self
                .objects
                .iter()
                .map(|o| self.store.size_of(o))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let plan = plan_partition(&sizes, self.worker_index, self.worker_count)?;

            info!(
                worker = self.worker_index,
                workers = self.worker_count,
                total_size = plan.total_size,
                start = plan.start_position,
                end = plan.effective_end(),
                start_object = ?plan.start_object_index,
                bytes_to_skip = plan.bytes_to_skip,
                "planned partition"
            );

            self.next_object = plan.start_object_index.unwrap_or(self.objects.len());
            let empty = plan.is_empty();
            self.plan = Some(plan);
            if empty {
                self.finish(InputState::PartitionExhausted);
                return Ok(());
            }
        } else {
            info!("reading {} objects serially", self.objects.len());
        }

        self.open_next()
    }

    /// Open the next object this worker has to read, or finish.
    fn open_next(&mut self) -> Result<()> {
        loop {
            if self.next_object >= self.objects.len() {
                self.finish(InputState::AllObjectsExhausted);
                return Ok(());
            }
            if let Some(plan) = &self.plan
                && plan.exhausted_at_object(self.next_object)
            {
                self.finish(InputState::PartitionExhausted);
                return Ok(());
            }

            let index = self.next_object;
            self.next_object += 1;
            if let Some(open) = self.open_object(index)? {
                self.current = Some(open);
                self.state = InputState::ObjectOpen;
                return Ok(());
            }
        }
    }

    fn open_object(&self, index: usize) -> Result<Option<OpenObject>> {
        let name = self.objects[index].clone();
        let range = self
            .plan
            .as_ref()
            .map(|plan| plan.fetch_range(index, self.config.max_line_size));

        let reader = self.store.open(&name, range.clone())?;
        let reader = if range.is_some() {
            reader
        } else {
            compression::wrap_reader(reader, &name).map_err(|source| CsvInputError::Read {
                object: name.clone(),
                offset: 0,
                source,
            })?
        };
        info!(object = %name, index, ?range, "opened object");
        self.count(OBJECTS_OPENED, 1);

        let mut open = OpenObject {
            index,
            name,
            tokenizer: Tokenizer::new(reader, self.config.dialect(), self.config.buffer_size),
            range,
            mapping: FieldsMapping::Positional(self.config.fields.len()),
            row_number: 1,
        };

        match self.enter(&mut open) {
            Ok(true) => Ok(Some(open)),
            Ok(false) => {
                self.finish_object(open);
                Ok(None)
            }
            Err(err) => {
                self.finish_object(open);
                Err(err)
            }
        }
    }

    /// Position a freshly opened object on its first row. Returns `false` if
    /// the object has nothing to contribute.
    fn enter(&self, open: &mut OpenObject) -> Result<bool> {
        let header_present = self.config.header_present;
        let mut action = match &self.plan {
            Some(plan) => plan.start_action(open.index, header_present),
            None if header_present => StartAction::SkipHeader,
            None => StartAction::None,
        };

        if open.offset() == 0 {
            open.tokenizer.skip_bom().map_err(|e| open.read_error(e))?;
        }

        // Only a byte-order mark of this object lies inside the partition.
        if let Some(plan) = &self.plan
            && plan.object_offset(open.index) + open.offset() >= plan.effective_end()
        {
            return Ok(true);
        }

        if action == StartAction::Resync {
            let start = self.plan.as_ref().map_or(0, |p| p.bytes_to_skip);
            if open.offset() >= start {
                // Only a byte-order mark precedes the partition start.
                action = if header_present {
                    StartAction::SkipHeader
                } else {
                    StartAction::None
                };
            } else {
                self.resync(open, start)?;
            }
        }

        let named = self.config.match_header_names && header_present;
        if action == StartAction::SkipHeader {
            let header = if named {
                open.tokenizer.read_header_row()
            } else {
                open.tokenizer.read_row(self.config.fields.len())
            }
            .map_err(|e| open.read_error(e))?;
            debug!(object = %open.name, "skipped header row");
            self.count(HEADERS_SKIPPED, 1);
            if named {
                open.mapping = self.named_mapping(header.map(|h| h.fields).unwrap_or_default());
            }
        } else if named {
            let header = self.read_header(&open.name)?;
            open.mapping = self.named_mapping(header);
        }

        if open.mapping.mapped_count() == 0 {
            warn!(
                object = %open.name,
                "no header column matches a declared field, skipping object"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Move to the first row starting at or after `start`.
    fn resync(&self, open: &mut OpenObject, start: u64) -> Result<()> {
        let before = start - 1;
        let gap = before.saturating_sub(open.offset());
        open.tokenizer.discard(gap).map_err(|e| open.read_error(e))?;

        match open.tokenizer.next_byte().map_err(|e| open.read_error(e))? {
            Some(b'\n' | b'\r') => {
                debug!(object = %open.name, offset = start, "partition starts on a row boundary");
            }
            Some(_) => {
                open.tokenizer
                    .skip_partial_row()
                    .map_err(|e| open.read_error(e))?;
                debug!(
                    object = %open.name,
                    offset = start,
                    resumed_at = open.offset(),
                    "skipped partial row"
                );
                self.count(PARTIAL_ROWS_SKIPPED, 1);
            }
            None => {}
        }
        Ok(())
    }

    /// Read the header row of an object through a separate stream.
    fn read_header(&self, name: &str) -> Result<Vec<Vec<u8>>> {
        let reader = self.store.open(name, None)?;
        let reader = compression::wrap_reader(reader, name).map_err(|source| CsvInputError::Read {
            object: name.to_string(),
            offset: 0,
            source,
        })?;

        let mut tokenizer = Tokenizer::new(reader, self.config.dialect(), self.config.max_line_size);
        let header = tokenizer
            .skip_bom()
            .and_then(|_| tokenizer.read_header_row())
            .map_err(|source| CsvInputError::Read {
                object: name.to_string(),
                offset: tokenizer.position(),
                source,
            })?;
        tokenizer.close();

        Ok(header.map(|h| h.fields).unwrap_or_default())
    }

    fn named_mapping(&self, header: Vec<Vec<u8>>) -> FieldsMapping {
        FieldsMapping::from_header(&header, &self.config.fields, self.config.enclosure_byte())
    }

    fn read_step(&mut self, open: &mut OpenObject) -> Result<Step> {
        if !open
            .tokenizer
            .skip_blank_lines()
            .map_err(|e| open.read_error(e))?
        {
            self.warn_if_truncated(open);
            return Ok(Step::EndOfObject);
        }

        if let Some(plan) = &self.plan {
            let position = plan.object_offset(open.index) + open.offset();
            if position >= plan.effective_end() {
                return Ok(Step::BudgetSpent);
            }
        }

        let Some(record) = open
            .tokenizer
            .read_row(open.mapping.column_count())
            .map_err(|e| open.read_error(e))?
        else {
            return Ok(Step::EndOfObject);
        };

        let fields = &self.config.fields;
        let mut values = vec![FieldValue::Null; fields.len()];
        let mut errors = Vec::new();

        for (column, bytes) in record.fields.into_iter().enumerate() {
            let Some(target) = open.mapping.target(column) else {
                continue;
            };
            values[target] = if self.config.lazy_conversion {
                FieldValue::Raw(bytes)
            } else {
                match self.converter.convert(&bytes, &fields[target]) {
                    Ok(Some(value)) => FieldValue::Value(value),
                    Ok(None) => FieldValue::Null,
                    Err(err) => {
                        errors.push(err);
                        FieldValue::Null
                    }
                }
            };
        }

        let row_number = open.row_number;
        open.row_number += 1;

        if !errors.is_empty() {
            self.count(CONVERSION_ERRORS, errors.len() as u64);
            if self.config.on_conversion_error == ConversionErrorPolicy::Fail {
                return Err(ConversionErrors {
                    row_number,
                    object: open.name.clone(),
                    causes: errors,
                }
                .into());
            }
            debug!(object = %open.name, row_number, errors = errors.len(), "routing conversion errors");
        }

        if self.config.include_filename {
            values.push(FieldValue::Value(Value::String(open.name.clone())));
        }
        if self.config.row_number_field.is_some() {
            values.push(FieldValue::Value(Value::Integer(
                i64::try_from(row_number).unwrap_or(i64::MAX),
            )));
        }

        self.rows_emitted += 1;
        self.count(ROWS_READ, 1);
        if self.config.feedback_size > 0 && self.rows_emitted % self.config.feedback_size == 0 {
            info!(
                worker = self.worker_index,
                rows = self.rows_emitted,
                object = %open.name,
                offset = open.offset(),
                "read progress"
            );
        }

        Ok(Step::Row(Row { values, errors }))
    }

    fn warn_if_truncated(&self, open: &OpenObject) {
        let (Some(plan), Some(range)) = (&self.plan, &open.range) else {
            return;
        };
        if range.end < plan.object_size(open.index) {
            warn!(
                object = %open.name,
                range_end = range.end,
                max_line_size = self.config.max_line_size,
                "ranged read ended inside a row, rows may be longer than max_line_size"
            );
        }
    }

    fn finish_object(&self, mut open: OpenObject) {
        self.count(BYTES_READ, open.tokenizer.position());
        open.tokenizer.close();
        debug!(object = %open.name, rows = open.row_number - 1, "closed object");
    }

    fn finish(&mut self, state: InputState) {
        self.state = state;
        if let Some(metrics) = &self.metrics {
            metrics.record_end();
        }
        info!(
            worker = self.worker_index,
            rows = self.rows_emitted,
            state = ?state,
            "input finished"
        );
    }

    fn count(&self, name: &str, value: u64) {
        if let Some(metrics) = &self.metrics {
            metrics.increment_counter(name, value);
        }
    }

    /// Release the current object. Later reads return `None`. Safe to call
    /// more than once.
    pub fn close(&mut self) {
        if let Some(open) = self.current.take() {
            self.finish_object(open);
        }
        if matches!(self.state, InputState::NotStarted | InputState::ObjectOpen) {
            self.finish(InputState::AllObjectsExhausted);
        }
    }
}

impl Drop for CsvInput {
    fn drop(&mut self) {
        if let Some(open) = self.current.take() {
            self.finish_object(open);
        }
    }
}

/// Iterator over the rows of a [`CsvInput`], see [`CsvInput::rows`].
pub struct Rows<'a> {
    input: &'a mut CsvInput,
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.input.next_row().transpose()
    }
}
