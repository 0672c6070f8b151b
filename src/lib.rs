//! # shardcsv
//!
//! A **streaming CSV reader** for datasets kept in object storage, able to
//! split one logical dataset into byte ranges read by independent workers.
//!
//! ## Key Features
//!
//! - **Streaming tokenizer** - delimiter, optional enclosure with doubled-enclosure
//!   escapes, `\n` / `\r` / `\r\n` terminators, bounded memory per row
//! - **Multi-object datasets** - several objects read as one concatenated stream
//! - **Byte-range partitioning** - every worker computes the same plan from the
//!   object sizes and emits exactly the rows starting in its range
//! - **Typed conversion** - eager or lazy, with configurable error routing
//! - **Pluggable storage** - any store able to report sizes and serve ranged reads
//! - **Transparent decompression** - gzip, zstd, bzip2 and xz for serial reads
//!   (all optional via feature flags)
//!
//! ## Quick Start
//!
//! ```
//! use shardcsv::*;
//! use std::sync::Arc;
//!
//! # fn main() -> shardcsv::Result<()> {
//! let store = FakeObjectStore::new();
//! store.put_object("landing", "part-0.csv", "id,city\n1,Paris\n2,Oslo\n");
//! store.put_object("landing", "part-1.csv", "id,city\n3,Lima\n");
//!
//! let config = CsvInputConfig {
//!     header_present: true,
//!     running_in_parallel: true,
//!     ..CsvInputConfig::new(
//!         ["landing/part-0.csv", "landing/part-1.csv"],
//!         vec![FieldDef::new("id", FieldType::Integer), FieldDef::string("city")],
//!     )
//! };
//!
//! let store: Arc<dyn ObjectStore> = Arc::new(store);
//! let mut total = 0;
//! for worker in 0..2 {
//!     let mut input = CsvInput::new(config.clone(), Arc::clone(&store))?.with_worker(worker, 2);
//!     for row in input.rows() {
//!         let row = row?;
//!         assert!(row.values[0].as_value().is_some());
//!         total += 1;
//!     }
//! }
//! assert_eq!(total, 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Partitioning
//!
//! With `n` workers over `total` bytes, worker `i` owns
//! `[block * i, block * (i + 1))` where `block` is `total / n` rounded half
//! up; the last worker owns everything to the end of the stream. A worker
//! emits the rows whose first byte falls in its range, reading past its end
//! to finish the last one. A worker starting mid-row skips to the next row
//! boundary, and one starting exactly on an object boundary skips the
//! object's header when headers are present.
//!
//! Partitioning assumes line terminators never appear inside fields and
//! that objects are not compressed.
//!
//! ## Module Overview
//!
//! - [`input`] - The reader driving one worker's partition
//! - [`tokenizer`] - Byte-level row tokenizer
//! - [`partition`] - Partition planning
//! - [`config`] - Reader configuration
//! - [`convert`] / [`row`] - Typed values and output rows
//! - [`storage`] - Object store abstraction and implementations
//! - [`compression`] - Transparent decompression
//! - [`metrics`] - Read statistics

mod buffer;
pub mod compression;
pub mod config;
pub mod convert;
pub mod error;
pub mod input;
pub mod mapping;
pub mod metrics;
#[cfg(feature = "parallel-io")]
pub mod parallel;
pub mod partition;
pub mod row;
pub mod source;
pub mod storage;
pub mod tokenizer;

pub use config::{ConversionErrorPolicy, CsvInputConfig, FieldDef, FieldType, TrimType};
pub use convert::{DefaultConverter, FieldConversionError, Value, ValueConverter};
pub use error::{ConversionErrors, CsvInputError, Result};
pub use input::{CsvInput, InputState};
pub use mapping::FieldsMapping;
pub use metrics::MetricsCollector;
pub use partition::{plan_partition, PartitionPlan, StartAction};
pub use row::{FieldValue, Row};
pub use source::{ObjectSource, UpstreamRows};
pub use storage::{
    FakeObjectStore, LocalObjectStore, ObjectMetadata, ObjectReader, ObjectStore, StorageError,
    StorageErrorKind, StorageResult,
};
pub use tokenizer::{remove_escapes, Dialect, RawRecord, Tokenizer};

#[cfg(feature = "parallel-io")]
pub use parallel::{read_partitioned, read_partitioned_with_metrics};
