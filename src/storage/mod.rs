//! Object storage abstractions.
//!
//! The reader never talks to a concrete storage SDK. It goes through the
//! [`ObjectStore`] trait, which only asks for object sizes and byte streams
//! restricted to an optional range. This is all that is needed to split one
//! logical dataset into disjoint byte ranges read by independent workers.
//!
//! ## Implementations
//!
//! - [`FakeObjectStore`] - in-memory store with request recording and
//!   failure injection, for tests
//! - [`LocalObjectStore`] - filesystem-backed store
//!
//! Implementing the trait for a real provider only needs a size lookup
//! (`HEAD`) and a ranged `GET`:
//!
//! ```ignore
//! use shardcsv::storage::*;
//!
//! struct S3Store {
//!     client: aws_sdk_s3::Client,
//!     runtime: tokio::runtime::Runtime,
//! }
//!
//! impl ObjectStore for S3Store {
//!     fn metadata(&self, object: &str) -> StorageResult<ObjectMetadata> {
//!         let loc = ObjectLocation::parse(object)?;
//!         // head_object(...)
//!         # unimplemented!()
//!     }
//!
//!     fn open(&self, object: &str, range: Option<std::ops::Range<u64>>) -> StorageResult<ObjectReader> {
//!         // get_object().range(format!("bytes={}-{}", r.start, r.end - 1))
//!         # unimplemented!()
//!     }
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`StorageResult<T>`] with a [`StorageError`] tagged by
//! [`StorageErrorKind`]. The reader does not retry failed requests.

pub mod fake;
pub mod helpers;
pub mod local;
pub mod traits;

pub use fake::{FakeObjectStore, OpenRequest};
pub use helpers::ObjectLocation;
pub use local::LocalObjectStore;
pub use traits::*;
