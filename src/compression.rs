//! Transparent decompression of compressed objects.
//!
//! Objects whose name ends with a known extension are decompressed on the fly
//! when read serially. Compressed streams have no random access, so a
//! partitioned (parallel) read refuses them up front: a byte offset inside a
//! gzip member means nothing to the CSV tokenizer.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` crate (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` crate (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` crate (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` crate (feature: `compression-xz`)
//!
//! Detection is by extension only. Sniffing magic bytes would misread plain
//! CSV data that happens to start with, say, `BZ`.

use crate::storage::ObjectReader;
use std::sync::{Arc, RwLock};

/// Global codec registry for pluggable decompression support.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

/// Initialize the codec registry with built-in codecs.
fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

/// Get or initialize the global codec registry.
fn get_registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY.write().expect("codec registry poisoned");
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom decompression codec globally.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY.write().expect("codec registry poisoned");
    lock.get_or_insert_with(init_registry).push(codec);
}

/// Pluggable decompression codec.
///
/// Implementations must be `Send + Sync` as they live in a global registry
/// shared by every worker thread.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// Object name extensions associated with this codec (e.g., `&[".gz", ".gzip"]`).
    ///
    /// Extensions should include the leading dot and be lowercase.
    fn extensions(&self) -> &[&str];

    /// Wrap a stream with decompression.
    fn wrap_reader(&self, reader: ObjectReader) -> std::io::Result<ObjectReader>;
}

/// Find the codec registered for an object name, if any.
#[must_use]
pub fn detect_codec(object: &str) -> Option<Arc<dyn CompressionCodec>> {
    let name = object.to_lowercase();

    get_registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
}

/// Return whether an object would be decompressed when read.
#[must_use]
pub fn is_compressed(object: &str) -> bool {
    detect_codec(object).is_some()
}

/// Wrap `reader` with the decompressor matching `object`'s extension, or
/// return it untouched.
///
/// # Errors
///
/// Returns an error if the codec fails to initialize on the stream.
pub fn wrap_reader(reader: ObjectReader, object: &str) -> std::io::Result<ObjectReader> {
    match detect_codec(object) {
        Some(codec) => {
            tracing::debug!(object, codec = codec.name(), "decompressing object");
            codec.wrap_reader(reader)
        }
        None => Ok(reader),
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn wrap_reader(&self, reader: ObjectReader) -> std::io::Result<ObjectReader> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn wrap_reader(&self, reader: ObjectReader) -> std::io::Result<ObjectReader> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as ObjectReader)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn wrap_reader(&self, reader: ObjectReader) -> std::io::Result<ObjectReader> {
        use bzip2::read::MultiBzDecoder;
        Ok(Box::new(MultiBzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn wrap_reader(&self, reader: ObjectReader) -> std::io::Result<ObjectReader> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new_multi_decoder(reader)))
    }
}
