//! Byte-range partitioning of a logical stream across workers.
//!
//! The objects of a dataset are treated as one concatenated stream of
//! `total_size` bytes, split into `worker_count` contiguous blocks. Every
//! worker computes the same plan from the same object sizes, so no
//! coordination is needed at run time.
//!
//! A worker owns the rows that *start* inside its block: it reads past its
//! end to finish the last row, and the next worker skips that partial row
//! when it resynchronizes.

use crate::error::{CsvInputError, Result};
use std::ops::Range;

/// Bytes of a UTF-8 byte-order mark.
pub(crate) const BOM_LEN: u64 = 3;

/// What to do right after opening an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAction {
    /// The object is read from its start and has a header row to drop.
    SkipHeader,
    /// The worker starts mid-object and must find the next row boundary.
    Resync,
    /// Start reading rows right away.
    None,
}

/// The share of a logical stream assigned to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub worker_index: usize,
    pub worker_count: usize,
    pub total_size: u64,
    pub block_size: u64,
    pub start_position: u64,
    pub end_position: u64,
    /// Object holding `start_position`, `None` if the partition is empty.
    pub start_object_index: Option<usize>,
    pub bytes_to_skip: u64,
    object_offsets: Vec<u64>,
    object_sizes: Vec<u64>,
}

/// Plan the partition of `worker_index` among `worker_count` workers over
/// objects of the given sizes.
///
/// The block size is `total / worker_count` rounded half up (at least one
/// byte for a non-empty stream). The last worker reads to the end of the
/// stream whatever the rounding.
///
/// # Errors
///
/// Returns [`CsvInputError::Config`] if `worker_count` is zero or
/// `worker_index` is out of range.
pub fn plan_partition(sizes: &[u64], worker_index: usize, worker_count: usize) -> Result<PartitionPlan> {
    if worker_count == 0 {
        return Err(CsvInputError::config("worker count must be positive"));
    }
    if worker_index >= worker_count {
        return Err(CsvInputError::config(format!(
            "worker index {worker_index} out of range for {worker_count} workers"
        )));
    }

    let mut object_offsets = Vec::with_capacity(sizes.len());
    let mut total_size = 0u64;
    for size in sizes {
        object_offsets.push(total_size);
        total_size += size;
    }

    let block_size = if total_size == 0 {
        0
    } else {
        round_half_up_div(total_size, worker_count as u64).max(1)
    };
    let start_position = block_size * worker_index as u64;
    let end_position = start_position + block_size;

    let start_object_index = (0..sizes.len()).find(|&i| {
        start_position >= object_offsets[i] && start_position < object_offsets[i] + sizes[i]
    });
    let bytes_to_skip = start_object_index.map_or(0, |i| start_position - object_offsets[i]);

    Ok(PartitionPlan {
        worker_index,
        worker_count,
        total_size,
        block_size,
        start_position,
        end_position,
        start_object_index,
        bytes_to_skip,
        object_offsets,
        object_sizes: sizes.to_vec(),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn round_half_up_div(total: u64, count: u64) -> u64 {
    ((2 * u128::from(total) + u128::from(count)) / (2 * u128::from(count))) as u64
}

impl PartitionPlan {
    #[must_use]
    pub fn is_last_worker(&self) -> bool {
        self.worker_index + 1 == self.worker_count
    }

    /// Logical position at which this worker stops starting rows.
    #[must_use]
    pub fn effective_end(&self) -> u64 {
        if self.is_last_worker() {
            self.total_size
        } else {
            self.end_position.min(self.total_size)
        }
    }

    /// Whether this worker owns no byte of the stream.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_object_index.is_none() || self.start_position >= self.effective_end()
    }

    /// Offset of an object in the logical stream.
    #[must_use]
    pub fn object_offset(&self, object_index: usize) -> u64 {
        self.object_offsets
            .get(object_index)
            .copied()
            .unwrap_or(self.total_size)
    }

    #[must_use]
    pub fn object_size(&self, object_index: usize) -> u64 {
        self.object_sizes.get(object_index).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.object_sizes.len()
    }

    /// Whether the worker is done once positioned at the start of `object_index`.
    #[must_use]
    pub fn exhausted_at_object(&self, object_index: usize) -> bool {
        self.object_offset(object_index) >= self.effective_end()
    }

    /// Decide how to enter an object this worker opens.
    #[must_use]
    pub fn start_action(&self, object_index: usize, header_present: bool) -> StartAction {
        if Some(object_index) == self.start_object_index && self.bytes_to_skip > 0 {
            StartAction::Resync
        } else if header_present {
            StartAction::SkipHeader
        } else {
            StartAction::None
        }
    }

    /// Byte range to request for an object.
    ///
    /// The range of the start object begins one byte before the partition
    /// start, so the worker can tell whether it lands exactly on a row
    /// boundary, or at the object start when only a byte-order mark
    /// precedes. Every range reaches `2 * max_line_size` bytes past the
    /// block end to complete the last row, except for the last worker which
    /// reads to the end of the object.
    #[must_use]
    pub fn fetch_range(&self, object_index: usize, max_line_size: usize) -> Range<u64> {
        let size = self.object_size(object_index);
        let offset = self.object_offset(object_index);

        let start = if Some(object_index) == self.start_object_index && self.bytes_to_skip > BOM_LEN {
            self.bytes_to_skip - 1
        } else {
            0
        };

        let end = if self.is_last_worker() {
            size
        } else {
            let margin = 2 * max_line_size as u64;
            (self.end_position.saturating_sub(offset) + margin).min(size)
        };

        start..end.max(start)
    }
}
