//! Slice planning

use crate::uploader::error::{UploadError, UploadResult};
use std::ops::Range;

/// One contiguous byte range of the source file.
///
/// Indices are 1-based and contiguous; the upload server reassembles by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceDescriptor {
    pub index: u64,
    /// Inclusive start offset
    pub start: u64,
    /// Exclusive end offset
    pub end: u64,
    /// MD5 of the slice bytes, filled in when the slice is transmitted
    pub content_hash: Option<String>,
}

impl SliceDescriptor {
    pub fn new(index: u64, start: u64, end: u64) -> Self {
        Self {
            index,
            start,
            end,
            content_hash: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// Number of slices for a non-empty file
pub fn slice_count(total_size: u64, slice_size: u64) -> u64 {
    total_size.div_ceil(slice_size)
}

/// Split `[0, total_size)` into slices of at most `slice_size` bytes.
///
/// An empty file yields a single zero-length slice.
pub fn plan(total_size: u64, slice_size: u64) -> UploadResult<Vec<SliceDescriptor>> {
    if slice_size == 0 {
        return Err(UploadError::InvalidArgument(
            "slice size must be positive".to_string(),
        ));
    }

    if total_size == 0 {
        return Ok(vec![SliceDescriptor::new(1, 0, 0)]);
    }

    let count = slice_count(total_size, slice_size);
    let slices = (0..count)
        .map(|i| {
            let start = i * slice_size;
            let end = (start + slice_size).min(total_size);
            SliceDescriptor::new(i + 1, start, end)
        })
        .collect();

    Ok(slices)
}
