//! Byte range type, even partitioning and tiling checks.

use crate::error::{DlmError, Result};

/// A half-open byte range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start offset (inclusive).
    pub from: u64,
    /// End offset (exclusive).
    pub to: u64,
}

impl ByteRange {
    /// Length of this range in bytes.
    pub fn len(&self) -> u64 {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits `[0, total_size)` into `part_count` contiguous ranges.
///
/// Every range gets `total_size / part_count` bytes; the last one also takes
/// the remainder of an uneven division. `part_count` must be in
/// `[1, total_size]`.
pub fn plan_ranges(total_size: u64, part_count: i64) -> Result<Vec<ByteRange>> {
    if part_count <= 0 || part_count as u64 > total_size {
        return Err(DlmError::InvalidPartCount {
            count: part_count,
            total_size,
        });
    }

    let count = part_count as u64;
    let base = total_size / count;

    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    for i in 0..count {
        let to = if i + 1 == count { total_size } else { offset + base };
        out.push(ByteRange { from: offset, to });
        offset = to;
    }

    Ok(out)
}

/// Checks that `ranges` (sorted by `from`) tile `[0, total)` with no gap or
/// overlap and returns `total`, the largest `to`.
pub fn validate_tiling(ranges: &[ByteRange]) -> Result<u64> {
    if ranges.is_empty() {
        return Err(DlmError::CorruptState("no segments".to_string()));
    }

    let mut sorted: Vec<ByteRange> = ranges.to_vec();
    sorted.sort_by_key(|r| r.from);

    let mut expected = 0u64;
    for r in &sorted {
        if r.from >= r.to {
            return Err(DlmError::CorruptState(format!(
                "empty or inverted range {}..{}",
                r.from, r.to
            )));
        }
        if r.from != expected {
            let what = if r.from > expected { "gap" } else { "overlap" };
            return Err(DlmError::CorruptState(format!(
                "{} at offset {} (range starts at {})",
                what, expected, r.from
            )));
        }
        expected = r.to;
    }

    Ok(expected)
}

/// Value for curl's `range` option covering `[pos, to)`: `"pos-(to-1)"`.
/// curl takes the inclusive form without the `bytes=` prefix.
pub fn curl_range(pos: u64, to: u64) -> String {
    format!("{}-{}", pos, to.saturating_sub(1))
}
