//! Range math and segment planning.
//!
//! Splits a download into N contiguous byte ranges, checks that persisted
//! ranges still tile the file, and builds curl Range values for a resumed
//! position.

mod range;

pub use range::{curl_range, plan_ranges, validate_tiling, ByteRange};
