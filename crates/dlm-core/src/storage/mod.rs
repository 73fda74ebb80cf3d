//! Disk I/O for the target file.
//!
//! The file is created at its final path and preallocated to the full size
//! (fallocate on Unix when available, else `set_len`). Segment workers share
//! one handle and write with positioned writes (pwrite), so no shared cursor
//! exists and disjoint segments never contend.

mod builder;
mod writer;

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;
