//! Chunk planning.
//!
//! Decides how many chunks a task gets and lays them out as contiguous,
//! non-overlapping [`ChunkRecord`]s that sum to the total size.

mod span;

pub use span::{plan_spans, ChunkSpan};

use crate::resume_db::ChunkRecord;

/// Number of chunks for a resource: bounded by the per-task thread setting and by
/// how many `min_chunk_bytes` pieces fit in the total. Unknown sizes and servers
/// without range support always get a single chunk.
pub fn choose_chunk_count(
    total_size: Option<u64>,
    resumable: bool,
    threads_per_task: usize,
    min_chunk_bytes: u64,
) -> usize {
    let Some(total) = total_size else {
        return 1;
    };
    if !resumable || total == 0 {
        return 1;
    }
    let by_size = total.div_ceil(min_chunk_bytes.max(1));
    (threads_per_task.max(1) as u64).min(by_size).max(1) as usize
}

/// Fresh chunk plan with nothing downloaded yet.
pub fn plan_chunks(
    total_size: Option<u64>,
    resumable: bool,
    threads_per_task: usize,
    min_chunk_bytes: u64,
) -> Vec<ChunkRecord> {
    let Some(total) = total_size else {
        return vec![ChunkRecord {
            index: 0,
            start: 0,
            downloaded: 0,
            length: None,
        }];
    };
    let count = choose_chunk_count(total_size, resumable, threads_per_task, min_chunk_bytes);
    plan_spans(total, count)
        .into_iter()
        .enumerate()
        .map(|(i, span)| ChunkRecord {
            index: i as u32,
            start: span.start,
            downloaded: 0,
            length: Some(span.len()),
        })
        .collect()
}

/// Checks the layout invariants of a stored plan against the expected total.
pub fn is_valid_plan(chunks: &[ChunkRecord], total_size: Option<u64>) -> bool {
    if chunks.is_empty() {
        return false;
    }
    let Some(total) = total_size else {
        return chunks.len() == 1 && chunks[0].start == 0 && chunks[0].length.is_none();
    };
    let mut offset = 0u64;
    for (i, c) in chunks.iter().enumerate() {
        let Some(len) = c.length else {
            return false;
        };
        if c.index as usize != i || c.start != offset || c.downloaded > len {
            return false;
        }
        offset += len;
    }
    offset == total
}
