//! Byte span type and equal-split planning.

/// A contiguous byte span [start, end) (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl ChunkSpan {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Splits `total_size` bytes into `count` spans that are as equal as possible.
///
/// The remainder is spread one byte at a time over the first spans, so
/// `10 / 4` gives lengths 3, 3, 2, 2. Returns an empty vec if either input is 0.
pub fn plan_spans(total_size: u64, count: usize) -> Vec<ChunkSpan> {
    if total_size == 0 || count == 0 {
        return Vec::new();
    }
    let count = (count as u64).min(total_size);
    let base = total_size / count;
    let remainder = total_size % count;

    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    for i in 0..count {
        let len = base + u64::from(i < remainder);
        out.push(ChunkSpan {
            start: offset,
            end: offset + len,
        });
        offset += len;
    }
    out
}
