//! Segment pipeline: a fixed set of buffers cycling between network workers
//! and the single file writer.
//!
//! Workers `acquire` a free [`Segment`], fill it from the network and
//! `submit` it. The writer takes it from the ready queue, writes it at its
//! offset and `recycle`s it. A worker blocked in `acquire` is the
//! backpressure: nothing is read from the network faster than the disk
//! absorbs it. Worker exit notices travel on the ready queue behind the
//! worker's last segment, so the writer sees them in order.

mod queue;

use std::io::{self, Read};
use std::time::Duration;

pub use queue::BoundedQueue;

use crate::error::DownloadError;

/// Reusable buffer tagged with where its bytes belong.
#[derive(Debug)]
pub struct Segment {
    buf: Box<[u8]>,
    filled: usize,
    /// Absolute file offset of `data()[0]`.
    pub offset: u64,
    /// Index of the chunk that produced the bytes.
    pub chunk: usize,
}

/// How a [`Segment::fill_from`] call ended.
#[derive(Debug)]
pub enum Fill {
    /// Buffer (or the requested limit) is full.
    Full,
    /// Reader hit end of stream.
    Eof,
    /// Stop was requested between reads.
    Stopped,
    /// Read failed; bytes read before the failure stay in the segment.
    Failed(io::Error),
}

impl Segment {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            filled: 0,
            offset: 0,
            chunk: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    /// Tags an empty segment for `chunk`, starting at `offset`.
    pub fn begin(&mut self, chunk: usize, offset: u64) {
        self.filled = 0;
        self.chunk = chunk;
        self.offset = offset;
    }

    /// Reads until `limit` bytes (capped at capacity) are buffered, the stream
    /// ends, a read fails, or `stop` turns true. Interrupted reads are retried.
    pub fn fill_from(&mut self, reader: &mut dyn Read, limit: usize, stop: &dyn Fn() -> bool) -> Fill {
        let limit = limit.min(self.buf.len());
        while self.filled < limit {
            if stop() {
                return Fill::Stopped;
            }
            match reader.read(&mut self.buf[self.filled..limit]) {
                Ok(0) => return Fill::Eof,
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Fill::Failed(e),
            }
        }
        Fill::Full
    }
}

/// How a worker finished its chunk.
#[derive(Debug)]
pub enum WorkerExit {
    /// Every byte of the chunk was handed to the writer.
    Completed,
    /// The worker honoured a stop request.
    Stopped,
    Failed(DownloadError),
}

/// Items the writer consumes.
#[derive(Debug)]
pub enum Ready {
    Data(Segment),
    Exit { chunk: usize, exit: WorkerExit },
}

pub struct SegmentPipeline {
    free: BoundedQueue<Segment>,
    ready: BoundedQueue<Ready>,
}

impl SegmentPipeline {
    /// `buffers` segments of `buffer_bytes` each, for `workers` producers.
    pub fn new(buffers: usize, buffer_bytes: usize, workers: usize) -> Self {
        let buffers = buffers.max(1);
        let free = BoundedQueue::new(buffers);
        for _ in 0..buffers {
            free.push(Segment::new(buffer_bytes));
        }
        Self {
            free,
            // Room for every buffer plus one exit notice per worker: submit never blocks.
            ready: BoundedQueue::new(buffers + workers.max(1)),
        }
    }

    /// Waits up to `timeout` for a free segment.
    pub fn acquire(&self, timeout: Duration) -> Option<Segment> {
        self.free.pop_timeout(timeout)
    }

    pub fn submit(&self, segment: Segment) {
        self.ready.push(Ready::Data(segment));
    }

    pub fn report_exit(&self, chunk: usize, exit: WorkerExit) {
        self.ready.push(Ready::Exit { chunk, exit });
    }

    pub fn next_ready(&self, timeout: Duration) -> Option<Ready> {
        self.ready.pop_timeout(timeout)
    }

    pub fn recycle(&self, mut segment: Segment) {
        segment.filled = 0;
        self.free.push(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that returns at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn fill_stops_at_limit_then_eof() {
        let pipeline = SegmentPipeline::new(1, 8, 1);
        let mut seg = pipeline.acquire(Duration::ZERO).unwrap();
        seg.begin(0, 100);
        let mut reader = Cursor::new(b"0123456789".to_vec());
        assert!(matches!(seg.fill_from(&mut reader, 8, &|| false), Fill::Full));
        assert_eq!(seg.data(), b"01234567");
        assert_eq!(seg.offset, 100);

        seg.begin(0, 108);
        assert!(matches!(seg.fill_from(&mut reader, 8, &|| false), Fill::Eof));
        assert_eq!(seg.data(), b"89");
    }

    #[test]
    fn fill_respects_smaller_limit_across_short_reads() {
        let pipeline = SegmentPipeline::new(1, 64, 1);
        let mut seg = pipeline.acquire(Duration::ZERO).unwrap();
        seg.begin(0, 0);
        let mut reader = Trickle {
            data: &[7u8; 40],
            step: 3,
        };
        assert!(matches!(seg.fill_from(&mut reader, 10, &|| false), Fill::Full));
        assert_eq!(seg.len(), 10);
    }

    #[test]
    fn fill_honours_stop_between_reads() {
        let pipeline = SegmentPipeline::new(1, 64, 1);
        let mut seg = pipeline.acquire(Duration::ZERO).unwrap();
        seg.begin(0, 0);
        let mut reader = Cursor::new(vec![1u8; 64]);
        assert!(matches!(seg.fill_from(&mut reader, 64, &|| true), Fill::Stopped));
        assert!(seg.is_empty());
    }

    #[test]
    fn buffers_cycle_between_queues() {
        let pipeline = SegmentPipeline::new(2, 4, 2);
        let a = pipeline.acquire(Duration::ZERO).unwrap();
        let b = pipeline.acquire(Duration::ZERO).unwrap();
        assert!(pipeline.acquire(Duration::from_millis(5)).is_none());

        pipeline.submit(a);
        pipeline.report_exit(1, WorkerExit::Completed);
        pipeline.submit(b);

        let mut seen = Vec::new();
        while let Some(item) = pipeline.next_ready(Duration::from_millis(5)) {
            match item {
                Ready::Data(seg) => {
                    seen.push("data");
                    pipeline.recycle(seg);
                }
                Ready::Exit { chunk, .. } => seen.push(if chunk == 1 { "exit1" } else { "exit" }),
            }
        }
        assert_eq!(seen, vec!["data", "exit1", "data"]);
        // Both buffers are back on the free queue.
        assert!(pipeline.acquire(Duration::ZERO).is_some());
        assert!(pipeline.acquire(Duration::ZERO).is_some());
        assert!(pipeline.acquire(Duration::ZERO).is_none());
    }

    #[test]
    fn one_worker_can_fill_every_buffer_without_blocking() {
        // A resume with a single unfinished chunk still gets the full set of buffers.
        let pipeline = SegmentPipeline::new(4, 8, 1);
        for i in 0..4u64 {
            let mut seg = pipeline.acquire(Duration::ZERO).expect("free buffer");
            seg.begin(0, i * 8);
            let mut reader = Cursor::new(vec![7u8; 8]);
            assert!(matches!(seg.fill_from(&mut reader, 8, &|| false), Fill::Full));
            pipeline.submit(seg);
        }
        pipeline.report_exit(0, WorkerExit::Completed);

        let mut offsets = Vec::new();
        while let Some(item) = pipeline.next_ready(Duration::from_millis(5)) {
            if let Ready::Data(seg) = item {
                offsets.push(seg.offset);
                pipeline.recycle(seg);
            }
        }
        assert_eq!(offsets, vec![0, 8, 16, 24]);
    }
}
