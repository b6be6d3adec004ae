//! Chunk planning: split `[0, total)` into inclusive byte ranges.

/// Smallest chunk emitted unless the whole resource is smaller.
pub const MIN_CHUNK_BYTES: u64 = 1024 * 1024;

const LARGE_THRESHOLD: u64 = 100 * 1024 * 1024;
const HUGE_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// One inclusive byte range `start..=end` of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for curl's range option / the `Range: bytes=` header, starting
    /// `skip` bytes into the chunk.
    pub fn range_from(&self, skip: u64) -> String {
        format!("{}-{}", self.start + skip, self.end)
    }
}

/// Ranges plus the number of threads that should fetch them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunks: Vec<ChunkRange>,
    pub workers: usize,
}

/// Thread count for a resource of `total` bytes: the hint, doubled (max 16)
/// above 100MB, quadrupled (max 32) above 1GB.
pub fn thread_count(total: u64, concurrency: usize) -> usize {
    let base = concurrency.max(1);
    if total > HUGE_THRESHOLD {
        base.saturating_mul(4).min(32)
    } else if total > LARGE_THRESHOLD {
        base.saturating_mul(2).min(16)
    } else {
        base
    }
}

/// Plans chunks for `total` bytes.
///
/// Chunk size is `max(min_chunk, total / threads)`; there are never more
/// chunks than fit at that size, and the last one absorbs the remainder.
/// The pool is capped at twice `cpus`.
pub fn plan_chunks(total: u64, concurrency: usize, min_chunk: u64, cpus: usize) -> ChunkPlan {
    if total == 0 {
        return ChunkPlan {
            chunks: Vec::new(),
            workers: 0,
        };
    }
    let threads = thread_count(total, concurrency);
    let chunk_size = (total / threads as u64).max(min_chunk).max(1);
    let count = (total / chunk_size).clamp(1, threads as u64) as usize;

    let chunks = (0..count)
        .map(|index| {
            let start = index as u64 * chunk_size;
            let end = if index + 1 == count {
                total - 1
            } else {
                start + chunk_size - 1
            };
            ChunkRange { index, start, end }
        })
        .collect::<Vec<_>>();

    let workers = threads.min(cpus.max(1).saturating_mul(2)).min(chunks.len());
    ChunkPlan { chunks, workers }
}

/// CPUs available to this process (1 if unknown).
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
