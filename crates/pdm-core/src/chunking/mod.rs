//! Parallel chunk layout: planning ranges, where chunk files live, merging.

mod merge;
mod plan;

use std::path::{Path, PathBuf};

pub use merge::{merge_chunks, part_path};
pub use plan::{available_cpus, plan_chunks, thread_count, ChunkPlan, ChunkRange, MIN_CHUNK_BYTES};

/// Private per-task directory next to the destination: `<dir>/.tmp_<task_id>`.
pub fn chunk_dir(dest: &Path, task_id: &str) -> PathBuf {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(".tmp_{task_id}"))
}

pub fn chunk_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("chunk_{index}"))
}
