//! Work ordering and partitioning for directory uploads.
//!
//! Sequential batches go smallest-first (quick wins show up early in the
//! progress display); parallel batches go largest-first so the longest work
//! lands on the earliest-finishing schedule slots. Both sorts are stable.

use crate::batch::scanner::LocalFileEntry;

/// Smallest first, stable.
pub fn sort_for_sequential(entries: &mut [LocalFileEntry]) {
    entries.sort_by_key(|e| e.size);
}

/// Largest first, stable.
pub fn sort_for_parallel(entries: &mut [LocalFileEntry]) {
    entries.sort_by_key(|e| std::cmp::Reverse(e.size));
}

/// Split `entries` into at most `workers` contiguous runs of near-equal
/// length; the first `len % workers` runs carry one extra entry. Empty runs
/// are not produced.
pub fn partition<T>(entries: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let workers = workers.max(1);
    let total = entries.len();
    let base = total / workers;
    let remainder = total % workers;

    let mut parts = Vec::with_capacity(workers.min(total));
    let mut iter = entries.into_iter();

    for slot in 0..workers {
        let take = base + usize::from(slot < remainder);
        if take == 0 {
            break;
        }
        parts.push(iter.by_ref().take(take).collect());
    }
    parts
}
