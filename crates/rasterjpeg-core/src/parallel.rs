//! Fan-out/join helper for splitting a range of work units across threads.
//!
//! Work is partitioned into contiguous chunks of near-equal size, one scoped
//! thread per chunk, and the caller blocks until every chunk is done. Results
//! are written straight into caller-owned output slices; each worker receives
//! its own disjoint `&mut` slice, so no synchronization beyond the join is needed.
//!
//! A single chunk (one unit, or a thread hint of one) runs on the calling thread.

use std::ops::Range;
use std::thread;

/// Fallback worker count when the platform cannot report its parallelism.
const FALLBACK_THREADS: usize = 4;

/// Number of cores the platform reports, or [`FALLBACK_THREADS`].
fn available_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_THREADS)
}

/// Resolve a thread hint: `0` means every available core, and larger hints are
/// capped at the available core count.
pub fn resolve_threads(hint: usize) -> usize {
    let available = available_threads();
    if hint == 0 {
        available
    } else {
        hint.min(available)
    }
}

/// Split `0..units` into at most `min(units, workers)` contiguous ranges.
///
/// Every range but the last has `units / chunks` elements; the last one absorbs
/// the remainder.
pub fn partition(units: usize, workers: usize) -> Vec<Range<usize>> {
    if units == 0 {
        return Vec::new();
    }
    let chunks = workers.clamp(1, units);
    let per_chunk = units / chunks;

    (0..chunks)
        .map(|i| {
            let start = i * per_chunk;
            let end = if i + 1 == chunks {
                units
            } else {
                start + per_chunk
            };
            start..end
        })
        .collect()
}

/// Run `work` over `0..units`, one range per worker thread.
pub fn for_each_range<F>(units: usize, threads: usize, work: F)
where
    F: Fn(Range<usize>) + Sync,
{
    let ranges = partition(units, resolve_threads(threads));
    if ranges.len() <= 1 {
        if let Some(range) = ranges.into_iter().next() {
            work(range);
        }
        return;
    }

    let work = &work;
    thread::scope(|scope| {
        for range in ranges {
            scope.spawn(move || work(range));
        }
    });
}

/// Run `work` over `output`, viewed as units of `unit_len` elements.
///
/// Each worker gets the unit range it owns plus the matching sub-slice of
/// `output` (`range.len() * unit_len` elements). Trailing elements that do not
/// form a whole unit are left untouched.
pub fn for_each_chunk_mut<T, F>(output: &mut [T], unit_len: usize, threads: usize, work: F)
where
    T: Send,
    F: Fn(Range<usize>, &mut [T]) + Sync,
{
    if unit_len == 0 {
        return;
    }
    let units = output.len() / unit_len;
    let ranges = partition(units, resolve_threads(threads));
    if ranges.len() <= 1 {
        if let Some(range) = ranges.into_iter().next() {
            let len = range.len() * unit_len;
            work(range, &mut output[..len]);
        }
        return;
    }

    let work = &work;
    thread::scope(|scope| {
        let mut rest = output;
        for range in ranges {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len() * unit_len);
            rest = tail;
            scope.spawn(move || work(range, head));
        }
    });
}
