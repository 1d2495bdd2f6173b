//! Parallel top-k scan: partitions a row range across worker threads, each maintaining a
//! bounded local max-heap, merged into one bounded result heap at the end.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;

/// One scored row: a candidate's row index and its score (lower is better).
#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    score: f32,
    row: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

/// Pushes `entry` into a max-heap bounded to `k` elements, evicting the current worst
/// (largest score) entry if the heap is full and `entry` is an improvement.
fn push_bounded(heap: &mut BinaryHeap<HeapEntry>, entry: HeapEntry, k: usize) {
    if k == 0 {
        return;
    }
    if heap.len() < k {
        heap.push(entry);
    } else if let Some(worst) = heap.peek() {
        if entry.score < worst.score {
            heap.pop();
            heap.push(entry);
        }
    }
}

/// Clamps a requested worker count against the number of rows to scan: zero means
/// single-threaded, and no worker is ever handed a zero-length range.
#[must_use]
pub fn effective_worker_count(requested: usize, num_rows: usize) -> usize {
    if num_rows == 0 {
        return 0;
    }
    requested.clamp(1, num_rows)
}

/// Splits `[0, num_rows)` into `workers` contiguous, near-equal ranges.
fn partition_ranges(num_rows: usize, workers: usize) -> Vec<Range<usize>> {
    let base = num_rows / workers;
    let remainder = num_rows % workers;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for worker in 0..workers {
        let len = base + usize::from(worker < remainder);
        let end = start + len;
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Scans `[0, num_rows)` across `requested_workers` threads, scoring each row with
/// `score_fn` and returning the `k` rows with the lowest score, ascending.
///
/// `score_fn` must be pure with respect to its `u32` row argument, since it may be
/// called concurrently by multiple worker threads on disjoint row ranges.
#[must_use]
pub fn top_k_scored<F>(num_rows: usize, k: usize, requested_workers: usize, score_fn: F) -> Vec<(u32, f32)>
where
    F: Fn(u32) -> f32 + Sync,
{
    if num_rows == 0 || k == 0 {
        return Vec::new();
    }

    let workers = effective_worker_count(requested_workers, num_rows);
    let shared: Mutex<BinaryHeap<HeapEntry>> = Mutex::new(BinaryHeap::with_capacity(k + 1));
    let score_fn = &score_fn;
    let shared_ref = &shared;

    std::thread::scope(|scope| {
        for range in partition_ranges(num_rows, workers) {
            scope.spawn(move || {
                let mut local: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
                for row in range {
                    #[allow(clippy::cast_possible_truncation)]
                    let row = row as u32;
                    let score = score_fn(row);
                    push_bounded(&mut local, HeapEntry { score, row }, k);
                }

                let mut shared = shared_ref.lock();
                for entry in local {
                    push_bounded(&mut shared, entry, k);
                }
            });
        }
    });

    shared
        .into_inner()
        .into_sorted_vec()
        .into_iter()
        .map(|e| (e.row, e.score))
        .collect()
}
