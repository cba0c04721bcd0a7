//! Top-K selection over scored points
//!
//! **Problem**: ranking every scored point with a full sort is O(N log N).
//!
//! **Solution**: bounded binary heap, O(N log K) time and O(K) space.
//!
//! Toyota Way Principles:
//! - **Muda elimination**: Avoid unnecessary full sort of a brute-force scan

use crate::client::ScoredPoint;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Sort order for Top-K selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order (smallest K scores, e.g. distances)
    Ascending,
    /// Descending order (largest K scores, e.g. similarities)
    Descending,
}

/// Compare two points best-first under `order`; equal scores fall back to id.
fn rank(a: &ScoredPoint, b: &ScoredPoint, order: SortOrder) -> Ordering {
    let by_score = match order {
        SortOrder::Descending => b.score.partial_cmp(&a.score),
        SortOrder::Ascending => a.score.partial_cmp(&b.score),
    };
    by_score.unwrap_or(Ordering::Equal).then(a.id.cmp(&b.id))
}

// Heap keeps the worst retained point on top so it can be evicted.
#[derive(Debug)]
struct HeapItem {
    point: ScoredPoint,
    order: SortOrder,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        rank(&self.point, &other.point, self.order)
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Select the best `k` points, returned best first.
///
/// NaN scores rank as equal to everything and are never preferred over a
/// finite score already retained.
///
/// # Examples
///
/// ```rust
/// use vdb_bench::client::ScoredPoint;
/// use vdb_bench::topk::{top_k, SortOrder};
///
/// let points = [(1, 0.2), (2, 0.9), (3, 0.5)].map(|(id, score)| ScoredPoint { id, score });
/// let best = top_k(points, 2, SortOrder::Descending);
/// assert_eq!(best.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3]);
/// ```
#[must_use]
pub fn top_k(
    points: impl IntoIterator<Item = ScoredPoint>,
    k: usize,
    order: SortOrder,
) -> Vec<ScoredPoint> {
    if k == 0 {
        return Vec::new();
    }
    let points = points.into_iter();
    // Never reserve more than the input can fill; `k` may be `usize::MAX`.
    let mut heap: BinaryHeap<HeapItem> = BinaryHeap::with_capacity(k.min(points.size_hint().0));
    for point in points {
        let item = HeapItem { point, order };
        if heap.len() < k {
            heap.push(item);
        } else if heap.peek().is_some_and(|worst| item < *worst) {
            heap.pop();
            heap.push(item);
        }
    }
    let mut result: Vec<ScoredPoint> = heap.into_iter().map(|item| item.point).collect();
    result.sort_by(|a, b| rank(a, b, order));
    result
}
