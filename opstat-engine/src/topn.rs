//! Top-N selection over frequency maps.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Return the `n` highest-count entries, count descending.
///
/// Entries with equal counts are ordered by ascending key, so the result
/// never depends on the iteration order of the source map. Fewer than `n`
/// entries are returned when the input is smaller; callers pad for display.
///
/// Runs in O(m log n) for m entries by keeping a bounded min-heap of the
/// best candidates seen so far.
///
/// # Example
///
/// ```rust
/// use opstat_engine::top_n;
/// use std::collections::HashMap;
///
/// let counts = HashMap::from([("A", 10), ("B", 10), ("C", 5)]);
/// assert_eq!(top_n(&counts, 2), vec![("A", 10), ("B", 10)]);
/// ```
pub fn top_n<'a, K, I>(entries: I, n: usize) -> Vec<(K, u64)>
where
    K: Ord + Clone + 'a,
    I: IntoIterator<Item = (&'a K, &'a u64)>,
{
    if n == 0 {
        return Vec::new();
    }

    // Rank is (count, Reverse(key)): larger is better. Wrapping it in
    // Reverse turns the max-heap into a min-heap whose top is the worst kept.
    let mut heap: BinaryHeap<Reverse<(u64, Reverse<K>)>> = BinaryHeap::with_capacity(n + 1);

    for (key, &count) in entries {
        let candidate = Reverse((count, Reverse(key.clone())));
        if heap.len() < n {
            heap.push(candidate);
        } else if let Some(worst) = heap.peek() {
            // Smaller Reverse means a better rank.
            if candidate < *worst {
                heap.pop();
                heap.push(candidate);
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse((count, Reverse(key)))| (key, count))
        .collect()
}
