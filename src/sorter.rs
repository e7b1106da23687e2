//! Bounded, distance-ordered id collection backing the k-nearest query.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

/// Ordered multiset of `(squared distance, id)` pairs with a soft capacity.
///
/// Ids at the same squared distance share one bucket and keep insertion
/// order. When the collection overflows its capacity the farthest bucket is
/// dropped, but only while the remaining count still covers the capacity:
/// ties straddling the k-th position are all retained, which keeps the
/// emitted set deterministic under a fixed insertion order.
#[derive(Debug)]
pub(crate) struct NearestSorter {
    requested: usize,
    count: usize,
    largest_dist2: f64,
    buckets: BTreeMap<OrderedFloat<f64>, Vec<usize>>,
}

impl NearestSorter {
    pub(crate) fn new(requested: usize) -> Self {
        Self {
            requested,
            count: 0,
            largest_dist2: f64::MAX,
            buckets: BTreeMap::new(),
        }
    }

    /// Largest retained squared distance; the pruning radius of the k-NN
    /// traversal. Stays `f64::MAX` until the capacity has been exceeded.
    pub(crate) fn largest_dist2(&self) -> f64 {
        self.largest_dist2
    }

    pub(crate) fn insert(&mut self, dist2: f64, id: usize) {
        if dist2 > self.largest_dist2 && self.count >= self.requested {
            return;
        }
        self.count += 1;
        self.buckets.entry(OrderedFloat(dist2)).or_default().push(id);

        if self.count > self.requested {
            let (&last_key, last_ids) = self.buckets.last_key_value().expect("count > 0");
            let last_len = last_ids.len();
            if self.count - last_len >= self.requested {
                self.count -= last_len;
                self.buckets.remove(&last_key);
                self.largest_dist2 = self
                    .buckets
                    .last_key_value()
                    .map(|(k, _)| k.into_inner())
                    .unwrap_or(f64::MAX);
            }
        }
    }

    /// Write the first `min(capacity, len)` ids in ascending distance order;
    /// ids within one distance bucket come out in insertion order.
    pub(crate) fn write_ids_into(&self, out: &mut Vec<usize>) {
        out.clear();
        let limit = self.requested.min(self.count);
        out.reserve(limit);
        'buckets: for ids in self.buckets.values() {
            for &id in ids {
                if out.len() == limit {
                    break 'buckets;
                }
                out.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(sorter: &NearestSorter) -> Vec<usize> {
        let mut out = Vec::new();
        sorter.write_ids_into(&mut out);
        out
    }

    #[test]
    fn keeps_the_closest_k() {
        let mut sorter = NearestSorter::new(3);
        for (d2, id) in [(9.0, 0), (1.0, 1), (4.0, 2), (16.0, 3), (0.25, 4)] {
            sorter.insert(d2, id);
        }
        assert_eq!(ids(&sorter), vec![4, 1, 2]);
        assert_eq!(sorter.largest_dist2(), 4.0);
    }

    #[test]
    fn far_insert_is_rejected_once_full() {
        let mut sorter = NearestSorter::new(2);
        sorter.insert(1.0, 0);
        sorter.insert(2.0, 1);
        sorter.insert(3.0, 2);
        assert_eq!(sorter.largest_dist2(), 2.0);
        sorter.insert(5.0, 3);
        assert_eq!(ids(&sorter), vec![0, 1]);
    }

    #[test]
    fn boundary_ties_are_all_retained() {
        let mut sorter = NearestSorter::new(2);
        sorter.insert(1.0, 0);
        sorter.insert(4.0, 1);
        sorter.insert(4.0, 2);
        // dropping the 4.0 bucket would leave only one id, so it stays whole
        assert_eq!(sorter.largest_dist2(), f64::MAX);
        assert_eq!(ids(&sorter), vec![0, 1]);
        // a closer pair makes the tied bucket disposable
        sorter.insert(2.0, 3);
        assert_eq!(sorter.largest_dist2(), 2.0);
        assert_eq!(ids(&sorter), vec![0, 3]);
    }

    #[test]
    fn tied_ids_emit_in_insertion_order() {
        let mut sorter = NearestSorter::new(4);
        sorter.insert(1.0, 7);
        sorter.insert(1.0, 3);
        sorter.insert(0.5, 9);
        sorter.insert(1.0, 5);
        assert_eq!(ids(&sorter), vec![9, 7, 3, 5]);
    }

    #[test]
    fn emits_fewer_when_underfilled() {
        let mut sorter = NearestSorter::new(10);
        sorter.insert(2.0, 1);
        sorter.insert(1.0, 0);
        assert_eq!(ids(&sorter), vec![0, 1]);
    }
}
