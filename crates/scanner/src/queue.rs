use std::{collections::VecDeque, sync::Mutex};

use block_delta_domain::BlockHeight;
use thiserror::Error;

/// A pending fetch plus how many times it has already failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub height: BlockHeight,
    pub failures: u32,
}

impl WorkItem {
    pub fn new(height: BlockHeight) -> Self {
        Self {
            height,
            failures: 0,
        }
    }

    pub fn failed(self) -> Self {
        Self {
            height: self.height,
            failures: self.failures.saturating_add(1),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("work queue full ({capacity} entries), cannot accept block {height}")]
    Full {
        capacity: usize,
        height: BlockHeight,
    },
}

/// Bounded FIFO of heights shared by the fetch workers. Popping never waits:
/// an empty queue tells the caller there is nothing left to do.
#[derive(Debug)]
pub struct WorkQueue {
    capacity: usize,
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Queue holding exactly `heights`, sized to them.
    pub fn seeded(heights: &[BlockHeight]) -> Self {
        let items = heights.iter().copied().map(WorkItem::new).collect();
        Self {
            capacity: heights.len(),
            items: Mutex::new(items),
        }
    }

    pub fn try_pop(&self) -> Option<WorkItem> {
        self.items.lock().expect("mutex poisoned").pop_front()
    }

    pub fn push(&self, item: WorkItem) -> Result<(), QueueError> {
        let mut guard = self.items.lock().expect("mutex poisoned");
        if guard.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
                height: item.height,
            });
        }
        guard.push_back(item);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The `window` most recent heights ending at `tip`, newest first. Shorter
/// chains yield every height down to genesis.
pub fn window_heights(tip: BlockHeight, window: usize) -> Vec<BlockHeight> {
    (0..=tip).rev().take(window).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeSet, sync::Arc, thread};

    #[test]
    fn window_is_descending_from_tip() {
        assert_eq!(window_heights(100, 4), vec![100, 99, 98, 97]);
        assert_eq!(window_heights(2, 10), vec![2, 1, 0]);
        assert_eq!(window_heights(0, 1), vec![0]);
        assert!(window_heights(5, 0).is_empty());
    }

    #[test]
    fn seeded_queue_pops_in_order_then_reports_empty() {
        let queue = WorkQueue::seeded(&[10, 9, 8]);
        assert_eq!(queue.capacity(), 3);
        assert_eq!(queue.try_pop(), Some(WorkItem::new(10)));
        assert_eq!(queue.try_pop(), Some(WorkItem::new(9)));
        assert_eq!(queue.try_pop(), Some(WorkItem::new(8)));
        assert_eq!(queue.try_pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn requeued_items_go_to_the_back_with_failure_count() {
        let queue = WorkQueue::seeded(&[10, 9]);
        let first = queue.try_pop().unwrap();
        queue.push(first.failed()).unwrap();

        assert_eq!(queue.try_pop(), Some(WorkItem::new(9)));
        assert_eq!(
            queue.try_pop(),
            Some(WorkItem {
                height: 10,
                failures: 1
            })
        );
    }

    #[test]
    fn push_beyond_capacity_is_rejected() {
        let queue = WorkQueue::with_capacity(1);
        queue.push(WorkItem::new(1)).unwrap();
        assert_eq!(
            queue.push(WorkItem::new(2)),
            Err(QueueError::Full {
                capacity: 1,
                height: 2
            })
        );
    }

    #[test]
    fn concurrent_pops_hand_out_each_height_once() {
        let heights: Vec<BlockHeight> = (0..500).collect();
        let queue = Arc::new(WorkQueue::seeded(&heights));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(item) = queue.try_pop() {
                        taken.push(item.height);
                    }
                    taken
                })
            })
            .collect();

        let mut seen = BTreeSet::new();
        let mut total = 0;
        for handle in handles {
            let taken = handle.join().unwrap();
            total += taken.len();
            seen.extend(taken);
        }
        assert_eq!(total, 500);
        assert_eq!(seen.len(), 500);
    }
}
