//! Unbounded multi-producer multi-consumer queue of ready task keys.

use crossbeam_queue::SegQueue;

/// Overflow and rendezvous queue shared by all workers. Ordering between
/// producers is not guaranteed.
#[derive(Debug, Default)]
pub(crate) struct GlobalQueue {
    queue: SegQueue<usize>,
}

impl GlobalQueue {
    pub(crate) fn push(&self, key: usize) {
        self.queue.push(key);
    }

    pub(crate) fn push_batch(&self, keys: impl IntoIterator<Item = usize>) {
        for key in keys {
            self.queue.push(key);
        }
    }

    pub(crate) fn pop(&self) -> Option<usize> {
        self.queue.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
