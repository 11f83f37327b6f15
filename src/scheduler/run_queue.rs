/*!
 * Run Queue
 * READY tasks ordered by ascending period, FIFO among equal periods
 */

use super::task::TaskRecord;
use crate::core::types::TaskId;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct RunQueue {
    entries: Vec<Arc<TaskRecord>>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert before the first entry with a strictly greater period
    ///
    /// Returns the insertion index; `0` means the head changed.
    pub fn insert(&mut self, task: Arc<TaskRecord>) -> usize {
        let period = task.period();
        let index = self.entries.partition_point(|e| e.period() <= period);
        self.entries.insert(index, task);
        index
    }

    /// Remove a task by id; a no-op when it is already absent
    pub fn remove(&mut self, id: TaskId) -> Option<Arc<TaskRecord>> {
        let index = self.entries.iter().position(|e| e.id() == id)?;
        Some(self.entries.remove(index))
    }

    /// Shortest-period entry, without removing it
    #[inline]
    pub fn peek_shortest(&self) -> Option<&Arc<TaskRecord>> {
        self.entries.first()
    }

    pub fn pop_shortest(&mut self) -> Option<Arc<TaskRecord>> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in queue order
    pub fn ids(&self) -> Vec<TaskId> {
        self.entries.iter().map(|e| e.id()).collect()
    }

    /// Whether periods are non-decreasing from head to tail
    pub fn is_ordered(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[0].period() <= pair[1].period())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ExecHandle;
    use std::time::{Duration, Instant};

    fn task(id: TaskId, period_ms: u64) -> Arc<TaskRecord> {
        Arc::new(TaskRecord::new(
            id,
            period_ms,
            1,
            Duration::from_millis(period_ms),
            Duration::from_millis(1),
            ExecHandle::from_raw(u64::from(id)),
            Instant::now(),
        ))
    }

    #[test]
    fn test_sorted_by_period() {
        let mut queue = RunQueue::new();
        queue.insert(task(1, 450));
        queue.insert(task(2, 200));
        queue.insert(task(3, 300));

        assert_eq!(queue.ids(), vec![2, 3, 1]);
        assert!(queue.is_ordered());
        assert_eq!(queue.peek_shortest().map(|t| t.id()), Some(2));
    }

    #[test]
    fn test_equal_periods_are_fifo() {
        let mut queue = RunQueue::new();
        queue.insert(task(1, 100));
        queue.insert(task(2, 100));
        assert_eq!(queue.insert(task(3, 100)), 2);
        queue.insert(task(4, 50));

        assert_eq!(queue.ids(), vec![4, 1, 2, 3]);
    }

    #[test]
    fn test_insert_reports_head_change() {
        let mut queue = RunQueue::new();
        assert_eq!(queue.insert(task(1, 300)), 0);
        assert_eq!(queue.insert(task(2, 500)), 1);
        assert_eq!(queue.insert(task(3, 100)), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut queue = RunQueue::new();
        queue.insert(task(1, 100));
        queue.insert(task(2, 200));

        assert_eq!(queue.remove(1).map(|t| t.id()), Some(1));
        assert!(queue.remove(1).is_none());
        assert_eq!(queue.ids(), vec![2]);
    }

    #[test]
    fn test_pop_shortest() {
        let mut queue = RunQueue::new();
        assert!(queue.pop_shortest().is_none());

        queue.insert(task(1, 300));
        queue.insert(task(2, 100));
        assert_eq!(queue.pop_shortest().map(|t| t.id()), Some(2));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(1));
        assert!(!queue.contains(2));
    }
}
