/*!
 * Task Registry
 * Authoritative id -> task record mapping
 */

use super::task::TaskRecord;
use crate::core::types::TaskId;
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// Registered tasks, guarded by the scheduler's blocking mutex
#[derive(Debug, Default)]
pub struct Registry {
    tasks: HashMap<TaskId, Arc<TaskRecord>, RandomState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record; returns false and keeps the existing one on a duplicate id
    pub fn insert(&mut self, task: Arc<TaskRecord>) -> bool {
        use std::collections::hash_map::Entry;

        match self.tasks.entry(task.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(task);
                true
            }
        }
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Arc<TaskRecord>> {
        self.tasks.remove(&id)
    }

    pub fn find(&self, id: TaskId) -> Option<&Arc<TaskRecord>> {
        self.tasks.get(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TaskRecord>> {
        self.tasks.values()
    }

    /// Remove every record, leaving the registry empty
    pub fn drain(&mut self) -> Vec<Arc<TaskRecord>> {
        self.tasks.drain().map(|(_, task)| task).collect()
    }
}
