use crate::types::Priority;
use std::collections::VecDeque;

/// Ordered queue of task ids.
///
/// Entries are kept sorted by priority rank; within one rank, insertion order
/// is preserved so equal-priority tasks are served first-in first-out.
#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: VecDeque<(String, Priority)>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `task_id` behind every entry of equal or higher priority.
    /// Returns the position it landed at.
    pub fn enqueue(&mut self, task_id: impl Into<String>, priority: Priority) -> usize {
        let position = self
            .entries
            .iter()
            .position(|(_, p)| p.rank() > priority.rank())
            .unwrap_or(self.entries.len());
        self.entries.insert(position, (task_id.into(), priority));
        position
    }

    /// Take the head of the queue.
    pub fn pop(&mut self) -> Option<String> {
        self.entries.pop_front().map(|(id, _)| id)
    }

    /// Look at the head without removing it.
    pub fn peek(&self) -> Option<&str> {
        self.entries.front().map(|(id, _)| id.as_str())
    }

    /// Drop `task_id` wherever it sits. Returns `false` if it was not queued.
    pub fn remove(&mut self, task_id: &str) -> bool {
        match self.entries.iter().position(|(id, _)| id == task_id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.entries.iter().any(|(id, _)| id == task_id)
    }

    /// Queue contents, head first.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
