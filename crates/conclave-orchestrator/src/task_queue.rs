use crate::ids::TaskId;
use crate::types::{Task, TaskStatus};
use std::collections::{HashMap, VecDeque};

/// FIFO of pending task ids plus the map of every task ever submitted.
///
/// Tasks are never removed from the map; popping only removes the id from
/// the FIFO.
#[derive(Default)]
pub struct TaskQueue {
    tasks: HashMap<TaskId, Task>,
    pending: VecDeque<TaskId>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task and put it at the tail of the FIFO.
    pub fn push(&mut self, task: Task) -> TaskId {
        let id = task.id;
        self.tasks.insert(id, task);
        self.pending.push_back(id);
        id
    }

    /// Put an already-known task back at the tail.
    pub fn requeue(&mut self, id: TaskId) -> bool {
        if self.tasks.contains_key(&id) {
            self.pending.push_back(id);
            true
        } else {
            false
        }
    }

    /// Pop the head of the FIFO and return a snapshot of that task.
    pub fn pop_front(&mut self) -> Option<Task> {
        while let Some(id) = self.pending.pop_front() {
            if let Some(task) = self.tasks.get(&id) {
                return Some(task.clone());
            }
        }
        None
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    /// Pending, assigned or in-progress tasks, oldest first.
    pub fn active(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| t.status.is_active())
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.metrics.created_at);
        tasks
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }

    /// Ids waiting in the FIFO.
    pub fn queued_len(&self) -> usize {
        self.pending.len()
    }

    pub fn total_count(&self) -> usize {
        self.tasks.len()
    }
}
