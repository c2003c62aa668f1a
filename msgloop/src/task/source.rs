use crate::task::{DelayedTask, TaskQueueId, TaskSourceGrade};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

type TaskHeap = BinaryHeap<Reverse<DelayedTask>>;

/// Pending work of one task queue.
///
/// Tasks are split across two min-heaps by [`TaskSourceGrade`]. The secondary
/// heap can be paused, in which case it is invisible to
/// [`TaskSource::top`] and [`TaskSource::get_num_pending_tasks`] until it is
/// resumed the same number of times.
#[derive(Debug)]
pub struct TaskSource {
    task_queue_id: TaskQueueId,
    primary_task_queue: TaskHeap,
    secondary_task_queue: TaskHeap,
    secondary_pause_requests: usize,
}

impl TaskSource {
    pub fn new(task_queue_id: TaskQueueId) -> Self {
        Self {
            task_queue_id,
            primary_task_queue: BinaryHeap::new(),
            secondary_task_queue: BinaryHeap::new(),
            secondary_pause_requests: 0,
        }
    }

    pub fn task_queue_id(&self) -> TaskQueueId {
        self.task_queue_id
    }

    pub fn register_task(&mut self, task: DelayedTask) {
        self.heap_mut(task.grade()).push(Reverse(task));
    }

    /// Removes the earliest task of the heap `grade` maps to.
    ///
    /// Callers peek with [`TaskSource::top`] and pop the grade they saw,
    /// without mutating the source in between.
    ///
    /// # Panics
    ///
    /// Panics if that heap is empty.
    #[track_caller]
    pub fn pop_task(&mut self, grade: TaskSourceGrade) -> DelayedTask {
        let task_queue_id = self.task_queue_id;
        match self.heap_mut(grade).pop() {
            Some(Reverse(task)) => task,
            None => panic!(
                "pop_task({:?}) on an empty heap of task queue {}",
                grade, task_queue_id
            ),
        }
    }

    pub fn get_num_pending_tasks(&self) -> usize {
        let secondary = if self.is_secondary_paused() {
            0
        } else {
            self.secondary_task_queue.len()
        };

        self.primary_task_queue.len() + secondary
    }

    pub fn is_empty(&self) -> bool {
        self.get_num_pending_tasks() == 0
    }

    /// Returns the earliest visible task.
    ///
    /// When both heaps have work their tops are compared and the secondary
    /// top is returned only if it is strictly earlier; the primary heap wins
    /// ties.
    ///
    /// # Panics
    ///
    /// Panics if no task is visible.
    #[track_caller]
    pub fn top(&self) -> &DelayedTask {
        let primary = self.primary_task_queue.peek().map(|Reverse(t)| t);
        let secondary = if self.is_secondary_paused() {
            None
        } else {
            self.secondary_task_queue.peek().map(|Reverse(t)| t)
        };

        match (primary, secondary) {
            (Some(p), Some(s)) if p > s => s,
            (Some(p), _) => p,
            (None, Some(s)) => s,
            (None, None) => panic!("top() called on empty task queue {}", self.task_queue_id),
        }
    }

    pub fn pause_secondary(&mut self) {
        self.secondary_pause_requests += 1;
    }

    /// Undoes one [`TaskSource::pause_secondary`]. Unbalanced calls are a
    /// bug: they assert in debug builds and are ignored in release builds.
    #[track_caller]
    pub fn resume_secondary(&mut self) {
        debug_assert!(
            self.secondary_pause_requests > 0,
            "resume_secondary() without a matching pause on task queue {}",
            self.task_queue_id
        );
        self.secondary_pause_requests = self.secondary_pause_requests.saturating_sub(1);
    }

    pub fn is_secondary_paused(&self) -> bool {
        self.secondary_pause_requests > 0
    }

    /// Empties both heaps without running anything.
    ///
    /// The records are handed back so the caller controls where the closures
    /// are dropped. The pause counter is left untouched.
    #[must_use = "dropping the returned tasks drops their closures"]
    pub fn shut_down(&mut self) -> Vec<DelayedTask> {
        self.primary_task_queue
            .drain()
            .chain(self.secondary_task_queue.drain())
            .map(|Reverse(task)| task)
            .collect()
    }

    fn heap_mut(&mut self, grade: TaskSourceGrade) -> &mut TaskHeap {
        if grade.is_secondary() {
            &mut self.secondary_task_queue
        } else {
            &mut self.primary_task_queue
        }
    }
}
