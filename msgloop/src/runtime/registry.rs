use crate::runtime::{TaskObserver, Wakeable};
use crate::task::{DelayedTask, Task, TaskQueueId, TaskSource, TaskSourceGrade};
use crate::time::TimePoint;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

// Book-keeping for one queue id. Subsumption is a forest of depth one: an
// entry with a non-empty `owner_of` is never subsumed, and a subsumed entry
// never owns anything.
struct TaskQueueEntry {
    task_source: TaskSource,

    // Interrupts the wait primitive of the loop servicing this queue.
    wakeable: Option<Weak<dyn Wakeable>>,

    // Kept in registration order. Only touched from the loop thread.
    task_observers: Vec<(isize, TaskObserver)>,

    // Queues whose tasks run on this queue's thread.
    owner_of: BTreeSet<TaskQueueId>,

    // `TaskQueueId::UNMERGED` unless another queue owns this one.
    subsumed_by: TaskQueueId,
}

impl TaskQueueEntry {
    fn new(task_queue_id: TaskQueueId) -> Self {
        Self {
            task_source: TaskSource::new(task_queue_id),
            wakeable: None,
            task_observers: Vec::new(),
            owner_of: BTreeSet::new(),
            subsumed_by: TaskQueueId::UNMERGED,
        }
    }

    fn is_subsumed(&self) -> bool {
        self.subsumed_by != TaskQueueId::UNMERGED
    }
}

// The task that would run next on a thread, and where it lives.
#[derive(Clone, Copy)]
struct TopTask {
    task_queue_id: TaskQueueId,
    grade: TaskSourceGrade,
    target_time: TimePoint,
}

struct Inner {
    queues: HashMap<TaskQueueId, TaskQueueEntry>,

    // Insertion sequence shared by every queue, used as the FIFO tie-break.
    order: u64,
}

/// The registry of every task queue: their pending tasks, wakeables,
/// observers and merge relationships.
///
/// One lock guards all of it. Wakeables are invoked while the lock is held,
/// so concurrent producers serialize their wake-ups and the platform timer
/// always ends up armed for the earliest pending task. User closures are
/// never run, nor dropped, with the lock held.
///
/// Operations on an id this registry did not hand out (or already disposed)
/// panic.
pub struct MessageLoopTaskQueues {
    inner: Mutex<Inner>,
}

impl MessageLoopTaskQueues {
    /// The process-wide registry. Created on first use and never torn down.
    pub fn instance() -> Arc<MessageLoopTaskQueues> {
        static INSTANCE: OnceLock<Arc<MessageLoopTaskQueues>> = OnceLock::new();

        Arc::clone(INSTANCE.get_or_init(|| Arc::new(MessageLoopTaskQueues::new())))
    }

    /// A registry independent from [`MessageLoopTaskQueues::instance`].
    ///
    /// Loops built against it (see
    /// [`Builder::task_queues`](crate::runtime::Builder::task_queues)) only
    /// see each other, which is what test harnesses want instead of
    /// resetting the global registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queues: HashMap::new(),
                order: 0,
            }),
        }
    }

    pub fn create_task_queue(&self) -> TaskQueueId {
        let task_queue_id = TaskQueueId::next();

        self.inner
            .lock()
            .queues
            .insert(task_queue_id, TaskQueueEntry::new(task_queue_id));

        tracing::debug!(%task_queue_id, "created task queue");
        task_queue_id
    }

    /// Removes a queue.
    ///
    /// Queues it owns are unmerged and woken up if they have work, and the
    /// queue is detached from its owner if it was subsumed. Pending tasks are
    /// dropped without running.
    #[track_caller]
    pub fn dispose(&self, queue_id: TaskQueueId) {
        let removed = {
            let mut inner = self.inner.lock();
            let entry = inner.remove(queue_id);

            if entry.is_subsumed()
                && let Some(owner) = inner.queues.get_mut(&entry.subsumed_by)
            {
                owner.owner_of.remove(&queue_id);
            }

            for subsumed in entry.owner_of.iter().copied() {
                if let Some(sub) = inner.queues.get_mut(&subsumed) {
                    sub.subsumed_by = TaskQueueId::UNMERGED;
                }
                inner.wake_up_if_pending(subsumed);
            }

            entry
        };

        tracing::debug!(task_queue_id = %queue_id, "disposed task queue");
        drop(removed);
    }

    /// Drops every pending task of the queue and of the queues it owns,
    /// without running them.
    #[track_caller]
    pub fn dispose_tasks(&self, queue_id: TaskQueueId) {
        let discarded = {
            let mut inner = self.inner.lock();

            let owner_of = inner.entry(queue_id).owner_of.clone();
            let mut discarded = inner.entry_mut(queue_id).task_source.shut_down();

            for subsumed in owner_of {
                discarded.extend(inner.entry_mut(subsumed).task_source.shut_down());
            }

            discarded
        };

        if !discarded.is_empty() {
            tracing::debug!(
                task_queue_id = %queue_id,
                num_tasks = discarded.len(),
                "dropped pending tasks"
            );
        }
        drop(discarded);
    }

    /// Queues `task` to run no earlier than `target_time`, then wakes the
    /// thread servicing the queue with its earliest pending time.
    #[track_caller]
    pub fn register_task(
        &self,
        queue_id: TaskQueueId,
        task: Task,
        target_time: TimePoint,
        grade: TaskSourceGrade,
    ) {
        let mut inner = self.inner.lock();

        let order = inner.order;
        inner.order += 1;

        let entry = inner.entry_mut(queue_id);
        entry
            .task_source
            .register_task(DelayedTask::new(order, task, target_time, grade));

        let servicing = if entry.is_subsumed() {
            entry.subsumed_by
        } else {
            queue_id
        };

        inner.wake_up_if_pending(servicing);
    }

    /// Whether the thread servicing `queue_id` has visible work. Always
    /// false for a subsumed queue, its owner reports the work instead.
    #[track_caller]
    pub fn has_pending_tasks(&self, queue_id: TaskQueueId) -> bool {
        self.inner.lock().has_pending_tasks(queue_id)
    }

    /// Pops the earliest task visible to `queue_id` (including the queues it
    /// owns) if it is due at `from_time`.
    ///
    /// The wakeable is re-armed for whatever stays pending: the next task's
    /// time, or [`TimePoint::max`] when nothing is left. Returns `None`,
    /// leaving everything queued, when the earliest task is in the future.
    #[track_caller]
    pub fn get_next_task_to_run(&self, queue_id: TaskQueueId, from_time: TimePoint) -> Option<Task> {
        let mut inner = self.inner.lock();

        let top = inner.peek_next_task(queue_id)?;

        if top.target_time > from_time {
            inner.wake_up(queue_id, top.target_time);
            return None;
        }

        let task = inner
            .entry_mut(top.task_queue_id)
            .task_source
            .pop_task(top.grade);

        let next_wake = inner.get_next_wake_time(queue_id);
        inner.wake_up(queue_id, next_wake);

        Some(task.into_task())
    }

    #[track_caller]
    pub fn get_num_pending_tasks(&self, queue_id: TaskQueueId) -> usize {
        let inner = self.inner.lock();
        let entry = inner.entry(queue_id);

        if entry.is_subsumed() {
            return 0;
        }

        entry.task_source.get_num_pending_tasks()
            + entry
                .owner_of
                .iter()
                .map(|id| inner.entry(*id).task_source.get_num_pending_tasks())
                .sum::<usize>()
    }

    #[track_caller]
    pub fn pause_secondary_source(&self, queue_id: TaskQueueId) {
        self.inner
            .lock()
            .entry_mut(queue_id)
            .task_source
            .pause_secondary();
    }

    /// Undoes one pause. Wakes the queue if work became visible.
    #[track_caller]
    pub fn resume_secondary_source(&self, queue_id: TaskQueueId) {
        let mut inner = self.inner.lock();
        inner.entry_mut(queue_id).task_source.resume_secondary();
        inner.wake_up_if_pending(queue_id);
    }

    /// Registers `callback` under `key`. Re-using a key replaces the callback
    /// and keeps its original position.
    #[track_caller]
    pub fn add_task_observer(&self, queue_id: TaskQueueId, key: isize, callback: TaskObserver) {
        let mut inner = self.inner.lock();
        let observers = &mut inner.entry_mut(queue_id).task_observers;

        match observers.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = callback,
            None => observers.push((key, callback)),
        }
    }

    /// Returns true if an observer was registered under `key`.
    #[track_caller]
    pub fn remove_task_observer(&self, queue_id: TaskQueueId, key: isize) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let observers = &mut inner.entry_mut(queue_id).task_observers;

            observers
                .iter()
                .position(|(k, _)| *k == key)
                .map(|idx| observers.remove(idx))
        };

        removed.is_some()
    }

    /// Observers to run after a batch drained on `queue_id`'s thread: its own
    /// followed by those of every queue it owns. Empty for a subsumed queue.
    #[track_caller]
    pub fn get_observers_to_notify(&self, queue_id: TaskQueueId) -> Vec<TaskObserver> {
        let inner = self.inner.lock();
        let entry = inner.entry(queue_id);

        if entry.is_subsumed() {
            return Vec::new();
        }

        std::iter::once(queue_id)
            .chain(entry.owner_of.iter().copied())
            .flat_map(|id| inner.entry(id).task_observers.iter())
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }

    /// # Panics
    ///
    /// Panics if the queue already has a wakeable.
    #[track_caller]
    pub fn set_wakeable(&self, queue_id: TaskQueueId, wakeable: Weak<dyn Wakeable>) {
        let mut inner = self.inner.lock();
        let entry = inner.entry_mut(queue_id);

        assert!(
            entry.wakeable.is_none(),
            "wakeable can only be set once for task queue {}",
            queue_id
        );
        entry.wakeable = Some(wakeable);
    }

    /// Makes `owner`'s thread service `subsumed`'s tasks.
    ///
    /// Merging a queue with itself, or an already merged pair, succeeds. The
    /// merge is rejected when `owner` is itself subsumed, when `subsumed`
    /// owns other queues, or when `subsumed` already has an owner.
    #[track_caller]
    pub fn merge(&self, owner: TaskQueueId, subsumed: TaskQueueId) -> bool {
        if owner == subsumed {
            return true;
        }

        let mut inner = self.inner.lock();

        let owner_entry = inner.entry(owner);
        let subsumed_entry = inner.entry(subsumed);

        if owner_entry.owner_of.contains(&subsumed) {
            return true;
        }

        let rejection = if owner_entry.is_subsumed() {
            Some("owner is already subsumed by another queue")
        } else if !subsumed_entry.owner_of.is_empty() {
            Some("subsumed queue owns other queues")
        } else if subsumed_entry.is_subsumed() {
            Some("subsumed queue already has an owner")
        } else {
            None
        };

        if let Some(reason) = rejection {
            tracing::warn!(%owner, %subsumed, reason, "rejected task queue merge");
            return false;
        }

        inner.entry_mut(owner).owner_of.insert(subsumed);
        inner.entry_mut(subsumed).subsumed_by = owner;

        tracing::debug!(%owner, %subsumed, "merged task queues");
        inner.wake_up_if_pending(owner);
        true
    }

    /// Removes the `owner` → `subsumed` edge; both threads are woken if they
    /// have work. Rejected unless that exact edge exists.
    #[track_caller]
    pub fn unmerge(&self, owner: TaskQueueId, subsumed: TaskQueueId) -> bool {
        let mut inner = self.inner.lock();

        let owner_entry = inner.entry(owner);
        let subsumed_entry = inner.entry(subsumed);

        let rejection = if owner_entry.owner_of.is_empty() {
            Some("owner does not own any queue")
        } else if owner_entry.is_subsumed() {
            Some("owner is subsumed by another queue")
        } else if !subsumed_entry.is_subsumed() {
            Some("subsumed queue is not merged")
        } else if !owner_entry.owner_of.contains(&subsumed) {
            Some("subsumed queue is owned by another queue")
        } else {
            None
        };

        if let Some(reason) = rejection {
            tracing::warn!(%owner, %subsumed, reason, "rejected task queue unmerge");
            return false;
        }

        inner.entry_mut(subsumed).subsumed_by = TaskQueueId::UNMERGED;
        inner.entry_mut(owner).owner_of.remove(&subsumed);

        tracing::debug!(%owner, %subsumed, "unmerged task queues");
        inner.wake_up_if_pending(owner);
        inner.wake_up_if_pending(subsumed);
        true
    }

    /// Whether `owner` directly owns `subsumed`. False if either is
    /// [`TaskQueueId::UNMERGED`].
    #[track_caller]
    pub fn owns(&self, owner: TaskQueueId, subsumed: TaskQueueId) -> bool {
        if owner == TaskQueueId::UNMERGED || subsumed == TaskQueueId::UNMERGED {
            return false;
        }

        self.inner.lock().entry(owner).owner_of.contains(&subsumed)
    }

    #[track_caller]
    pub fn get_subsumed_task_queue_id(&self, owner: TaskQueueId) -> BTreeSet<TaskQueueId> {
        self.inner.lock().entry(owner).owner_of.clone()
    }

    /// Equal ids, or one owning the other in either direction.
    #[track_caller]
    pub fn runs_on_the_same_thread(&self, queue_a: TaskQueueId, queue_b: TaskQueueId) -> bool {
        queue_a == queue_b || self.owns(queue_a, queue_b) || self.owns(queue_b, queue_a)
    }

    pub fn num_task_queues(&self) -> usize {
        self.inner.lock().queues.len()
    }

    pub fn contains(&self, queue_id: TaskQueueId) -> bool {
        self.inner.lock().queues.contains_key(&queue_id)
    }
}

impl Default for MessageLoopTaskQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageLoopTaskQueues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageLoopTaskQueues")
            .field("num_task_queues", &self.num_task_queues())
            .finish_non_exhaustive()
    }
}

// --- Unlocked helpers, callers hold the registry lock ---
impl Inner {
    #[track_caller]
    fn entry(&self, queue_id: TaskQueueId) -> &TaskQueueEntry {
        match self.queues.get(&queue_id) {
            Some(entry) => entry,
            None => unknown_queue(queue_id),
        }
    }

    #[track_caller]
    fn entry_mut(&mut self, queue_id: TaskQueueId) -> &mut TaskQueueEntry {
        match self.queues.get_mut(&queue_id) {
            Some(entry) => entry,
            None => unknown_queue(queue_id),
        }
    }

    #[track_caller]
    fn remove(&mut self, queue_id: TaskQueueId) -> TaskQueueEntry {
        match self.queues.remove(&queue_id) {
            Some(entry) => entry,
            None => unknown_queue(queue_id),
        }
    }

    fn has_pending_tasks(&self, queue_id: TaskQueueId) -> bool {
        let entry = self.entry(queue_id);

        if entry.is_subsumed() {
            return false;
        }

        !entry.task_source.is_empty()
            || entry
                .owner_of
                .iter()
                .any(|id| !self.entry(*id).task_source.is_empty())
    }

    // Earliest visible task across the queue and everything it owns. Ties
    // between queues keep the first candidate, i.e. the owner's own task.
    fn peek_next_task(&self, queue_id: TaskQueueId) -> Option<TopTask> {
        if !self.has_pending_tasks(queue_id) {
            return None;
        }

        let entry = self.entry(queue_id);

        std::iter::once(queue_id)
            .chain(entry.owner_of.iter().copied())
            .filter_map(|id| {
                let source = &self.entry(id).task_source;
                (!source.is_empty()).then(|| (id, source.top()))
            })
            .reduce(|best, candidate| if best.1 > candidate.1 { candidate } else { best })
            .map(|(task_queue_id, task)| TopTask {
                task_queue_id,
                grade: task.grade(),
                target_time: task.target_time(),
            })
    }

    fn get_next_wake_time(&self, queue_id: TaskQueueId) -> TimePoint {
        self.peek_next_task(queue_id)
            .map_or(TimePoint::max(), |top| top.target_time)
    }

    fn wake_up(&self, queue_id: TaskQueueId, time_point: TimePoint) {
        // A dead wakeable means the loop is tearing down; nothing to wake.
        if let Some(wakeable) = self
            .entry(queue_id)
            .wakeable
            .as_ref()
            .and_then(Weak::upgrade)
        {
            tracing::trace!(task_queue_id = %queue_id, %time_point, "wake up");
            wakeable.wake_up(time_point);
        }
    }

    fn wake_up_if_pending(&self, queue_id: TaskQueueId) {
        if self.has_pending_tasks(queue_id) {
            self.wake_up(queue_id, self.get_next_wake_time(queue_id));
        }
    }
}

#[cold]
#[track_caller]
fn unknown_queue(queue_id: TaskQueueId) -> ! {
    panic!("unknown task queue {}", queue_id)
}

#[cfg(test)]
mod tests;
