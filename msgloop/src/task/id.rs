use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque ID that identifies one logical task queue.
///
/// IDs are handed out by a process-wide counter and are never reused, even
/// after the queue is disposed or across independent registries.
///
/// Two values are reserved: [`TaskQueueId::UNMERGED`] marks "no merge owner",
/// and [`TaskQueueId::INVALID`] is used by runners that are not backed by a
/// registry queue.
#[derive(Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TaskQueueId(u64);

impl TaskQueueId {
    pub const UNMERGED: TaskQueueId = TaskQueueId(u64::MAX);

    pub const INVALID: TaskQueueId = TaskQueueId(u64::MAX - 1);

    pub const fn new(value: u64) -> Self {
        TaskQueueId(value)
    }

    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Both sentinels live at the very top of the bitspace.
        if id >= TaskQueueId::INVALID.0 {
            Self::exhausted();
        }

        TaskQueueId(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task queue ID: bitspace exhausted")
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn is_valid(&self) -> bool {
        self.0 < TaskQueueId::INVALID.0
    }
}

impl fmt::Display for TaskQueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TaskQueueId::UNMERGED => f.write_str("unmerged"),
            TaskQueueId::INVALID => f.write_str("invalid"),
            TaskQueueId(id) => id.fmt(f),
        }
    }
}

impl fmt::Debug for TaskQueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskQueueId({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_next_task_queue_id_unique() {
        let n = 64;
        let ids = (0..n).map(|_| TaskQueueId::next()).collect::<HashSet<_>>();

        assert_eq!(ids.len(), n);
        assert!(ids.iter().all(TaskQueueId::is_valid));
    }

    #[test]
    fn test_reserved_ids() {
        assert_ne!(TaskQueueId::UNMERGED, TaskQueueId::INVALID);
        assert!(!TaskQueueId::UNMERGED.is_valid());
        assert!(!TaskQueueId::INVALID.is_valid());
        assert_eq!(TaskQueueId::UNMERGED.to_string(), "unmerged");
    }
}
