use crate::task::Task;
use crate::time::TimePoint;
use std::cmp::Ordering;
use std::fmt;

/// Priority class of a posted task. Decides which heap of a
/// [`TaskSource`](crate::task::TaskSource) the task lands in.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskSourceGrade {
    /// Input handling and other work the user is waiting on. Primary heap.
    UserInteraction,

    /// Work driven by an embedded language runtime's event loop. Secondary
    /// heap, so it can be paused without stalling anything else.
    DartEventLoop,

    /// Everything else. Primary heap.
    #[default]
    Unspecified,
}

impl TaskSourceGrade {
    pub(crate) fn is_secondary(self) -> bool {
        matches!(self, TaskSourceGrade::DartEventLoop)
    }
}

/// A task waiting in a queue, with its fire time and insertion order.
///
/// Records are ordered by `(target_time, order)`: an earlier target time
/// sorts first, and equal target times fall back to insertion order so the
/// queue stays FIFO.
pub struct DelayedTask {
    order: u64,
    task: Task,
    target_time: TimePoint,
    grade: TaskSourceGrade,
}

impl DelayedTask {
    pub fn new(order: u64, task: Task, target_time: TimePoint, grade: TaskSourceGrade) -> Self {
        Self {
            order,
            task,
            target_time,
            grade,
        }
    }

    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn target_time(&self) -> TimePoint {
        self.target_time
    }

    pub fn grade(&self) -> TaskSourceGrade {
        self.grade
    }

    pub fn into_task(self) -> Task {
        self.task
    }
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.target_time == other.target_time && self.order == other.order
    }
}

impl Eq for DelayedTask {}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.target_time
            .cmp(&other.target_time)
            .then(self.order.cmp(&other.order))
    }
}

impl fmt::Debug for DelayedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedTask")
            .field("order", &self.order)
            .field("target_time", &self.target_time)
            .field("grade", &self.grade)
            .finish_non_exhaustive()
    }
}
