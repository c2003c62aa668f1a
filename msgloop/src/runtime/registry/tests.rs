use super::*;
use crate::test_utils::*;
use parking_lot::Mutex;
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

assert_impl_all!(MessageLoopTaskQueues: Send, Sync);

fn queues_with_spy() -> (MessageLoopTaskQueues, TaskQueueId, Arc<SpyWakeable>) {
    let queues = MessageLoopTaskQueues::new();
    let id = queues.create_task_queue();
    let spy = SpyWakeable::new();
    queues.set_wakeable(id, spy.as_weak());
    (queues, id, spy)
}

fn drain_all(queues: &MessageLoopTaskQueues, id: TaskQueueId, now: TimePoint) -> usize {
    let mut n = 0;
    while let Some(task) = queues.get_next_task_to_run(id, now) {
        task();
        n += 1;
    }
    n
}

#[test]
fn test_start_with_no_pending_tasks() {
    let queues = MessageLoopTaskQueues::new();
    let id = queues.create_task_queue();

    assert!(!queues.has_pending_tasks(id));
    assert_eq!(queues.get_num_pending_tasks(id), 0);
    assert!(queues.get_next_task_to_run(id, TimePoint::max()).is_none());
}

#[test]
fn test_register_two_tasks_and_count() {
    let queues = MessageLoopTaskQueues::new();
    let id = queues.create_task_queue();

    queues.register_task(id, noop_task(), at_ms(0), TaskSourceGrade::Unspecified);
    queues.register_task(id, noop_task(), TimePoint::max(), TaskSourceGrade::Unspecified);

    assert!(queues.has_pending_tasks(id));
    assert_eq!(queues.get_num_pending_tasks(id), 2);
}

#[test]
fn test_tasks_run_in_time_then_post_order() {
    let queues = MessageLoopTaskQueues::new();
    let id = queues.create_task_queue();
    let log = Arc::new(Mutex::new(Vec::new()));

    queues.register_task(id, recording_task(&log, "c"), at_ms(20), TaskSourceGrade::Unspecified);
    queues.register_task(id, recording_task(&log, "a"), at_ms(10), TaskSourceGrade::Unspecified);
    queues.register_task(id, recording_task(&log, "b"), at_ms(10), TaskSourceGrade::Unspecified);

    assert_eq!(drain_all(&queues, id, at_ms(100)), 3);
    assert_eq!(*log.lock(), vec!["a", "b", "c"]);
}

#[test]
fn test_future_task_stays_queued() {
    let (queues, id, spy) = queues_with_spy();

    queues.register_task(id, noop_task(), at_ms(50), TaskSourceGrade::Unspecified);
    spy.clear();

    assert!(queues.get_next_task_to_run(id, at_ms(10)).is_none());
    assert_eq!(queues.get_num_pending_tasks(id), 1);
    assert_eq!(spy.last_call(), Some(at_ms(50)));

    assert!(queues.get_next_task_to_run(id, at_ms(50)).is_some());
    assert!(!queues.has_pending_tasks(id));
}

#[test]
fn test_wakeable_armed_for_earliest_task() {
    let (queues, id, spy) = queues_with_spy();

    queues.register_task(id, noop_task(), at_ms(30), TaskSourceGrade::Unspecified);
    assert_eq!(spy.last_call(), Some(at_ms(30)));

    // A later task does not push the wake-up back.
    queues.register_task(id, noop_task(), at_ms(90), TaskSourceGrade::Unspecified);
    assert_eq!(spy.last_call(), Some(at_ms(30)));

    // An earlier one pulls it in.
    queues.register_task(id, noop_task(), at_ms(5), TaskSourceGrade::Unspecified);
    assert_eq!(spy.last_call(), Some(at_ms(5)));

    assert_eq!(spy.get_calls(), vec![at_ms(30), at_ms(30), at_ms(5)]);
}

#[test]
fn test_rearm_after_pop() {
    let (queues, id, spy) = queues_with_spy();

    queues.register_task(id, noop_task(), at_ms(1), TaskSourceGrade::Unspecified);
    queues.register_task(id, noop_task(), at_ms(40), TaskSourceGrade::Unspecified);

    assert!(queues.get_next_task_to_run(id, at_ms(10)).is_some());
    assert_eq!(spy.last_call(), Some(at_ms(40)));

    assert!(queues.get_next_task_to_run(id, at_ms(40)).is_some());
    assert_eq!(spy.last_call(), Some(TimePoint::max()));
}

#[test]
fn test_paused_secondary_task_does_not_wake() {
    let (queues, id, spy) = queues_with_spy();

    queues.pause_secondary_source(id);
    queues.register_task(id, noop_task(), at_ms(0), TaskSourceGrade::DartEventLoop);

    assert_eq!(spy.num_calls(), 0);
    assert!(!queues.has_pending_tasks(id));

    queues.resume_secondary_source(id);
    assert_eq!(spy.last_call(), Some(at_ms(0)));
    assert_eq!(queues.get_num_pending_tasks(id), 1);
}

#[test]
fn test_pause_affects_only_its_queue() {
    let queues = MessageLoopTaskQueues::new();
    let a = queues.create_task_queue();
    let b = queues.create_task_queue();

    queues.register_task(a, noop_task(), at_ms(0), TaskSourceGrade::DartEventLoop);
    queues.register_task(b, noop_task(), at_ms(0), TaskSourceGrade::DartEventLoop);

    queues.pause_secondary_source(a);
    assert_eq!(queues.get_num_pending_tasks(a), 0);
    assert_eq!(queues.get_num_pending_tasks(b), 1);
}

#[test]
fn test_observers_registration_order_and_replace() {
    let queues = MessageLoopTaskQueues::new();
    let id = queues.create_task_queue();
    let log = Arc::new(Mutex::new(Vec::new()));

    for key in [3_isize, 1, 2] {
        let log = Arc::clone(&log);
        queues.add_task_observer(id, key, Arc::new(move || log.lock().push(key)));
    }

    // Replacing key 1 keeps its slot.
    let replaced = Arc::clone(&log);
    queues.add_task_observer(id, 1, Arc::new(move || replaced.lock().push(10)));

    for observer in queues.get_observers_to_notify(id) {
        observer();
    }
    assert_eq!(*log.lock(), vec![3, 10, 2]);

    assert!(queues.remove_task_observer(id, 3));
    assert!(!queues.remove_task_observer(id, 3));
    assert_eq!(queues.get_observers_to_notify(id).len(), 2);
}

#[test]
fn test_observers_of_subsumed_queues_notify_on_owner() {
    let queues = MessageLoopTaskQueues::new();
    let owner = queues.create_task_queue();
    let subsumed = queues.create_task_queue();
    let counter = Arc::new(AtomicUsize::new(0));

    for id in [owner, subsumed] {
        let counter = Arc::clone(&counter);
        queues.add_task_observer(id, 0, Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    }

    assert!(queues.merge(owner, subsumed));

    assert!(queues.get_observers_to_notify(subsumed).is_empty());
    for observer in queues.get_observers_to_notify(owner) {
        observer();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_merge_runs_on_the_same_thread() {
    let queues = MessageLoopTaskQueues::new();
    let a = queues.create_task_queue();
    let b = queues.create_task_queue();
    let c = queues.create_task_queue();

    assert!(queues.merge(a, b));

    assert!(queues.owns(a, b));
    assert!(!queues.owns(b, a));
    assert!(queues.runs_on_the_same_thread(a, b));
    assert!(queues.runs_on_the_same_thread(b, a));
    assert!(queues.runs_on_the_same_thread(c, c));
    assert!(!queues.runs_on_the_same_thread(a, c));
    assert!(!queues.runs_on_the_same_thread(c, a));
    assert!(!queues.runs_on_the_same_thread(b, c));
    assert!(!queues.runs_on_the_same_thread(c, b));

    assert!(queues.unmerge(a, b));
    assert!(!queues.runs_on_the_same_thread(a, b));
}

#[test]
fn test_merge_is_idempotent() {
    let queues = MessageLoopTaskQueues::new();
    let a = queues.create_task_queue();
    let b = queues.create_task_queue();

    assert!(queues.merge(a, a));
    assert!(queues.merge(a, b));
    assert!(queues.merge(a, b));
    assert_eq!(queues.get_subsumed_task_queue_id(a), BTreeSet::from([b]));
}

#[test]
fn test_owner_can_subsume_many() {
    let queues = MessageLoopTaskQueues::new();
    let owner = queues.create_task_queue();
    let b = queues.create_task_queue();
    let c = queues.create_task_queue();

    assert!(queues.merge(owner, b));
    assert!(queues.merge(owner, c));
    assert_eq!(queues.get_subsumed_task_queue_id(owner), BTreeSet::from([b, c]));
}

type Attempt = fn(&MessageLoopTaskQueues, TaskQueueId, TaskQueueId, TaskQueueId) -> bool;

fn merge_into_subsumed_owner(q: &MessageLoopTaskQueues, a: TaskQueueId, b: TaskQueueId, c: TaskQueueId) -> bool {
    assert!(q.merge(c, a));
    q.merge(a, b)
}

fn merge_owner_of_others(q: &MessageLoopTaskQueues, a: TaskQueueId, b: TaskQueueId, c: TaskQueueId) -> bool {
    assert!(q.merge(b, c));
    q.merge(a, b)
}

fn merge_already_owned(q: &MessageLoopTaskQueues, a: TaskQueueId, b: TaskQueueId, c: TaskQueueId) -> bool {
    assert!(q.merge(c, b));
    q.merge(a, b)
}

#[rstest]
#[case::owner_already_subsumed(merge_into_subsumed_owner)]
#[case::subsumed_owns_others(merge_owner_of_others)]
#[case::subsumed_has_another_owner(merge_already_owned)]
fn test_merge_rejected(#[case] attempt: Attempt) {
    let queues = MessageLoopTaskQueues::new();
    let a = queues.create_task_queue();
    let b = queues.create_task_queue();
    let c = queues.create_task_queue();

    assert!(!attempt(&queues, a, b, c));
    assert!(!queues.owns(a, b));
}

fn unmerge_from_empty_owner(q: &MessageLoopTaskQueues, a: TaskQueueId, b: TaskQueueId, _c: TaskQueueId) -> bool {
    q.unmerge(a, b)
}

fn unmerge_not_merged(q: &MessageLoopTaskQueues, a: TaskQueueId, b: TaskQueueId, c: TaskQueueId) -> bool {
    assert!(q.merge(a, c));
    q.unmerge(a, b)
}

fn unmerge_owned_by_another(q: &MessageLoopTaskQueues, a: TaskQueueId, b: TaskQueueId, c: TaskQueueId) -> bool {
    let d = q.create_task_queue();
    assert!(q.merge(a, c));
    assert!(q.merge(d, b));
    q.unmerge(a, b)
}

fn unmerge_reversed_edge(q: &MessageLoopTaskQueues, a: TaskQueueId, b: TaskQueueId, _c: TaskQueueId) -> bool {
    assert!(q.merge(a, b));
    q.unmerge(b, a)
}

#[rstest]
#[case::owner_owns_nothing(unmerge_from_empty_owner)]
#[case::not_merged(unmerge_not_merged)]
#[case::owned_by_another(unmerge_owned_by_another)]
#[case::reversed_edge(unmerge_reversed_edge)]
fn test_unmerge_rejected(#[case] attempt: Attempt) {
    let queues = MessageLoopTaskQueues::new();
    let a = queues.create_task_queue();
    let b = queues.create_task_queue();
    let c = queues.create_task_queue();

    assert!(!attempt(&queues, a, b, c));
}

#[test]
fn test_merged_queue_tasks_are_served_by_owner() {
    let queues = MessageLoopTaskQueues::new();
    let owner = queues.create_task_queue();
    let subsumed = queues.create_task_queue();
    let log = Arc::new(Mutex::new(Vec::new()));

    queues.register_task(owner, recording_task(&log, "owner"), at_ms(20), TaskSourceGrade::Unspecified);
    queues.register_task(subsumed, recording_task(&log, "sub"), at_ms(10), TaskSourceGrade::Unspecified);

    assert!(queues.merge(owner, subsumed));

    assert!(!queues.has_pending_tasks(subsumed));
    assert_eq!(queues.get_num_pending_tasks(subsumed), 0);
    assert!(queues.get_next_task_to_run(subsumed, at_ms(100)).is_none());

    assert_eq!(queues.get_num_pending_tasks(owner), 2);
    assert_eq!(drain_all(&queues, owner, at_ms(100)), 2);
    assert_eq!(*log.lock(), vec!["sub", "owner"]);
}

#[test]
fn test_merge_wakes_owner_and_register_on_subsumed_wakes_owner() {
    let queues = MessageLoopTaskQueues::new();
    let owner = queues.create_task_queue();
    let subsumed = queues.create_task_queue();
    let owner_spy = SpyWakeable::new();
    let subsumed_spy = SpyWakeable::new();
    queues.set_wakeable(owner, owner_spy.as_weak());
    queues.set_wakeable(subsumed, subsumed_spy.as_weak());

    queues.register_task(subsumed, noop_task(), at_ms(7), TaskSourceGrade::Unspecified);
    assert_eq!(subsumed_spy.num_calls(), 1);

    assert!(queues.merge(owner, subsumed));
    assert_eq!(owner_spy.last_call(), Some(at_ms(7)));

    queues.register_task(subsumed, noop_task(), at_ms(3), TaskSourceGrade::Unspecified);
    assert_eq!(owner_spy.last_call(), Some(at_ms(3)));
    assert_eq!(subsumed_spy.num_calls(), 1);

    assert!(queues.unmerge(owner, subsumed));
    assert_eq!(subsumed_spy.last_call(), Some(at_ms(3)));
}

#[test]
fn test_cross_queue_tie_uses_insertion_order() {
    let queues = MessageLoopTaskQueues::new();
    let owner = queues.create_task_queue();
    let subsumed = queues.create_task_queue();
    let log = Arc::new(Mutex::new(Vec::new()));

    assert!(queues.merge(owner, subsumed));
    queues.register_task(subsumed, recording_task(&log, "sub"), at_ms(5), TaskSourceGrade::Unspecified);
    queues.register_task(owner, recording_task(&log, "owner"), at_ms(5), TaskSourceGrade::Unspecified);

    drain_all(&queues, owner, at_ms(5));
    // Same time: the lower insertion order still wins across queues.
    assert_eq!(*log.lock(), vec!["sub", "owner"]);
}

#[test]
fn test_dispose_tasks_drops_without_running() {
    let queues = MessageLoopTaskQueues::new();
    let owner = queues.create_task_queue();
    let subsumed = queues.create_task_queue();
    let counter = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicBool::new(false));

    queues.register_task(owner, counting_task(&counter), at_ms(0), TaskSourceGrade::Unspecified);
    let flag = DropFlag(Arc::clone(&dropped));
    queues.register_task(
        subsumed,
        Box::new(move || drop(flag)),
        at_ms(0),
        TaskSourceGrade::DartEventLoop,
    );
    assert!(queues.merge(owner, subsumed));

    queues.dispose_tasks(owner);

    assert!(!queues.has_pending_tasks(owner));
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_dispose_unmerges_and_removes() {
    let queues = MessageLoopTaskQueues::new();
    let owner = queues.create_task_queue();
    let subsumed = queues.create_task_queue();
    let spy = SpyWakeable::new();
    queues.set_wakeable(subsumed, spy.as_weak());

    assert!(queues.merge(owner, subsumed));
    queues.register_task(subsumed, noop_task(), at_ms(2), TaskSourceGrade::Unspecified);

    queues.dispose(owner);

    assert!(!queues.contains(owner));
    assert_eq!(queues.num_task_queues(), 1);
    assert!(!queues.owns(subsumed, owner));
    assert!(queues.has_pending_tasks(subsumed));
    // Work handed back to the subsumed queue's own thread.
    assert_eq!(spy.last_call(), Some(at_ms(2)));
}

#[test]
fn test_dispose_detaches_from_owner() {
    let queues = MessageLoopTaskQueues::new();
    let owner = queues.create_task_queue();
    let subsumed = queues.create_task_queue();

    assert!(queues.merge(owner, subsumed));
    queues.dispose(subsumed);

    assert!(queues.get_subsumed_task_queue_id(owner).is_empty());
}

#[test]
fn test_dead_wakeable_is_ignored() {
    let queues = MessageLoopTaskQueues::new();
    let id = queues.create_task_queue();

    let spy = SpyWakeable::new();
    queues.set_wakeable(id, spy.as_weak());
    drop(spy);

    queues.register_task(id, noop_task(), at_ms(0), TaskSourceGrade::Unspecified);
    assert!(queues.get_next_task_to_run(id, at_ms(0)).is_some());
}

#[test]
fn test_ids_unique_across_registries() {
    let a = MessageLoopTaskQueues::new().create_task_queue();
    let b = MessageLoopTaskQueues::new().create_task_queue();
    assert_ne!(a, b);
}

#[test]
fn test_instance_is_shared() {
    let a = MessageLoopTaskQueues::instance();
    let b = MessageLoopTaskQueues::instance();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
#[should_panic(expected = "wakeable can only be set once")]
fn test_second_wakeable_panics() {
    let (queues, id, _spy) = queues_with_spy();
    let other = SpyWakeable::new();
    queues.set_wakeable(id, other.as_weak());
}

#[test]
#[should_panic(expected = "unknown task queue")]
fn test_unknown_queue_panics() {
    let queues = MessageLoopTaskQueues::new();
    let foreign = MessageLoopTaskQueues::new().create_task_queue();
    queues.register_task(foreign, noop_task(), at_ms(0), TaskSourceGrade::Unspecified);
}

#[test]
fn test_owns_with_unmerged_sentinel() {
    let queues = MessageLoopTaskQueues::new();
    let a = queues.create_task_queue();
    assert!(!queues.owns(a, TaskQueueId::UNMERGED));
    assert!(!queues.owns(TaskQueueId::UNMERGED, a));
}
