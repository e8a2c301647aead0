//! Work-stealing, dependency-aware task scheduler.
//!
//! `Scheduler` owns the spawned worker threads and is driven from the thread that created it
//! (worker 0). `SchedulerCore` is the state shared with every worker; all task operations live
//! there and are reachable from a `Scheduler` through `Deref`.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use tracing::{debug, trace, warn};

use super::config::SchedulerConfig;
use super::error::SchedulerError;
use super::priority_queue::PriorityQueue;
use super::run_task_result::RunTaskResult;
use super::task::{TaskHandle, TaskSlot, TaskState};
use super::task_arena::TaskArena;
use super::worker::WorkerThread;

/// Snapshot of the scheduler's monotonic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Callbacks that have returned.
    pub tasks_executed: u64,
    /// Tasks taken from another worker's general queue.
    pub tasks_stolen: u64,
    /// `run_any_task` calls that found no work.
    pub empty_cycles: u64,
}

#[derive(Default)]
struct Counters {
    tasks_executed: AtomicU64,
    tasks_stolen: AtomicU64,
    empty_cycles: AtomicU64,
}

/// State shared by every worker thread of one scheduler.
pub struct SchedulerCore {
    workers: Box<[CachePadded<WorkerThread>]>,
    tasks: TaskArena,
    config: SchedulerConfig,
    counters: Counters,
}

/// Owner of a running task system.
///
/// Must be created, run, and shut down from the same thread, which acts as worker 0.
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    threads: Vec<JoinHandle<()>>,
    main_thread: ThreadId,
    stopped: bool,
}

impl Scheduler {
    /// Starts the task system.
    ///
    /// The calling thread becomes worker 0 without a new OS thread being spawned; workers
    /// `1..worker_count` each get a dedicated thread running the worker loop.
    ///
    /// # Arguments
    /// * `config` - Scheduler parameters. A `worker_count` of zero selects the logical core count.
    pub fn startup(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let worker_count = config.resolved_worker_count();
        let workers = (0..worker_count)
            .map(|worker_index| {
                CachePadded::new(WorkerThread::new(
                    worker_index,
                    config.max_priority,
                    config.queue_capacity,
                ))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let config = SchedulerConfig {
            worker_count,
            ..config
        };

        let core = Arc::new(SchedulerCore {
            workers,
            tasks: TaskArena::new(config.max_tasks),
            config,
            counters: Counters::default(),
        });
        core.workers[0].bind_current_thread();

        let mut scheduler = Self {
            core,
            threads: Vec::with_capacity(worker_count - 1),
            main_thread: thread::current().id(),
            stopped: false,
        };

        for worker_index in 1..worker_count {
            let core = Arc::clone(&scheduler.core);
            let name = format!("{}-{}", scheduler.core.config.thread_name_prefix, worker_index);
            // On failure the partially started scheduler is dropped, which joins what was spawned.
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || core.worker_loop(worker_index))
                .map_err(|source| SchedulerError::ThreadSpawn {
                    worker_index,
                    source,
                })?;
            scheduler.threads.push(handle);
        }

        debug!(
            worker_count,
            max_priority = scheduler.core.config.max_priority,
            queue_capacity = scheduler.core.config.queue_capacity,
            max_tasks = scheduler.core.config.max_tasks,
            "task scheduler started"
        );
        Ok(scheduler)
    }

    /// Gets the shared state, e.g. to hand to threads that want to schedule work.
    pub fn core(&self) -> &Arc<SchedulerCore> {
        &self.core
    }

    /// Runs worker 0's loop on the main thread until `interrupt_main_thread` is called.
    ///
    /// The interrupt is consumed on return, so `run` may be called again later to resume.
    pub fn run(&self) {
        self.assert_main_thread("run");
        let worker = &self.core.workers[0];
        while !worker.take_interrupt() {
            self.core.run_any_task(true);
        }
    }

    /// Interrupts every worker and joins the spawned threads.
    ///
    /// Tasks still sitting in queues are dropped without running.
    pub fn shutdown(mut self) {
        self.assert_main_thread("shutdown");
        self.stop_threads();
    }

    fn assert_main_thread(&self, operation: &str) {
        assert_eq!(
            thread::current().id(),
            self.main_thread,
            "Scheduler::{operation} must be called from the thread that started the scheduler."
        );
    }

    fn stop_threads(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        for worker in self.core.workers.iter() {
            worker.interrupt();
        }
        for (offset, handle) in self.threads.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(worker_index = offset + 1, "worker thread panicked");
            }
        }
        let dropped_tasks: usize = self
            .core
            .workers
            .iter()
            .map(|worker| {
                worker.affinity_queue().approximate_len() + worker.general_queue().approximate_len()
            })
            .sum();
        debug!(
            live_tasks = self.core.live_task_count(),
            dropped_tasks,
            "task scheduler shut down"
        );
    }
}

impl Deref for Scheduler {
    type Target = SchedulerCore;

    #[inline(always)]
    fn deref(&self) -> &SchedulerCore {
        &self.core
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

impl SchedulerCore {
    /// Gets the number of workers, including the main thread.
    #[inline(always)]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Gets the configuration the scheduler was started with, with the worker count resolved.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Gets a worker's record, e.g. to inspect its idle streak.
    pub fn worker(&self, worker_index: usize) -> Option<&WorkerThread> {
        self.workers.get(worker_index).map(|worker| &**worker)
    }

    /// Gets the index of the worker bound to the calling thread, if any.
    pub fn current_worker_index(&self) -> Option<usize> {
        let current = thread::current().id();
        self.workers
            .iter()
            .position(|worker| worker.is_bound_to(current))
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_executed: self.counters.tasks_executed.load(Ordering::Relaxed),
            tasks_stolen: self.counters.tasks_stolen.load(Ordering::Relaxed),
            empty_cycles: self.counters.empty_cycles.load(Ordering::Relaxed),
        }
    }

    /// Gets the number of tasks whose storage has not been freed yet.
    pub fn live_task_count(&self) -> usize {
        self.tasks.live_count()
    }

    /// Creates an unscheduled task holding one reference.
    ///
    /// The reference is released by the scheduler when the task completes. Callers that keep
    /// using the handle afterwards must `acquire` it first.
    ///
    /// # Arguments
    /// * `callback` - Work to run. Whatever it captures is the task's payload.
    pub fn initialize<F>(&self, callback: F) -> Result<TaskHandle, SchedulerError>
    where
        F: FnOnce(&SchedulerCore, TaskHandle) + Send + 'static,
    {
        self.tasks.allocate(Box::new(callback))
    }

    /// Sets the queue level a task is placed at. Higher priorities run first.
    pub fn set_priority(&self, task: TaskHandle, priority: usize) {
        let slot = self.unscheduled_slot(task, "set its priority");
        assert!(
            priority < self.config.max_priority,
            "Priority {priority} is out of range; the scheduler has {} levels.",
            self.config.max_priority
        );
        slot.set_priority(priority);
    }

    /// Pins a task to the worker with the given index.
    pub fn set_thread_affinity(&self, task: TaskHandle, worker_index: usize) {
        self.unscheduled_slot(task, "set its affinity")
            .set_affinity(Some(worker_index));
    }

    /// Makes `successor` ineligible to run until `task` completes.
    ///
    /// A task has at most one start edge, but many tasks may start the same successor.
    pub fn set_starts(&self, task: TaskHandle, successor: TaskHandle) {
        assert_ne!(task, successor, "{task:?} cannot start itself.");
        let slot = self.unscheduled_slot(task, "add a start edge");
        assert!(
            slot.to_start().is_none(),
            "{task:?} already starts another task."
        );
        let successor_slot = self.unscheduled_slot(successor, "gate it on a predecessor");
        successor_slot.add_start_dependency();
        successor_slot.acquire();
        slot.set_to_start(successor);
    }

    /// Defers `dependent`'s completion processing until `task` completes.
    ///
    /// A task has at most one finish edge, but many tasks may finish the same dependent.
    pub fn set_finishes(&self, task: TaskHandle, dependent: TaskHandle) {
        assert_ne!(task, dependent, "{task:?} cannot finish itself.");
        let slot = self.unscheduled_slot(task, "add a finish edge");
        assert!(
            slot.to_finish().is_none(),
            "{task:?} already finishes another task."
        );
        let dependent_slot = self.tasks.get(dependent);
        assert_ne!(
            dependent_slot.state(),
            TaskState::Done,
            "{dependent:?} has already completed."
        );
        assert!(
            dependent_slot.add_finish_dependency(),
            "{dependent:?} is already completing and cannot wait on another finisher."
        );
        dependent_slot.acquire();
        slot.set_to_finish(dependent);
    }

    /// Submits a task for execution.
    ///
    /// Does nothing while the task still waits on start predecessors; the last of them schedules
    /// it on completion. A full queue is retried, yielding between attempts, until it accepts the
    /// task.
    pub fn schedule(&self, task: TaskHandle) {
        let slot = self.tasks.get(task);
        if slot.start_count() > 0 {
            return;
        }

        let queue = self.resolve_queue(task, slot);
        assert!(
            slot.transition(TaskState::Unscheduled, TaskState::Scheduled),
            "{task:?} cannot be scheduled from state {:?}.",
            slot.state()
        );

        let priority = slot.priority();
        let mut pending = task;
        let mut attempts = 0u32;
        while let Err(rejected) = queue.enqueue(pending, priority) {
            if attempts == 0 {
                trace!(?task, priority, "queue full, retrying");
            }
            attempts += 1;
            pending = rejected;
            thread::yield_now();
        }
    }

    /// Adds a reference to a task so its handle stays valid past completion.
    pub fn acquire(&self, task: TaskHandle) {
        let previous = self.tasks.get(task).acquire();
        debug_assert!(previous > 0, "{task:?} was acquired after being freed.");
    }

    /// Drops a reference. The task's storage is freed when the last one goes.
    pub fn release(&self, task: TaskHandle) {
        let previous = self.tasks.get(task).release();
        assert!(previous > 0, "{task:?} was released more often than acquired.");
        if previous == 1 {
            self.tasks.free(task);
        }
    }

    /// Gets the state of a task. For diagnostics only; not a synchronization primitive.
    pub fn task_state(&self, task: TaskHandle) -> TaskState {
        self.tasks.get(task).state()
    }

    pub fn priority(&self, task: TaskHandle) -> usize {
        self.tasks.get(task).priority()
    }

    pub fn thread_affinity(&self, task: TaskHandle) -> Option<usize> {
        self.tasks.get(task).affinity()
    }

    /// Gets the number of predecessors `task` still waits on.
    pub fn start_count(&self, task: TaskHandle) -> u32 {
        self.tasks.get(task).start_count()
    }

    pub fn ref_count(&self, task: TaskHandle) -> u32 {
        self.tasks.get(task).ref_count()
    }

    /// Asks worker 0 to return from `Scheduler::run` after its current task.
    pub fn interrupt_main_thread(&self) {
        self.workers[0].interrupt();
    }

    /// Finds and runs at most one task, or registers an idle cycle.
    ///
    /// Looks at the caller's affinity queue, then its general queue, then steals from the general
    /// queue of the next worker in its rotation.
    ///
    /// # Arguments
    /// * `allow_waiting` - Whether an idle call may sleep according to the backoff curve.
    pub fn run_any_task(&self, allow_waiting: bool) -> RunTaskResult {
        let Some(worker_index) = self.current_worker_index() else {
            warn!(
                thread = ?thread::current().id(),
                "run_any_task called from a thread that is not a worker"
            );
            return RunTaskResult::Unregistered;
        };
        let worker = &self.workers[worker_index];

        let found = worker
            .affinity_queue()
            .dequeue()
            .or_else(|| worker.general_queue().dequeue())
            .or_else(|| self.steal(worker));

        match found {
            Some(task) => {
                self.execute(task, worker_index);
                worker.reset_misses();
                RunTaskResult::Ran
            }
            None => {
                self.counters.empty_cycles.fetch_add(1, Ordering::Relaxed);
                let misses = worker.record_miss();
                if allow_waiting {
                    if let Some(duration) = self.config.backoff.sleep_for(misses) {
                        thread::sleep(duration);
                    }
                }
                RunTaskResult::Empty
            }
        }
    }

    /// Runs tasks without sleeping until `budget` has elapsed. Returns the number of tasks run.
    ///
    /// Returns immediately when called from a thread that is not a worker.
    pub fn run_any_task_for_duration(&self, budget: Duration) -> usize {
        let start = Instant::now();
        let mut ran = 0;
        while start.elapsed() < budget {
            match self.run_any_task(false) {
                RunTaskResult::Ran => ran += 1,
                RunTaskResult::Empty => {}
                RunTaskResult::Unregistered => break,
            }
        }
        ran
    }

    fn worker_loop(&self, worker_index: usize) {
        let worker = &self.workers[worker_index];
        worker.bind_current_thread();
        debug!(worker_index, "worker thread started");
        while !worker.is_interrupted() {
            self.run_any_task(true);
        }
        debug!(worker_index, "worker thread stopped");
    }

    fn unscheduled_slot(&self, task: TaskHandle, action: &str) -> &TaskSlot {
        let slot = self.tasks.get(task);
        let state = slot.state();
        assert_eq!(
            state,
            TaskState::Unscheduled,
            "Cannot {action} on {task:?}: it is already {state:?}."
        );
        slot
    }

    /// Picks the queue a task goes to.
    ///
    /// Pinned tasks go to their worker's affinity queue. Everything else goes to the calling
    /// worker's general queue, or worker 0's when the caller is not a worker.
    fn resolve_queue(&self, task: TaskHandle, slot: &TaskSlot) -> &PriorityQueue<TaskHandle> {
        let caller = self.current_worker_index();
        if let Some(affinity) = slot.affinity() {
            if affinity < self.workers.len() {
                return self.workers[affinity].affinity_queue();
            }
            warn!(
                ?task,
                affinity,
                worker_count = self.workers.len(),
                caller = ?caller,
                "affinity names no worker, clearing it"
            );
            slot.set_affinity(None);
        }
        self.workers[caller.unwrap_or(0)].general_queue()
    }

    /// Tries the next victim in this worker's rotation. Affinity queues are never stolen from.
    fn steal(&self, thief: &WorkerThread) -> Option<TaskHandle> {
        let victim = thief.advance_victim(self.workers.len())?;
        let task = self.workers[victim].general_queue().dequeue()?;
        self.counters.tasks_stolen.fetch_add(1, Ordering::Relaxed);
        trace!(thief = thief.worker_index(), victim, ?task, "stole task");
        Some(task)
    }

    fn execute(&self, task: TaskHandle, worker_index: usize) {
        let slot = self.tasks.get(task);
        if let Some(affinity) = slot.affinity() {
            assert_eq!(
                affinity, worker_index,
                "{task:?} is pinned to worker {affinity} but was dequeued by worker {worker_index}."
            );
        }
        assert!(
            slot.transition(TaskState::Scheduled, TaskState::Running),
            "{task:?} was dequeued in state {:?}.",
            slot.state()
        );
        let Some(callback) = slot.take_callback() else {
            panic!("{task:?} has no callback to run.");
        };

        callback(self, task);
        self.counters.tasks_executed.fetch_add(1, Ordering::Relaxed);

        // Outstanding finishers keep the task Running; the last of them completes it.
        if slot.release_finish_token() {
            self.complete(task);
        }
    }

    /// Marks a task done and propagates along its edges.
    ///
    /// Finish chains are followed iteratively so arbitrarily long chains do not grow the stack.
    fn complete(&self, task: TaskHandle) {
        let mut current = task;
        loop {
            let slot = self.tasks.get(current);
            assert!(
                slot.transition(TaskState::Running, TaskState::Done),
                "{current:?} completed from state {:?}.",
                slot.state()
            );

            if let Some(successor) = slot.to_start() {
                if self.tasks.get(successor).complete_start_dependency() {
                    self.schedule(successor);
                }
                self.release(successor);
            }

            let next = slot.to_finish().and_then(|dependent| {
                let ready = self.tasks.get(dependent).release_finish_token();
                // The dependent's own in-flight reference keeps it alive past this release.
                self.release(dependent);
                ready.then_some(dependent)
            });

            self.release(current);
            match next {
                Some(dependent) => current = dependent,
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::task_scheduling::config::BackoffConfig;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn single_worker() -> Scheduler {
        Scheduler::startup(
            SchedulerConfig::default()
                .with_worker_count(1)
                .with_backoff(BackoffConfig::disabled()),
        )
        .unwrap()
    }

    fn drain(scheduler: &Scheduler) {
        while scheduler.run_any_task(false).ran() {}
    }

    #[test]
    fn test_startup_rejects_invalid_config() {
        let result = Scheduler::startup(SchedulerConfig::default().with_max_priority(0));
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_runs_scheduled_task_once() {
        let scheduler = single_worker();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let task = scheduler
            .initialize(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        scheduler.acquire(task);
        assert_eq!(scheduler.task_state(task), TaskState::Unscheduled);

        scheduler.schedule(task);
        assert_eq!(scheduler.task_state(task), TaskState::Scheduled);
        assert_eq!(scheduler.run_any_task(false), RunTaskResult::Ran);
        assert_eq!(scheduler.run_any_task(false), RunTaskResult::Empty);
        assert_eq!(scheduler.worker(0).unwrap().misses(), 1);
        assert!(scheduler.worker(1).is_none());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.task_state(task), TaskState::Done);
        assert_eq!(scheduler.ref_count(task), 1);
        scheduler.release(task);
        assert_eq!(scheduler.live_task_count(), 0);
        scheduler.shutdown();
    }

    #[test]
    fn test_priority_order_on_one_worker() {
        let scheduler = single_worker();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, priority) in [("a", 0), ("b", 3), ("c", 1), ("d", 3)] {
            let order = order.clone();
            let task = scheduler
                .initialize(move |_, _| order.lock().unwrap().push(label))
                .unwrap();
            scheduler.set_priority(task, priority);
            scheduler.schedule(task);
        }
        drain(&scheduler);
        assert_eq!(*order.lock().unwrap(), vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn test_start_edge_schedules_successor() {
        let scheduler = single_worker();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first_order = order.clone();
        let second_order = order.clone();
        let first = scheduler
            .initialize(move |_, _| first_order.lock().unwrap().push("first"))
            .unwrap();
        let second = scheduler
            .initialize(move |_, _| second_order.lock().unwrap().push("second"))
            .unwrap();
        scheduler.acquire(second);
        scheduler.set_starts(first, second);
        assert_eq!(scheduler.start_count(second), 1);
        assert_eq!(scheduler.ref_count(second), 3);

        // Gated: a direct schedule is ignored.
        scheduler.schedule(second);
        assert_eq!(scheduler.task_state(second), TaskState::Unscheduled);

        scheduler.schedule(first);
        assert!(scheduler.run_any_task(false).ran());
        assert_eq!(scheduler.task_state(second), TaskState::Scheduled);
        assert_eq!(scheduler.start_count(second), 0);

        drain(&scheduler);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(scheduler.task_state(second), TaskState::Done);
        scheduler.release(second);
        assert_eq!(scheduler.live_task_count(), 0);
    }

    #[test]
    fn test_finish_edge_holds_dependent_running() {
        let scheduler = single_worker();
        let parent = scheduler.initialize(|_, _| {}).unwrap();
        let child = scheduler.initialize(|_, _| {}).unwrap();
        scheduler.acquire(parent);
        scheduler.set_finishes(child, parent);

        scheduler.schedule(parent);
        assert!(scheduler.run_any_task(false).ran());
        assert_eq!(scheduler.task_state(parent), TaskState::Running);

        scheduler.schedule(child);
        assert!(scheduler.run_any_task(false).ran());
        assert_eq!(scheduler.task_state(parent), TaskState::Done);
        scheduler.release(parent);
        assert_eq!(scheduler.live_task_count(), 0);
    }

    #[test]
    fn test_finisher_completing_first_does_not_complete_dependent_early() {
        let scheduler = single_worker();
        let parent = scheduler.initialize(|_, _| {}).unwrap();
        let child = scheduler.initialize(|_, _| {}).unwrap();
        scheduler.acquire(parent);
        scheduler.set_finishes(child, parent);

        scheduler.schedule(child);
        assert!(scheduler.run_any_task(false).ran());
        assert_eq!(scheduler.task_state(parent), TaskState::Unscheduled);

        scheduler.schedule(parent);
        assert!(scheduler.run_any_task(false).ran());
        assert_eq!(scheduler.task_state(parent), TaskState::Done);
        scheduler.release(parent);
    }

    #[test]
    fn test_long_finish_chain_completes_iteratively() {
        let scheduler = Scheduler::startup(
            SchedulerConfig::default()
                .with_worker_count(1)
                .with_queue_capacity(16_384)
                .with_backoff(BackoffConfig::disabled()),
        )
        .unwrap();
        let tasks: Vec<_> = (0..10_000)
            .map(|_| scheduler.initialize(|_, _| {}).unwrap())
            .collect();
        for pair in tasks.windows(2) {
            scheduler.set_finishes(pair[1], pair[0]);
        }
        let head = tasks[0];
        scheduler.acquire(head);
        // Schedule from the dependent end so every task is Running before the tail completes.
        for &task in &tasks {
            scheduler.schedule(task);
        }
        drain(&scheduler);
        assert_eq!(scheduler.task_state(head), TaskState::Done);
        scheduler.release(head);
        assert_eq!(scheduler.live_task_count(), 0);
    }

    #[test]
    fn test_callback_can_schedule_more_work() {
        let scheduler = single_worker();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let task = scheduler
            .initialize(move |core, _| {
                let counter = counter.clone();
                let nested = core
                    .initialize(move |_, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                core.schedule(nested);
            })
            .unwrap();
        scheduler.schedule(task);
        drain(&scheduler);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_out_of_range_affinity_is_cleared() {
        let scheduler = single_worker();
        let task = scheduler.initialize(|_, _| {}).unwrap();
        scheduler.acquire(task);
        scheduler.set_thread_affinity(task, 7);
        scheduler.schedule(task);
        assert_eq!(scheduler.thread_affinity(task), None);
        drain(&scheduler);
        assert_eq!(scheduler.task_state(task), TaskState::Done);
        scheduler.release(task);
    }

    #[test]
    fn test_unregistered_thread_is_ignored() {
        let scheduler = single_worker();
        let core = Arc::clone(scheduler.core());
        let result = thread::spawn(move || {
            let result = core.run_any_task(true);
            (result, core.run_any_task_for_duration(Duration::from_millis(5)))
        })
        .join()
        .unwrap();
        assert_eq!(result, (RunTaskResult::Unregistered, 0));
    }

    #[test]
    fn test_run_returns_after_interrupt() {
        let scheduler = single_worker();
        let task = scheduler
            .initialize(|core, _| core.interrupt_main_thread())
            .unwrap();
        scheduler.schedule(task);
        scheduler.run();
        assert_eq!(scheduler.stats().tasks_executed, 1);

        // The interrupt was consumed; run can resume.
        let task = scheduler
            .initialize(|core, _| core.interrupt_main_thread())
            .unwrap();
        scheduler.schedule(task);
        scheduler.run();
        assert_eq!(scheduler.stats().tasks_executed, 2);
        scheduler.shutdown();
    }

    #[test]
    #[should_panic(expected = "cannot start itself")]
    fn test_self_start_edge_panics() {
        let scheduler = single_worker();
        let task = scheduler.initialize(|_, _| {}).unwrap();
        scheduler.set_starts(task, task);
    }

    #[test]
    #[should_panic(expected = "cannot finish itself")]
    fn test_self_finish_edge_panics() {
        let scheduler = single_worker();
        let task = scheduler.initialize(|_, _| {}).unwrap();
        scheduler.set_finishes(task, task);
    }

    #[test]
    #[should_panic(expected = "already completing")]
    fn test_finish_edge_onto_completing_dependent_panics() {
        let scheduler = single_worker();
        let dependent = scheduler.initialize(|_, _| {}).unwrap();
        let finisher = scheduler.initialize(|_, _| {}).unwrap();
        // The dependent's last finish token is gone but it has not reached Done yet.
        assert!(scheduler.tasks.get(dependent).release_finish_token());
        assert_eq!(scheduler.task_state(dependent), TaskState::Unscheduled);
        scheduler.set_finishes(finisher, dependent);
    }

    #[test]
    fn test_idle_backoff_sleeps_only_when_waiting_is_allowed() {
        let scheduler = Scheduler::startup(
            SchedulerConfig::default()
                .with_worker_count(1)
                .with_backoff(BackoffConfig {
                    miss_threshold: 0,
                    max_misses: 1,
                    sleep_unit: Duration::from_millis(10),
                }),
        )
        .unwrap();
        let worker = scheduler.worker(0).unwrap();

        let started = Instant::now();
        assert_eq!(scheduler.run_any_task(false), RunTaskResult::Empty);
        assert!(started.elapsed() < Duration::from_millis(5));
        assert_eq!(worker.misses(), 1);

        let started = Instant::now();
        assert_eq!(scheduler.run_any_task(true), RunTaskResult::Empty);
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(worker.misses(), 2);

        let task = scheduler.initialize(|_, _| {}).unwrap();
        scheduler.schedule(task);
        assert_eq!(scheduler.run_any_task(true), RunTaskResult::Ran);
        assert_eq!(worker.misses(), 0);

        // Streak restarted: the next idle call is the first miss again.
        assert_eq!(scheduler.run_any_task(false), RunTaskResult::Empty);
        assert_eq!(worker.misses(), 1);
        scheduler.shutdown();
    }

    #[test]
    #[should_panic(expected = "already Scheduled")]
    fn test_configuring_scheduled_task_panics() {
        let scheduler = single_worker();
        let task = scheduler.initialize(|_, _| {}).unwrap();
        scheduler.schedule(task);
        scheduler.set_priority(task, 1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_priority_out_of_range_panics() {
        let scheduler = single_worker();
        let task = scheduler.initialize(|_, _| {}).unwrap();
        scheduler.set_priority(task, 4);
    }

    #[test]
    fn test_shutdown_drops_queued_tasks_without_running_them() {
        let scheduler = single_worker();
        let payload = Arc::new(());
        let captured = payload.clone();
        let task = scheduler
            .initialize(move |_, _| panic!("queued task ran after shutdown: {captured:?}"))
            .unwrap();
        scheduler.schedule(task);
        assert_eq!(Arc::strong_count(&payload), 2);
        scheduler.shutdown();
        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn test_release_frees_unscheduled_task_and_payload() {
        let scheduler = single_worker();
        let payload = Arc::new(());
        let captured = payload.clone();
        let task = scheduler.initialize(move |_, _| drop(captured)).unwrap();
        assert_eq!(Arc::strong_count(&payload), 2);
        scheduler.release(task);
        assert_eq!(Arc::strong_count(&payload), 1);
        assert_eq!(scheduler.live_task_count(), 0);
    }
}
