//! Work-stealing, dependency-aware task scheduler for per-frame engine work.
//!
//! Worker 0 is the thread that starts the scheduler; it drives work through `Scheduler::run`
//! or by calling `run_any_task` from its own frame loop. The remaining workers run on dedicated
//! threads and steal from each other's general queues when idle.
//!
//! # Examples
//! ```
//! use rust_task_scheduler::{Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::startup(SchedulerConfig::default().with_worker_count(2)).unwrap();
//! let simulate = scheduler.initialize(|_, _| println!("simulated")).unwrap();
//! let render = scheduler.initialize(|_, _| println!("rendered")).unwrap();
//! // `render` becomes eligible once `simulate` completes.
//! scheduler.set_starts(simulate, render);
//!
//! scheduler.acquire(render);
//! scheduler.schedule(simulate);
//! while scheduler.task_state(render) != rust_task_scheduler::TaskState::Done {
//!     scheduler.run_any_task(false);
//! }
//! scheduler.release(render);
//! scheduler.shutdown();
//! ```

pub mod utilities;

pub use utilities::task_scheduling::*;
