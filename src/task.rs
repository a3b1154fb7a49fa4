//! Task registration: binding a module's `run_task` hook into slots an
//! external scheduler drives.
//!
//! This crate does not implement a scheduler — there is no run loop,
//! no timer wheel, no core-pinning here. `TaskScheduler` is the seam a
//! host program implements; this module only owns slot allocation and
//! the opaque argument a task carries.

use std::any::Any;
use std::sync::{Arc, Weak};

use crate::class::RunTaskFn;
use crate::create_global_uid;
use crate::error::{ErrorCode, GraphError};
use crate::module::{ModuleHandle, ModuleInstance};
use crate::worker::WorkerContext;

create_global_uid!(
    /// Identifies a registered task slot, independent of which module
    /// or slot index it lives in.
    pub TaskId = TASK_ID;
);

/// A registered task: a module, its cached `run_task` entry, and the
/// opaque argument the scheduler passes back on every invocation.
pub struct TaskInstance {
    id: TaskId,
    owner: Weak<ModuleInstance>,
    slot: usize,
    entry: RunTaskFn,
    arg: Box<dyn Any + Send>,
}

/// A strong, shared reference to a registered task. The owning module's
/// task-slot array is what keeps it alive; a scheduler holding one of
/// these beyond the module's teardown sees `owner()` return `None`.
pub type TaskHandle = Arc<TaskInstance>;

impl TaskInstance {
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> Option<ModuleHandle> {
        self.owner.upgrade()
    }

    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Invokes the module's `run_task` hook with the stored argument.
    /// A no-op if the owning module has since been torn down.
    ///
    /// Brackets the call with `CallStackTrace::start`/`end` so the
    /// trace buffer is flushed and reset between runs rather than
    /// accumulating across every task invocation.
    pub fn run(&self, worker: &mut WorkerContext) {
        if let Some(owner) = self.owner() {
            if let Some(trace) = worker.trace_mut() {
                trace.start(owner.name(), "task");
            }
            (self.entry)(&owner, self.arg.as_ref(), worker);
            if let Some(trace) = worker.trace_mut() {
                trace.end(true);
            }
        }
    }
}

/// The collaborator a host program implements to actually run tasks.
/// This crate only allocates slots; scheduling policy lives entirely
/// on the other side of this trait.
pub trait TaskScheduler {
    /// Called once after a task is registered, so the scheduler can add
    /// it to whatever run queue or timer wheel it maintains.
    fn on_register(&mut self, task: &TaskHandle);

    /// Called once before a task's slot is cleared, so the scheduler
    /// can remove it from its run queue.
    fn on_unregister(&mut self, task: &TaskHandle);
}

/// Registers `m`'s `run_task` hook into the first free task slot,
/// carrying `arg` as the opaque argument passed on every invocation.
///
/// Fails `EInval` if the module's class has no `run_task` hook, and
/// `ENoMem` if every slot is already occupied
/// (`MAX_TASKS_PER_MODULE`).
pub fn register_task(
    m: &ModuleHandle,
    arg: Box<dyn Any + Send>,
    scheduler: &mut dyn TaskScheduler,
) -> Result<TaskHandle, GraphError> {
    let entry = m.class().run_task_hook().ok_or_else(|| {
        GraphError::new(
            ErrorCode::EInval,
            format!("class '{}' has no run_task", m.class().name()),
        )
    })?;

    let mut tasks = m.tasks_mut();
    let slot = tasks
        .iter()
        .position(Option::is_none)
        .ok_or_else(|| GraphError::new(ErrorCode::ENoMem, "no free task slot on module"))?;

    let task = Arc::new(TaskInstance {
        id: TaskId::gen(),
        owner: Arc::downgrade(m),
        slot,
        entry,
        arg,
    });
    tasks[slot] = Some(Arc::clone(&task));
    drop(tasks);

    scheduler.on_register(&task);
    tracing::debug!(
        target: "modgraph::task",
        "registered task {} on '{}' slot {slot}",
        task.id(),
        m.name(),
    );
    Ok(task)
}

/// Clears `task`'s slot on its owning module, if still live, and
/// notifies `scheduler` first so it can drop the task from its run
/// queue before the handle goes away.
pub fn unregister_task(task: &TaskHandle, scheduler: &mut dyn TaskScheduler) {
    scheduler.on_unregister(task);
    if let Some(owner) = task.owner() {
        owner.tasks_mut()[task.slot()] = None;
    }
}

/// The [`TaskId`] of a still-live task handle.
#[must_use]
pub fn task_to_tid(task: &TaskHandle) -> TaskId {
    task.id()
}

/// The number of occupied task slots on `m`, out of
/// [`MAX_TASKS_PER_MODULE`].
#[must_use]
pub fn num_module_tasks(m: &ModuleHandle) -> usize {
    m.tasks().iter().filter(|slot| slot.is_some()).count()
}
