//! Module classes: immutable, process-wide descriptors of a kind of
//! module.
//!
//! A class is a vtable of function pointers plus compile-time
//! gate-count metadata, kept deliberately as plain `Option<fn(..)>`
//! fields rather than a trait object — it is what makes `connect`'s
//! "class has no `process_batch`" and `register_task`'s "class has no
//! `run_task`" checks a plain `Option::is_none()`. Per-instance state
//! is a typed, boxed `Any` rather than a raw byte blob.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use fxhash::FxHashMap;

use crate::error::{ErrorCode, GraphError};
use crate::module::ModuleHandle;
use crate::worker::WorkerContext;

/// Opaque per-instance state. Classes downcast this to their own type.
pub type ModuleState = dyn Any + Send;

/// Runs once, right after a module is allocated and before it is
/// inserted into the namespace. Returning `Err` aborts `create_module`.
pub type InitFn = fn(&ModuleHandle, Box<dyn Any + Send>) -> Result<(), String>;

/// Runs once during `destroy_module`, before any gate is disconnected.
pub type DeinitFn = fn(&ModuleHandle);

/// The hot-path entry point: takes ownership of a batch delivered on
/// one of this module's igates. Receives the calling worker's context
/// so it can forward batches, record silent drops, or extend a trace
/// without reaching for ambient global state.
pub type ProcessBatchFn = fn(&ModuleHandle, crate::batch::Batch, &mut WorkerContext);

/// Invoked by the external scheduler for a registered task, with the
/// opaque argument passed to `register_task` and the calling worker's
/// context.
pub type RunTaskFn = fn(&ModuleHandle, &(dyn Any + Send), &mut WorkerContext);

/// An immutable, process-wide descriptor for a kind of module.
pub struct ModuleClass {
    name: String,
    default_instance_name: Option<String>,
    num_igates: u16,
    num_ogates: u16,
    init: Option<InitFn>,
    deinit: Option<DeinitFn>,
    process_batch: Option<ProcessBatchFn>,
    run_task: Option<RunTaskFn>,
}

impl ModuleClass {
    /// Starts building a class descriptor named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ModuleClassBuilder {
        ModuleClassBuilder {
            name: name.into(),
            default_instance_name: None,
            num_igates: 0,
            num_ogates: 0,
            init: None,
            deinit: None,
            process_batch: None,
            run_task: None,
        }
    }

    /// The class name, e.g. `"IPChecksum"`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn default_instance_name(&self) -> Option<&str> {
        self.default_instance_name.as_deref()
    }

    #[must_use]
    pub fn num_igates(&self) -> u16 {
        self.num_igates
    }

    #[must_use]
    pub fn num_ogates(&self) -> u16 {
        self.num_ogates
    }

    #[must_use]
    pub fn has_process_batch(&self) -> bool {
        self.process_batch.is_some()
    }

    #[must_use]
    pub fn has_run_task(&self) -> bool {
        self.run_task.is_some()
    }

    pub(crate) fn init_hook(&self) -> Option<InitFn> {
        self.init
    }

    pub(crate) fn deinit_hook(&self) -> Option<DeinitFn> {
        self.deinit
    }

    pub(crate) fn process_batch_hook(&self) -> Option<ProcessBatchFn> {
        self.process_batch
    }

    pub(crate) fn run_task_hook(&self) -> Option<RunTaskFn> {
        self.run_task
    }
}

impl fmt::Debug for ModuleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleClass")
            .field("name", &self.name)
            .field("num_igates", &self.num_igates)
            .field("num_ogates", &self.num_ogates)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ModuleClass`] descriptors, used once at startup.
pub struct ModuleClassBuilder {
    name: String,
    default_instance_name: Option<String>,
    num_igates: u16,
    num_ogates: u16,
    init: Option<InitFn>,
    deinit: Option<DeinitFn>,
    process_batch: Option<ProcessBatchFn>,
    run_task: Option<RunTaskFn>,
}

impl ModuleClassBuilder {
    #[must_use]
    pub fn default_instance_name(mut self, name: impl Into<String>) -> Self {
        self.default_instance_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn gates(mut self, num_igates: u16, num_ogates: u16) -> Self {
        self.num_igates = num_igates;
        self.num_ogates = num_ogates;
        self
    }

    #[must_use]
    pub fn init(mut self, f: InitFn) -> Self {
        self.init = Some(f);
        self
    }

    #[must_use]
    pub fn deinit(mut self, f: DeinitFn) -> Self {
        self.deinit = Some(f);
        self
    }

    #[must_use]
    pub fn process_batch(mut self, f: ProcessBatchFn) -> Self {
        self.process_batch = Some(f);
        self
    }

    #[must_use]
    pub fn run_task(mut self, f: RunTaskFn) -> Self {
        self.run_task = Some(f);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<ModuleClass> {
        Arc::new(ModuleClass {
            name: self.name,
            default_instance_name: self.default_instance_name,
            num_igates: self.num_igates,
            num_ogates: self.num_ogates,
            init: self.init,
            deinit: self.deinit,
            process_batch: self.process_batch,
            run_task: self.run_task,
        })
    }
}

/// The catalogue of module kinds available to `create_module`.
///
/// Classes are registered once at startup and never removed or
/// mutated afterward — `ModuleClass` itself has no interior mutability,
/// so an `Arc<ModuleClass>` handed out by this registry is safe to hold
/// onto for the life of the process.
#[derive(Default)]
pub struct ClassRegistry {
    classes: FxHashMap<String, Arc<ModuleClass>>,
}

impl ClassRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class, failing if the name is already taken.
    pub fn register(&mut self, class: Arc<ModuleClass>) -> Result<(), GraphError> {
        if self.classes.contains_key(class.name()) {
            return Err(GraphError::new(
                ErrorCode::EExist,
                format!("module class '{}' already registered", class.name()),
            ));
        }
        self.classes.insert(class.name().to_string(), class);
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<ModuleClass>> {
        self.classes.get(name).cloned()
    }
}
