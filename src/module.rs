//! Module instances: named, typed nodes in the forwarding graph.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::sync::Arc;

use crate::batch::Batch;
use crate::class::ModuleClass;
use crate::constants::MODULE_NAME_LEN;
use crate::create_global_uid;
use crate::error::{ErrorCode, GraphError};
use crate::gate::{connect, disconnect, GateArray, Igate, Ogate};
use crate::namespace::{Namespace, NamespaceKind};
use crate::task::TaskHandle;
use crate::{constants::MAX_TASKS_PER_MODULE, worker::WorkerContext};

create_global_uid!(
    /// A runtime-unique identifier for a module instance, used only for
    /// logging/debug output — names, not ids, are the addressable key.
    pub ModuleId = MODULE_ID;
);

/// A strong, shared reference to a module. Both the namespace and
/// every upstream ogate hold one of these for as long as the edge or
/// registration is live.
pub type ModuleHandle = Arc<ModuleInstance>;

/// A named, typed node in the forwarding graph.
pub struct ModuleInstance {
    id: ModuleId,
    name: String,
    class: Arc<ModuleClass>,
    state: RefCell<Box<dyn Any + Send>>,
    igates: RefCell<GateArray<Igate>>,
    ogates: RefCell<GateArray<Ogate>>,
    tasks: RefCell<[Option<TaskHandle>; MAX_TASKS_PER_MODULE]>,
}

impl ModuleInstance {
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn class(&self) -> &Arc<ModuleClass> {
        &self.class
    }

    #[must_use]
    pub fn state(&self) -> Ref<'_, Box<dyn Any + Send>> {
        self.state.borrow()
    }

    #[must_use]
    pub fn state_mut(&self) -> RefMut<'_, Box<dyn Any + Send>> {
        self.state.borrow_mut()
    }

    #[must_use]
    pub fn ogates(&self) -> Ref<'_, GateArray<Ogate>> {
        self.ogates.borrow()
    }

    #[must_use]
    pub(crate) fn ogates_mut(&self) -> RefMut<'_, GateArray<Ogate>> {
        self.ogates.borrow_mut()
    }

    #[must_use]
    pub fn igates(&self) -> Ref<'_, GateArray<Igate>> {
        self.igates.borrow()
    }

    #[must_use]
    pub(crate) fn igates_mut(&self) -> RefMut<'_, GateArray<Igate>> {
        self.igates.borrow_mut()
    }

    #[must_use]
    pub(crate) fn tasks(&self) -> Ref<'_, [Option<TaskHandle>; MAX_TASKS_PER_MODULE]> {
        self.tasks.borrow()
    }

    #[must_use]
    pub(crate) fn tasks_mut(&self) -> RefMut<'_, [Option<TaskHandle>; MAX_TASKS_PER_MODULE]> {
        self.tasks.borrow_mut()
    }

    /// Pushes `batch` onto this module's ogate `idx` — the hot-path
    /// delivery call. A class's `process_batch`/`run_task`
    /// implementation calls this to forward or emit batches.
    pub fn push_batch(self: &Arc<Self>, idx: u16, batch: Batch, worker: &mut WorkerContext) {
        crate::gate::push_batch(self, idx, batch, worker);
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("class", &self.class.name())
            .finish_non_exhaustive()
    }
}

/// CamelCase -> snake_case: insert `_` before any uppercase letter
/// that immediately follows a lowercase letter, then lowercase
/// everything. An upper-run like "IP" in "MyIPChecksum" is *not*
/// split — only a lower-to-upper transition inserts a separator.
#[must_use]
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if let Some(p) = prev {
            if p.is_lowercase() && c.is_uppercase() {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
        prev = Some(c);
    }
    out
}

/// The module namespace: the in-process directory of live modules,
/// not scoped to any one module.
pub struct ModuleDirectory {
    namespace: Namespace<ModuleHandle>,
}

impl Default for ModuleDirectory {
    fn default() -> Self {
        Self {
            namespace: Namespace::new(),
        }
    }
}

impl ModuleDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a module of `class`, named `name` or a defaulted one.
    pub fn create_module(
        &self,
        name: Option<&str>,
        class: &Arc<ModuleClass>,
        arg: Box<dyn Any + Send>,
    ) -> Result<ModuleHandle, GraphError> {
        let resolved_name = match name {
            Some(n) => {
                if self.namespace.contains(NamespaceKind::Module, n) {
                    return Err(GraphError::new(
                        ErrorCode::EExist,
                        format!("module '{n}' already exists"),
                    ));
                }
                n.to_string()
            }
            None => self.default_name(class)?,
        };

        let module = Arc::new(ModuleInstance {
            id: ModuleId::gen(),
            name: resolved_name.clone(),
            class: Arc::clone(class),
            state: RefCell::new(Box::new(())),
            igates: RefCell::new(GateArray::new()),
            ogates: RefCell::new(GateArray::new()),
            tasks: RefCell::new(Default::default()),
        });

        if let Some(init) = class.init_hook() {
            if let Err(message) = init(&module, arg) {
                return Err(GraphError::new(ErrorCode::EInval, message));
            }
        }

        self.namespace
            .insert(NamespaceKind::Module, &resolved_name, Arc::clone(&module))?;

        tracing::info!(target: "modgraph::module", "created module '{resolved_name}'");
        Ok(module)
    }

    fn default_name(&self, class: &Arc<ModuleClass>) -> Result<String, GraphError> {
        let stem = class
            .default_instance_name()
            .map(ToString::to_string)
            .unwrap_or_else(|| camel_to_snake(class.name()));

        for i in 0u64.. {
            let candidate = format!("{stem}{i}");
            if candidate.len() > MODULE_NAME_LEN {
                return Err(GraphError::new(
                    ErrorCode::EInval,
                    format!("default module name '{candidate}' exceeds MODULE_NAME_LEN"),
                ));
            }
            if !self.namespace.contains(NamespaceKind::Module, &candidate) {
                return Ok(candidate);
            }
        }
        unreachable!("u64 suffix space exhausted")
    }

    /// Tears down `module`: `deinit`, disconnect every edge touching
    /// it, destroy its tasks, remove it from the namespace. Best-effort
    /// and infallible.
    pub fn destroy_module(&self, module: &ModuleHandle) {
        if let Some(deinit) = module.class().deinit_hook() {
            deinit(module);
        }

        for idx in module.igates().active_indices().collect::<Vec<_>>() {
            let Some(igate) = module.igates().get(idx).cloned() else {
                continue;
            };
            for ogate in igate.upstream_snapshot() {
                if let Some(owner) = ogate.owner() {
                    let _ = disconnect(&owner, ogate.idx());
                }
            }
        }

        for idx in module.ogates().active_indices().collect::<Vec<_>>() {
            let _ = disconnect(module, idx);
        }

        for slot in module.tasks_mut().iter_mut() {
            *slot = None;
        }

        self.namespace.remove(NamespaceKind::Module, module.name());
        tracing::info!(target: "modgraph::module", "destroyed module '{}'", module.name());
    }

    #[must_use]
    pub fn find_module(&self, name: &str) -> Option<ModuleHandle> {
        self.namespace.lookup(NamespaceKind::Module, name)
    }

    /// A paged snapshot of modules in namespace-iteration order.
    #[must_use]
    pub fn list_modules(&self, offset: usize, cap: usize) -> Vec<ModuleHandle> {
        self.namespace
            .snapshot(NamespaceKind::Module)
            .into_iter()
            .skip(offset)
            .take(cap)
            .collect()
    }

    #[must_use]
    pub fn num_modules(&self) -> usize {
        self.namespace.len(NamespaceKind::Module)
    }

    /// Connects `m_prev`'s ogate to `m_next`'s igate.
    pub fn connect(
        &self,
        m_prev: &ModuleHandle,
        ogate_idx: u16,
        m_next: &ModuleHandle,
        igate_idx: u16,
    ) -> Result<(), GraphError> {
        connect(m_prev, ogate_idx, m_next, igate_idx)
    }

    /// Disconnects `m_prev`'s ogate.
    pub fn disconnect(&self, m_prev: &ModuleHandle, ogate_idx: u16) -> Result<(), GraphError> {
        disconnect(m_prev, ogate_idx)
    }
}

/// The default sink hook: accounts the batch to the calling worker's
/// `silent_drops` counter and drops the packets.
pub fn deadend(ctx: &mut WorkerContext, batch: Batch) {
    ctx.record_silent_drops(batch.count() as u64);
    drop(batch);
}

#[cfg(test)]
mod tests {
    use super::camel_to_snake;

    #[test]
    fn acronym_runs_are_not_split() {
        assert_eq!(camel_to_snake("MyIPChecksum"), "my_ipchecksum");
        assert_eq!(camel_to_snake("IPChecksum"), "ipchecksum");
    }

    #[test]
    fn lower_to_upper_transitions_are_split() {
        assert_eq!(camel_to_snake("MyModule"), "my_module");
        assert_eq!(camel_to_snake("TcpFlowTracker"), "tcp_flow_tracker");
    }

    #[test]
    fn single_word_is_unchanged() {
        assert_eq!(camel_to_snake("Sink"), "sink");
    }
}
