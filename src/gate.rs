//! The gate fabric: typed directed edges between modules.
//!
//! Cyclic references between gates are the hard part here. This module
//! uses reference-counted handles both ways: an `Ogate` holds a strong
//! `Arc` to its downstream `Igate` (and, cached alongside it, the
//! downstream module and entry function, so the hot path never has to
//! chase the `Igate` to find them); an `Igate` holds its upstream
//! ogates by `Arc` in an unordered `Vec`. Neither side owns the other —
//! the owning module's gate array is what keeps a gate alive at all; an
//! edge just adds more owners.

use std::cell::RefCell;
use std::path::Path;
use std::sync::{Arc, Weak};

use crate::batch::Batch;
use crate::class::ProcessBatchFn;
use crate::constants::MAX_GATES;
use crate::diagnostics::pcap::PcapSink;
use crate::error::{DiagnosticsError, ErrorCode, GraphError};
use crate::module::ModuleInstance;
use crate::worker::WorkerContext;

/// An output-side gate. Active for as long as it is installed in its
/// owning module's ogate array.
pub struct Ogate {
    idx: u16,
    owner: Weak<ModuleInstance>,
    downstream_igate: Arc<Igate>,
    downstream_module: Arc<ModuleInstance>,
    downstream_idx: u16,
    entry: ProcessBatchFn,
    pub(crate) pcap: RefCell<Option<PcapSink>>,
}

impl Ogate {
    #[must_use]
    pub fn idx(&self) -> u16 {
        self.idx
    }

    #[must_use]
    pub fn owner(&self) -> Option<Arc<ModuleInstance>> {
        self.owner.upgrade()
    }

    #[must_use]
    pub fn downstream_module(&self) -> &Arc<ModuleInstance> {
        &self.downstream_module
    }

    #[must_use]
    pub fn downstream_idx(&self) -> u16 {
        self.downstream_idx
    }

    #[must_use]
    pub(crate) fn downstream_igate(&self) -> &Arc<Igate> {
        &self.downstream_igate
    }

    #[must_use]
    pub(crate) fn entry(&self) -> ProcessBatchFn {
        self.entry
    }

    #[must_use]
    pub fn tcpdump_enabled(&self) -> bool {
        self.pcap.borrow().is_some()
    }
}

/// An input-side gate. Stays live as long as its upstream set is
/// non-empty; the last disconnect destroys it.
pub struct Igate {
    idx: u16,
    owner: Weak<ModuleInstance>,
    entry: ProcessBatchFn,
    upstream: RefCell<Vec<Arc<Ogate>>>,
}

impl Igate {
    #[must_use]
    pub fn idx(&self) -> u16 {
        self.idx
    }

    #[must_use]
    pub fn owner(&self) -> Option<Arc<ModuleInstance>> {
        self.owner.upgrade()
    }

    #[must_use]
    pub(crate) fn entry(&self) -> ProcessBatchFn {
        self.entry
    }

    #[must_use]
    pub fn upstream_len(&self) -> usize {
        self.upstream.borrow().len()
    }

    #[must_use]
    pub fn upstream_snapshot(&self) -> Vec<Arc<Ogate>> {
        self.upstream.borrow().clone()
    }

    fn push_upstream(&self, ogate: Arc<Ogate>) {
        self.upstream.borrow_mut().push(ogate);
    }

    /// Removes `ogate` from the upstream set by pointer identity.
    /// Returns whether the set is now empty.
    fn remove_upstream(&self, ogate: &Arc<Ogate>) -> bool {
        let mut upstream = self.upstream.borrow_mut();
        upstream.retain(|o| !Arc::ptr_eq(o, ogate));
        upstream.is_empty()
    }
}

/// A growable array of gate slots, indexed by `gate_idx`.
///
/// Growth doubles from size 1 until the array holds more than
/// `gate_idx` slots, capped at [`MAX_GATES`]. New slots are empty.
pub struct GateArray<T> {
    slots: Vec<Option<Arc<T>>>,
}

impl<T> Default for GateArray<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> GateArray<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ensure_capacity(&mut self, idx: u16) -> Result<(), GraphError> {
        let idx = idx as usize;
        if self.slots.len() > idx {
            return Ok(());
        }
        let mut new_len = self.slots.len().max(1);
        while new_len <= idx && new_len < MAX_GATES {
            new_len = (new_len * 2).min(MAX_GATES);
        }
        if new_len <= idx {
            return Err(GraphError::new(
                ErrorCode::ENoMem,
                "gate array cannot grow to the requested index",
            ));
        }
        self.slots.resize_with(new_len, || None);
        Ok(())
    }

    #[must_use]
    pub fn is_active(&self, idx: u16) -> bool {
        self.slots
            .get(idx as usize)
            .map(Option::is_some)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn get(&self, idx: u16) -> Option<&Arc<T>> {
        self.slots.get(idx as usize).and_then(Option::as_ref)
    }

    pub(crate) fn set(&mut self, idx: u16, value: Option<Arc<T>>) {
        self.slots[idx as usize] = value;
    }

    /// All active slots, for teardown and iteration.
    pub fn active_indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.is_some().then_some(i as u16))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A free function over any gate array, so it reads the same at an
/// igate or ogate call site.
#[must_use]
pub fn is_active_gate<T>(gates: &GateArray<T>, idx: u16) -> bool {
    gates.is_active(idx)
}

/// Connects `m_prev`'s ogate `ogate_idx` to `m_next`'s igate `igate_idx`.
/// Preconditions are checked in a fixed order; the first failure is
/// returned.
pub fn connect(
    m_prev: &Arc<ModuleInstance>,
    ogate_idx: u16,
    m_next: &Arc<ModuleInstance>,
    igate_idx: u16,
) -> Result<(), GraphError> {
    let entry = m_next.class().process_batch_hook().ok_or_else(|| {
        GraphError::new(
            ErrorCode::EInval,
            format!("class '{}' has no process_batch", m_next.class().name()),
        )
    })?;

    if ogate_idx as usize >= m_prev.class().num_ogates() as usize || ogate_idx as usize >= MAX_GATES
    {
        return Err(GraphError::new(ErrorCode::EInval, "ogate_idx out of range"));
    }
    if igate_idx as usize >= m_next.class().num_igates() as usize || igate_idx as usize >= MAX_GATES
    {
        return Err(GraphError::new(ErrorCode::EInval, "igate_idx out of range"));
    }

    {
        let mut ogates = m_prev.ogates_mut();
        ogates.ensure_capacity(ogate_idx)?;
        if ogates.is_active(ogate_idx) {
            return Err(GraphError::new(
                ErrorCode::EBusy,
                format!("ogate {ogate_idx} is already connected"),
            ));
        }
    }
    m_next.igates_mut().ensure_capacity(igate_idx)?;

    let existing_igate = m_next.igates().get(igate_idx).cloned();
    let igate = match existing_igate {
        Some(igate) => igate,
        None => {
            let igate = Arc::new(Igate {
                idx: igate_idx,
                owner: Arc::downgrade(m_next),
                entry,
                upstream: RefCell::new(Vec::new()),
            });
            m_next.igates_mut().set(igate_idx, Some(Arc::clone(&igate)));
            igate
        }
    };

    let ogate = Arc::new(Ogate {
        idx: ogate_idx,
        owner: Arc::downgrade(m_prev),
        downstream_igate: Arc::clone(&igate),
        downstream_module: Arc::clone(m_next),
        downstream_idx: igate_idx,
        entry,
        pcap: RefCell::new(None),
    });

    igate.push_upstream(Arc::clone(&ogate));
    m_prev.ogates_mut().set(ogate_idx, Some(ogate));

    tracing::debug!(
        target: "modgraph::gate",
        "connected {}:{ogate_idx} -> {}:{igate_idx}",
        m_prev.name(),
        m_next.name(),
    );
    Ok(())
}

/// Disconnects `m_prev`'s ogate `ogate_idx`.
///
/// An inactive slot is a no-op success: disconnecting twice is not an
/// error.
pub fn disconnect(m_prev: &Arc<ModuleInstance>, ogate_idx: u16) -> Result<(), GraphError> {
    if ogate_idx as usize >= m_prev.class().num_ogates() as usize {
        return Err(GraphError::new(ErrorCode::EInval, "ogate_idx out of range"));
    }

    let ogate = match m_prev.ogates().get(ogate_idx) {
        Some(ogate) => Arc::clone(ogate),
        None => return Ok(()),
    };

    let igate = Arc::clone(ogate.downstream_igate());
    let now_empty = igate.remove_upstream(&ogate);
    if now_empty {
        if let Some(owner) = igate.owner() {
            owner.igates_mut().set(igate.idx(), None);
        }
    }

    m_prev.ogates_mut().set(ogate_idx, None);

    tracing::debug!(
        target: "modgraph::gate",
        "disconnected {}:{ogate_idx}",
        m_prev.name(),
    );
    Ok(())
}

/// Delivers `batch` across `m_prev`'s ogate `ogate_idx`: an inactive
/// ogate is a silent drop, otherwise a pcap snapshot (if capture is
/// enabled) followed by a direct call into the downstream module's
/// cached `process_batch` entry point. There is no queueing here; this
/// call *is* the delivery.
pub fn push_batch(
    m_prev: &Arc<ModuleInstance>,
    ogate_idx: u16,
    batch: Batch,
    worker: &mut WorkerContext,
) {
    let Some(ogate) = m_prev.ogates().get(ogate_idx).cloned() else {
        tracing::trace!(
            target: "modgraph::gate",
            "dropped batch of {} on inactive ogate {}:{ogate_idx}",
            batch.count(),
            m_prev.name(),
        );
        worker.record_silent_drops(batch.count() as u64);
        drop(batch);
        return;
    };

    let mut pcap = ogate.pcap.borrow_mut();
    if let Some(sink) = pcap.as_mut() {
        for packet in batch.packets() {
            if let Err(err) = sink.write_packet(packet.bytes()) {
                if PcapSink::is_broken_pipe(&err) {
                    tracing::warn!(
                        target: "modgraph::pcap",
                        "capture pipe on {}:{ogate_idx} closed, disabling",
                        m_prev.name(),
                    );
                    *pcap = None;
                } else {
                    tracing::warn!(
                        target: "modgraph::pcap",
                        "capture write on {}:{ogate_idx} failed: {err}",
                        m_prev.name(),
                    );
                }
                break;
            }
        }
    }
    drop(pcap);

    if let Some(trace) = worker.trace_mut() {
        trace.before_call(ogate.downstream_module().name(), batch.count());
    }
    let entry = ogate.entry();
    let downstream = Arc::clone(ogate.downstream_module());
    entry(&downstream, batch, worker);
    if let Some(trace) = worker.trace_mut() {
        trace.after_call();
    }
}

/// Enables pcap capture on `m`'s ogate `ogate_idx`, writing to `path`.
/// Requires the ogate to be active; replaces any existing capture on
/// the same ogate.
pub fn enable_tcpdump(
    m: &Arc<ModuleInstance>,
    ogate_idx: u16,
    path: &Path,
) -> Result<(), DiagnosticsError> {
    let ogate = m
        .ogates()
        .get(ogate_idx)
        .cloned()
        .ok_or(DiagnosticsError::InactiveGate)?;

    let sink = PcapSink::open(path)?;
    *ogate.pcap.borrow_mut() = Some(sink);
    tracing::info!(
        target: "modgraph::pcap",
        "enabled capture on {}:{ogate_idx} -> {}",
        m.name(),
        path.display(),
    );
    Ok(())
}

/// Disables pcap capture on `m`'s ogate `ogate_idx`.
///
/// Fails `InactiveGate` on an inactive ogate and `NotCapturing` on an
/// active ogate with no capture installed, matching `enable_tcpdump`'s
/// error channel rather than silently no-op'ing on either condition.
pub fn disable_tcpdump(m: &Arc<ModuleInstance>, ogate_idx: u16) -> Result<(), DiagnosticsError> {
    let ogate = m
        .ogates()
        .get(ogate_idx)
        .cloned()
        .ok_or(DiagnosticsError::InactiveGate)?;

    if ogate.pcap.borrow_mut().take().is_none() {
        return Err(DiagnosticsError::NotCapturing);
    }

    tracing::info!(
        target: "modgraph::pcap",
        "disabled capture on {}:{ogate_idx}",
        m.name(),
    );
    Ok(())
}
