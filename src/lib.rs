//! The module graph runtime for a modular software dataplane.
//!
//! Five pieces make up the public surface: module classes and
//! instances ([`class`], [`module`]), the typed gate interconnect
//! between them ([`gate`]), batches as the opaque unit crossing a gate
//! ([`batch`]), task registration for an external scheduler
//! ([`task`]), and the process-wide name registry ([`namespace`]).
//! [`worker`] and [`diagnostics`] hold the per-worker fast-path state
//! and the optional pcap/trace instrumentation, respectively.
//!
//! This crate owns graph topology and batch delivery. It does not own
//! a scheduler, a packet buffer allocator, or NIC I/O — those are the
//! host program's job, reached through [`task::TaskScheduler`] and the
//! opaque [`batch::Packet`] payload.

pub mod batch;
pub mod class;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod module;
pub mod namespace;
pub mod task;
mod uid;
pub mod worker;

pub use batch::{Batch, Packet};
pub use class::{ClassRegistry, ModuleClass, ModuleClassBuilder};
pub use error::{DiagnosticsError, ErrorCode, GraphError};
pub use gate::{connect, disable_tcpdump, disconnect, enable_tcpdump, is_active_gate, GateArray, Igate, Ogate};
pub use module::{camel_to_snake, deadend, ModuleDirectory, ModuleHandle, ModuleId, ModuleInstance};
pub use namespace::{Namespace, NamespaceKind};
pub use task::{register_task, unregister_task, TaskHandle, TaskId, TaskScheduler};
pub use worker::WorkerContext;
