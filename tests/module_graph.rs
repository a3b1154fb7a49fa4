//! End-to-end exercises of the module graph runtime: pipelines,
//! fan-in, name defaulting, busy rejection, teardown, and pcap
//! auto-disable.

use std::any::Any;
use std::sync::Arc;

use modgraph_core::batch::{Batch, Packet};
use modgraph_core::class::ModuleClass;
use modgraph_core::error::ErrorCode;
use modgraph_core::module::{deadend, ModuleDirectory, ModuleHandle};
use modgraph_core::task::{self, TaskHandle, TaskScheduler};
use modgraph_core::worker::WorkerContext;
use modgraph_core::{disable_tcpdump, enable_tcpdump};
use serial_test::serial;

struct NullScheduler;

impl TaskScheduler for NullScheduler {
    fn on_register(&mut self, _task: &TaskHandle) {}
    fn on_unregister(&mut self, _task: &TaskHandle) {}
}

fn src_run_task(m: &ModuleHandle, _arg: &(dyn Any + Send), worker: &mut WorkerContext) {
    let mut batch = Batch::new();
    for _ in 0..4 {
        batch.push(Packet::new(vec![0xAB]));
    }
    m.push_batch(0, batch, worker);
}

fn mid_process_batch(m: &ModuleHandle, batch: Batch, worker: &mut WorkerContext) {
    m.push_batch(0, batch, worker);
}

fn sink_process_batch(_m: &ModuleHandle, batch: Batch, worker: &mut WorkerContext) {
    deadend(worker, batch);
}

fn src_class() -> Arc<ModuleClass> {
    ModuleClass::builder("Src").gates(0, 1).run_task(src_run_task).build()
}

fn fanout_class() -> Arc<ModuleClass> {
    ModuleClass::builder("FanOut").gates(0, 2).build()
}

fn mid_class() -> Arc<ModuleClass> {
    ModuleClass::builder("Mid")
        .gates(1, 1)
        .process_batch(mid_process_batch)
        .build()
}

fn sink_class() -> Arc<ModuleClass> {
    ModuleClass::builder("Sink")
        .gates(1, 0)
        .process_batch(sink_process_batch)
        .build()
}

#[test]
#[serial]
fn s1_linear_pipeline_drops_at_the_sink() {
    let dir = ModuleDirectory::new();
    let src = dir.create_module(Some("s1_src"), &src_class(), Box::new(())).unwrap();
    let mid = dir.create_module(Some("s1_mid"), &mid_class(), Box::new(())).unwrap();
    let sink = dir.create_module(Some("s1_sink"), &sink_class(), Box::new(())).unwrap();

    dir.connect(&src, 0, &mid, 0).unwrap();
    dir.connect(&mid, 0, &sink, 0).unwrap();

    let mut scheduler = NullScheduler;
    let task = task::register_task(&src, Box::new(()), &mut scheduler).unwrap();

    let mut worker = WorkerContext::new(0);
    task.run(&mut worker);

    assert_eq!(worker.silent_drops(), 4);
}

#[test]
#[serial]
fn s2_fan_in_shares_one_igate_until_the_last_disconnect() {
    let dir = ModuleDirectory::new();
    let s1 = dir.create_module(Some("s2_s1"), &src_class(), Box::new(())).unwrap();
    let s2 = dir.create_module(Some("s2_s2"), &src_class(), Box::new(())).unwrap();
    let sink = dir.create_module(Some("s2_sink"), &sink_class(), Box::new(())).unwrap();

    dir.connect(&s1, 0, &sink, 0).unwrap();
    dir.connect(&s2, 0, &sink, 0).unwrap();
    assert_eq!(sink.igates().get(0).unwrap().upstream_len(), 2);

    dir.disconnect(&s1, 0).unwrap();
    assert!(sink.igates().is_active(0));
    assert_eq!(sink.igates().get(0).unwrap().upstream_len(), 1);

    dir.disconnect(&s2, 0).unwrap();
    assert!(!sink.igates().is_active(0));
}

#[test]
#[serial]
fn s3_default_names_reuse_the_lowest_free_suffix() {
    let dir = ModuleDirectory::new();
    let class = ModuleClass::builder("MyModule").gates(0, 0).build();

    let a = dir.create_module(None, &class, Box::new(())).unwrap();
    let b = dir.create_module(None, &class, Box::new(())).unwrap();
    let c = dir.create_module(None, &class, Box::new(())).unwrap();
    assert_eq!(a.name(), "my_module0");
    assert_eq!(b.name(), "my_module1");
    assert_eq!(c.name(), "my_module2");

    dir.destroy_module(&b);
    let d = dir.create_module(None, &class, Box::new(())).unwrap();
    assert_eq!(d.name(), "my_module1");
}

#[test]
#[serial]
fn s4_busy_ogate_rejects_a_second_connect() {
    let dir = ModuleDirectory::new();
    let a = dir.create_module(Some("s4_a"), &fanout_class(), Box::new(())).unwrap();
    let b = dir.create_module(Some("s4_b"), &sink_class(), Box::new(())).unwrap();
    let c = dir.create_module(Some("s4_c"), &sink_class(), Box::new(())).unwrap();

    dir.connect(&a, 0, &b, 0).unwrap();
    let err = dir.connect(&a, 0, &c, 0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EBusy);

    assert!(a.ogates().is_active(0));
    assert!(Arc::ptr_eq(a.ogates().get(0).unwrap().downstream_module(), &b));
}

#[test]
#[serial]
fn s5_destroying_the_sink_of_a_diamond_leaves_the_source_intact() {
    let dir = ModuleDirectory::new();
    let a = dir.create_module(Some("s5_a"), &fanout_class(), Box::new(())).unwrap();
    let b = dir.create_module(Some("s5_b"), &mid_class(), Box::new(())).unwrap();
    let c = dir.create_module(Some("s5_c"), &mid_class(), Box::new(())).unwrap();
    let d = dir.create_module(Some("s5_d"), &sink_class(), Box::new(())).unwrap();

    dir.connect(&a, 0, &b, 0).unwrap();
    dir.connect(&a, 1, &c, 0).unwrap();
    dir.connect(&b, 0, &d, 0).unwrap();
    dir.connect(&c, 0, &d, 0).unwrap();

    dir.destroy_module(&d);

    assert!(!b.ogates().is_active(0));
    assert!(!c.ogates().is_active(0));
    assert!(a.ogates().is_active(0));
    assert!(a.ogates().is_active(1));
    assert!(dir.find_module("s5_a").is_some());
    assert!(dir.find_module("s5_d").is_none());
}

#[test]
#[serial]
fn s4b_disconnect_then_connect_restores_the_ogate() {
    let dir = ModuleDirectory::new();
    let a = dir.create_module(Some("s4b_a"), &fanout_class(), Box::new(())).unwrap();
    let b = dir.create_module(Some("s4b_b"), &sink_class(), Box::new(())).unwrap();

    dir.connect(&a, 0, &b, 0).unwrap();
    dir.disconnect(&a, 0).unwrap();
    assert!(!a.ogates().is_active(0));

    // Idempotent: disconnecting an already-inactive slot is a no-op success.
    dir.disconnect(&a, 0).unwrap();

    dir.connect(&a, 0, &b, 0).unwrap();
    assert!(a.ogates().is_active(0));
    assert_eq!(b.igates().get(0).unwrap().upstream_len(), 1);
}

#[test]
#[serial]
fn enable_tcpdump_rejects_an_inactive_ogate() {
    let dir = ModuleDirectory::new();
    let a = dir.create_module(Some("tcpdump_a"), &fanout_class(), Box::new(())).unwrap();
    let err = enable_tcpdump(&a, 0, std::path::Path::new("/dev/null")).unwrap_err();
    assert!(matches!(err, modgraph_core::DiagnosticsError::InactiveGate));
}

#[cfg(unix)]
#[test]
#[serial]
fn s6_pcap_auto_disables_on_a_closed_reader() {
    use std::fs::File;
    use std::io::Read;
    use std::process::Command;
    use std::thread;
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let fifo_path = std::env::temp_dir().join(format!("modgraph-s6-{nanos}.fifo"));
    let status = Command::new("mkfifo").arg(&fifo_path).status().unwrap();
    assert!(status.success());

    let reader_path = fifo_path.clone();
    let reader = thread::spawn(move || {
        let mut f = File::open(&reader_path).unwrap();
        let mut header = [0u8; 24];
        let _ = f.read_exact(&mut header);
    });

    let dir = ModuleDirectory::new();
    let a = dir.create_module(Some("s6_a"), &fanout_class(), Box::new(())).unwrap();
    let b = dir.create_module(Some("s6_b"), &sink_class(), Box::new(())).unwrap();
    dir.connect(&a, 0, &b, 0).unwrap();

    enable_tcpdump(&a, 0, &fifo_path).unwrap();
    reader.join().unwrap();

    assert!(a.ogates().get(0).unwrap().tcpdump_enabled());

    let mut worker = WorkerContext::new(0);
    let mut batch = Batch::new();
    batch.push(Packet::new(vec![1, 2, 3]));
    a.push_batch(0, batch, &mut worker);

    assert!(!a.ogates().get(0).unwrap().tcpdump_enabled());

    assert!(matches!(
        disable_tcpdump(&a, 0).unwrap_err(),
        modgraph_core::DiagnosticsError::NotCapturing
    ));
    let _ = std::fs::remove_file(&fifo_path);
}
