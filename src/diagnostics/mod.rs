//! Optional per-edge packet capture and per-worker call-stack tracing.

pub mod pcap;
pub mod trace;
