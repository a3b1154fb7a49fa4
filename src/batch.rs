//! Batches: the opaque unit of work crossing a gate edge.
//!
//! The packet buffer allocator and NIC I/O live outside this crate —
//! a batch only needs to be a bounded, ownable collection of packet
//! references it can count and, for the optional pcap path, peek the
//! bytes of. `Packet` here stands in for whatever buffer handle the
//! allocator actually hands out.

/// A single packet reference inside a batch.
#[derive(Debug, Clone)]
pub struct Packet {
    bytes: Vec<u8>,
}

impl Packet {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A bounded set of packet references traversing one gate edge.
///
/// There is no implicit queueing and no copying on the edge: a
/// `Batch` is moved, never cloned, as it crosses `push_batch`.
#[derive(Debug, Default)]
pub struct Batch {
    packets: Vec<Packet>,
}

impl Batch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_packets(packets: Vec<Packet>) -> Self {
        Self { packets }
    }

    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    /// The number of packets carried.
    #[must_use]
    pub fn count(&self) -> usize {
        self.packets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    #[must_use]
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    #[must_use]
    pub fn into_packets(self) -> Vec<Packet> {
        self.packets
    }
}
