//! Decoding of the per-round statistics a controller reports over the link.

use crate::error::{Result, SimError};

const START: &[u8] = b"MC-STATS-START";
const SLOTS: &[u8] = b"MC-STATS-SLOTS";
const END: &[u8] = b"MC-STATS-END";

const SLOT_SIZE: usize = 5;

/// One slot of a coordination round as seen by the reporting node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSlot {
    pub round: u16,
    pub slot: u16,
    pub node_count: u8,
    pub flag_progress: u8,
    pub phase: u8,
    pub has_node_index: bool,
    pub node_index: u8,
}

/// Tracks the round currently being reported. Travels with the controller
/// link, so its label stays with the link on handover.
#[derive(Debug, Clone, Default)]
pub struct StatsHandler {
    label: u16,
    round: u16,
    expected_slots: u16,
    received_slots: u16,
    slots_per_message: u8,
}

impl StatsHandler {
    pub fn new(label: u16) -> Self {
        Self {
            label,
            ..Default::default()
        }
    }

    pub fn round(&self) -> u16 {
        self.round
    }

    pub fn expected_slots(&self) -> u16 {
        self.expected_slots
    }

    pub fn received_slots(&self) -> u16 {
        self.received_slots
    }

    pub fn slots_per_message(&self) -> u8 {
        self.slots_per_message
    }

    /// Consumes one `MC-STATS-*` report and returns the slots it carried.
    pub fn handle(&mut self, msg: &[u8]) -> Result<Vec<StatsSlot>> {
        if let Some(body) = msg.strip_prefix(START) {
            let &[r0, r1, e0, e1, per, ..] = body else {
                return Err(SimError::Frame(format!("stats start too short: {} bytes", body.len())));
            };
            self.round = u16::from_be_bytes([r0, r1]);
            self.expected_slots = u16::from_be_bytes([e0, e1]);
            self.slots_per_message = per;
            self.received_slots = 0;
            Ok(Vec::new())
        } else if let Some(body) = msg.strip_prefix(SLOTS) {
            let slots: Vec<StatsSlot> = body
                .chunks_exact(SLOT_SIZE)
                .map(|chunk| {
                    let slot = StatsSlot {
                        round: self.round,
                        slot: self.received_slots,
                        node_count: chunk[0],
                        flag_progress: chunk[1],
                        phase: chunk[2],
                        has_node_index: chunk[3] != 0,
                        node_index: chunk[4],
                    };
                    self.received_slots = self.received_slots.wrapping_add(1);
                    slot
                })
                .collect();

            for s in &slots {
                log::debug!(
                    target: "vanet::event",
                    "chaos {:06} {}, {}, {}, {}, {}, {}, {}",
                    self.label,
                    s.round,
                    s.slot,
                    s.phase,
                    s.node_count,
                    s.flag_progress,
                    s.has_node_index as u8,
                    s.node_index
                );
            }
            Ok(slots)
        } else if msg.starts_with(END) {
            if self.received_slots != self.expected_slots {
                log::debug!(
                    "Stats round {} of {:06} ended with {}/{} slots",
                    self.round,
                    self.label,
                    self.received_slots,
                    self.expected_slots
                );
            }
            Ok(Vec::new())
        } else {
            Err(SimError::Frame(format!("unknown stats report {:?}", String::from_utf8_lossy(msg))))
        }
    }
}
