//! Transmit queue: a bounded data FIFO plus a single reserved
//! control-frame register.
//!
//! Grounded on the teacher's `rx_buff`/`tx_buff` (`heapless::spsc::Queue`)
//! generalized to a single-owner ring, since here there is one queue, one
//! owner, no producer/consumer split across cores.

use crate::packet::MAX_PAYLOAD_LEN;
use crate::schedule::CellType;
use crate::NodeId;

/// Ring capacity for outbound data frames (spec §3: "up to N (power-of-two,
/// e.g. 8)").
pub const DATA_QUEUE_CAPACITY: usize = 8;

pub type DataFrame = heapless::Vec<u8, MAX_PAYLOAD_LEN>;

/// What [`Queue::next_for_slot`] hands back to the MAC for this slot.
#[derive(Debug, Clone, PartialEq)]
pub enum NextFrame {
    JoinRequest(NodeId),
    JoinResponse(NodeId, u16),
    Data(DataFrame),
    /// Zero-length data frame sent in an owned uplink cell purely to keep
    /// the gateway's liveness tracking from expiring the cell.
    Keepalive,
}

/// A pending control frame: at most one at a time (spec §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlFrame {
    JoinRequest(NodeId),
    JoinResponse(NodeId, u16),
}

/// Outcome of [`Queue::push_data`] on the Open Question in spec §9: this
/// crate picks drop-oldest (see `DESIGN.md`), and callers can inspect what
/// happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    DroppedOldest,
}

pub struct Queue {
    data: heapless::Deque<DataFrame, DATA_QUEUE_CAPACITY>,
    control: Option<ControlFrame>,
}

impl Queue {
    pub fn new() -> Self {
        Self { data: heapless::Deque::new(), control: None }
    }

    /// Enqueue for transmission. The queue is full, the oldest queued frame
    /// is dropped to make room (documented drop-oldest policy).
    pub fn push_data(&mut self, frame: DataFrame) -> PushOutcome {
        if self.data.is_full() {
            let _ = self.data.pop_front();
            self.data.push_back(frame).ok();
            PushOutcome::DroppedOldest
        } else {
            self.data.push_back(frame).ok();
            PushOutcome::Enqueued
        }
    }

    pub fn peek(&self) -> Option<&DataFrame> {
        self.data.front()
    }

    pub fn pop(&mut self) -> Option<DataFrame> {
        self.data.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Overwrites any currently pending control frame (spec §3 invariant:
    /// at most one pending at a time).
    pub fn set_join_request(&mut self, gateway_id: NodeId) {
        self.control = Some(ControlFrame::JoinRequest(gateway_id));
    }

    pub fn set_join_response(&mut self, node_id: NodeId, assigned_cell: u16) {
        self.control = Some(ControlFrame::JoinResponse(node_id, assigned_cell));
    }

    pub fn has_join_packet(&self) -> bool {
        self.control.is_some()
    }

    pub fn get_join_packet(&self) -> Option<ControlFrame> {
        self.control
    }

    pub fn clear_join_packet(&mut self) {
        self.control = None;
    }

    /// Priority rules from spec §4.2: the control register wins on
    /// shared-uplink/downlink slots; data frames flow on an owned uplink;
    /// every other slot gets nothing.
    pub fn next_for_slot(
        &mut self,
        cell_type: CellType,
        owned_uplink: bool,
        is_gateway: bool,
        keepalive_enabled: bool,
    ) -> Option<NextFrame> {
        match cell_type {
            CellType::SharedUplink if !is_gateway => match self.control {
                Some(ControlFrame::JoinRequest(gw)) => Some(NextFrame::JoinRequest(gw)),
                _ => None,
            },
            CellType::Downlink if is_gateway => match self.control {
                Some(ControlFrame::JoinResponse(node, cell)) => Some(NextFrame::JoinResponse(node, cell)),
                _ => self.pop().map(NextFrame::Data),
            },
            CellType::Uplink if owned_uplink && !is_gateway => {
                if let Some(d) = self.pop() {
                    Some(NextFrame::Data(d))
                } else if keepalive_enabled {
                    Some(NextFrame::Keepalive)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame(b: u8) -> DataFrame {
        let mut v = heapless::Vec::new();
        let _ = v.push(b);
        v
    }

    #[test]
    fn push_data_drops_oldest_when_full() {
        let mut q = Queue::new();
        for i in 0..DATA_QUEUE_CAPACITY as u8 {
            assert_eq!(q.push_data(frame(i)), PushOutcome::Enqueued);
        }
        assert_eq!(q.push_data(frame(99)), PushOutcome::DroppedOldest);
        assert_eq!(q.peek().unwrap()[0], 1);
        assert_eq!(q.len(), DATA_QUEUE_CAPACITY);
    }

    #[test]
    fn control_register_holds_one_pending_frame() {
        let mut q = Queue::new();
        q.set_join_request(1);
        assert!(q.has_join_packet());
        q.set_join_response(2, 5);
        assert_eq!(q.get_join_packet(), Some(ControlFrame::JoinResponse(2, 5)));
    }

    #[test]
    fn next_for_slot_prioritises_join_request_on_shared_uplink() {
        let mut q = Queue::new();
        q.push_data(frame(1));
        q.set_join_request(42);
        let next = q.next_for_slot(CellType::SharedUplink, false, false, false);
        assert_eq!(next, Some(NextFrame::JoinRequest(42)));
    }

    #[test]
    fn next_for_slot_gateway_downlink_prefers_join_response_over_data() {
        let mut q = Queue::new();
        q.push_data(frame(1));
        q.set_join_response(7, 3);
        let next = q.next_for_slot(CellType::Downlink, false, true, false);
        assert_eq!(next, Some(NextFrame::JoinResponse(7, 3)));

        q.clear_join_packet();
        let next = q.next_for_slot(CellType::Downlink, false, true, false);
        assert_eq!(next, Some(NextFrame::Data(frame(1))));
    }

    #[test]
    fn owned_uplink_sends_keepalive_when_enabled_and_empty() {
        let mut q = Queue::new();
        assert_eq!(q.next_for_slot(CellType::Uplink, true, false, true), Some(NextFrame::Keepalive));
        assert_eq!(q.next_for_slot(CellType::Uplink, true, false, false), None);
    }

    #[test]
    fn unrelated_slot_shapes_yield_nothing() {
        let mut q = Queue::new();
        q.push_data(frame(1));
        assert_eq!(q.next_for_slot(CellType::Beacon, false, false, false), None);
        assert_eq!(q.next_for_slot(CellType::Uplink, false, false, false), None);
    }
}
