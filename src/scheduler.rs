//! Slotframe scheduler.
//!
//! Given the absolute slot number, tells the MAC what to do this slot. Cell
//! assignment mutation is the scheduler's exclusive responsibility (spec
//! §5) — the MAC never touches [`crate::schedule::Cell`] fields directly.

use crate::channel_hop;
use crate::schedule::{Cell, CellType, Schedule};
use crate::schedule_table::{self, ScheduleTemplate};
use crate::NodeId;

/// What the MAC should point the radio at this slot. Whether a `Tx` action
/// actually transmits (vs. finding the queue empty and sleeping) is decided
/// by the MAC's `Ti1` activity, not here — see spec §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioAction {
    Sleep,
    Rx,
    Tx,
}

/// Per-slot answer from the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotInfo {
    pub radio_action: RadioAction,
    pub cell_type: CellType,
    pub channel: u8,
    /// True for cells where neither tx nor rx is scheduled — the device is
    /// otherwise idle for the full slot and may background-scan.
    pub available_for_scan: bool,
    /// True for `SharedUplink` cells, where a node may attempt to join.
    pub slot_can_join: bool,
    pub cell_index: usize,
}

/// Which role this device plays. The gateway owns time and the schedule;
/// nodes scan, sync, join and transmit in an assigned uplink cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeType {
    Gateway,
    Node,
}

pub struct Scheduler {
    node_type: NodeType,
    node_id: NodeId,
    fixed_channel: Option<u8>,
    active: Schedule,
}

impl Scheduler {
    pub fn init(node_type: NodeType, node_id: NodeId, initial_schedule: &ScheduleTemplate, fixed_channel: Option<u8>) -> Self {
        Self {
            node_type,
            node_id,
            fixed_channel,
            active: Schedule::from_template(initial_schedule),
        }
    }

    pub fn is_gateway(&self) -> bool {
        self.node_type == NodeType::Gateway
    }

    /// Cell index for `asn` under the active schedule.
    pub fn cell_index(&self, asn: u64) -> usize {
        (asn % self.active.n_cells as u64) as usize
    }

    pub fn tick(&self, asn: u64) -> SlotInfo {
        let idx = self.cell_index(asn);
        let cell = *self.active.cell(idx);

        let channel = if idx < 3 && cell.cell_type == CellType::Beacon {
            channel_hop::beacon_channel(idx, self.fixed_channel)
        } else {
            channel_hop::data_channel(asn, cell.channel_offset, self.fixed_channel)
        };

        let radio_action = self.radio_action_for(&cell);
        let slot_can_join = cell.cell_type == CellType::SharedUplink;
        let available_for_scan = radio_action == RadioAction::Sleep;

        SlotInfo {
            radio_action,
            cell_type: cell.cell_type,
            channel,
            available_for_scan,
            slot_can_join,
            cell_index: idx,
        }
    }

    fn radio_action_for(&self, cell: &Cell) -> RadioAction {
        let is_gateway = self.is_gateway();
        match cell.cell_type {
            CellType::Beacon => {
                if is_gateway {
                    RadioAction::Tx
                } else {
                    RadioAction::Rx
                }
            }
            CellType::SharedUplink => {
                if is_gateway {
                    RadioAction::Rx
                } else {
                    RadioAction::Tx
                }
            }
            CellType::Downlink => {
                if is_gateway {
                    RadioAction::Tx
                } else {
                    RadioAction::Rx
                }
            }
            CellType::Uplink => {
                if is_gateway {
                    if cell.assigned_node_id != 0 {
                        RadioAction::Rx
                    } else {
                        RadioAction::Sleep
                    }
                } else if self.node_id != 0 && cell.assigned_node_id == self.node_id {
                    RadioAction::Tx
                } else {
                    RadioAction::Sleep
                }
            }
        }
    }

    /// R3: selecting the already-active schedule is a no-op (in particular
    /// it does not reset live assignment state).
    pub fn set_schedule(&mut self, id: u8) -> bool {
        if self.active.id == id {
            return true;
        }
        match schedule_table::find(id) {
            Some(tpl) => {
                self.active = Schedule::from_template(tpl);
                true
            }
            None => false,
        }
    }

    pub fn active_schedule_id(&self) -> u8 {
        self.active.id
    }

    pub fn active_schedule_slot_count(&self) -> usize {
        self.active.n_cells
    }

    /// `(backoff_n_min, backoff_n_max)` of the currently active schedule
    /// (spec §3: these are per-schedule structural fields).
    pub fn backoff_range(&self) -> (u8, u8) {
        (self.active.backoff_n_min, self.active.backoff_n_max)
    }

    pub fn remaining_capacity(&self) -> usize {
        self.active.remaining_capacity()
    }

    pub fn assign_next_uplink(&mut self, node_id: NodeId) -> Option<usize> {
        self.active.assign_next_uplink(node_id)
    }

    pub fn deassign(&mut self, node_id: NodeId) {
        self.active.deassign(node_id);
    }

    pub fn cell_of(&self, node_id: NodeId) -> Option<usize> {
        self.active.cell_of(node_id)
    }

    /// Records that `node_id`'s owned uplink cell was heard from at `asn`
    /// (gateway-side liveness tracking).
    pub fn register_rx(&mut self, node_id: NodeId, asn: u64) {
        if let Some(idx) = self.active.cell_of(node_id) {
            self.active.cell_mut(idx).last_received_asn = asn;
        }
    }

    /// All node ids currently occupying an `Uplink` cell (gateway-side),
    /// used to rebuild the beacon's bloom filter every beacon slot.
    pub fn joined_node_ids(&self) -> heapless::Vec<NodeId, 16> {
        let mut out = heapless::Vec::new();
        for i in 0..self.active.n_cells {
            let cell = self.active.cell(i);
            if cell.cell_type == CellType::Uplink && cell.assigned_node_id != 0 {
                let _ = out.push(cell.assigned_node_id);
            }
        }
        out
    }

    /// Gateway-side per-slot liveness sweep: clears any `Uplink` cell whose
    /// owner hasn't been heard from within `liveness_window` slots, and
    /// reports which node ids were evicted so the caller can raise
    /// `NodeLeft` for each.
    pub fn sweep_liveness(&mut self, asn: u64, liveness_window: u64) -> heapless::Vec<NodeId, 16> {
        let mut evicted = heapless::Vec::new();
        for i in 0..self.active.n_cells {
            let cell = *self.active.cell(i);
            if cell.cell_type == CellType::Uplink && cell.assigned_node_id != 0 {
                let age = asn.saturating_sub(cell.last_received_asn);
                if age > liveness_window {
                    let node_id = cell.assigned_node_id;
                    self.active.deassign(node_id);
                    let _ = evicted.push(node_id);
                }
            }
        }
        evicted
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn gw() -> Scheduler {
        Scheduler::init(NodeType::Gateway, 0, schedule_table::SCHEDULE_MINUSCULE, None)
    }

    fn node(id: NodeId) -> Scheduler {
        Scheduler::init(NodeType::Node, id, schedule_table::SCHEDULE_MINUSCULE, None)
    }

    #[test]
    fn gateway_beacons_then_rx_shared_uplink() {
        let s = gw();
        assert_eq!(s.tick(0).radio_action, RadioAction::Tx);
        assert_eq!(s.tick(0).cell_type, CellType::Beacon);
        assert_eq!(s.tick(3).cell_type, CellType::SharedUplink);
        assert_eq!(s.tick(3).radio_action, RadioAction::Rx);
        assert!(s.tick(3).slot_can_join);
    }

    #[test]
    fn node_sleeps_on_unowned_uplink_and_tx_on_owned() {
        let mut s = node(7);
        let idx = s.assign_next_uplink(7).unwrap();
        let info = s.tick(idx as u64);
        assert_eq!(info.cell_type, CellType::Uplink);
        assert_eq!(info.radio_action, RadioAction::Tx);

        // A different node's uplink cell: sleep.
        let other_idx = (0..s.active_schedule_slot_count())
            .find(|&i| i != idx && s.tick(i as u64).cell_type == CellType::Uplink)
            .unwrap();
        assert_eq!(s.tick(other_idx as u64).radio_action, RadioAction::Sleep);
    }

    #[test]
    fn set_schedule_unknown_id_fails() {
        let mut s = gw();
        assert!(!s.set_schedule(250));
        assert_eq!(s.active_schedule_id(), 6);
    }

    #[test]
    fn set_schedule_same_id_is_a_noop() {
        let mut s = gw();
        s.assign_next_uplink(1).unwrap();
        assert!(s.set_schedule(6));
        assert_eq!(s.remaining_capacity(), 4);
    }

    #[test]
    fn sweep_liveness_evicts_stale_uplinks() {
        let mut s = gw();
        s.assign_next_uplink(9).unwrap();
        s.register_rx(9, 100);
        let evicted = s.sweep_liveness(100 + 55, 55);
        assert!(evicted.is_empty());
        let evicted = s.sweep_liveness(100 + 56, 55);
        assert_eq!(evicted.as_slice(), &[9]);
        assert_eq!(s.remaining_capacity(), 5);
    }
}
