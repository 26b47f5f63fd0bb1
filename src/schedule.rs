//! Cell and schedule data model.
//!
//! A [`Schedule`] is the *live*, possibly-mutated copy of a
//! [`crate::schedule_table`] template: structural fields (`id`, `n_cells`,
//! the cell types/offsets) never change after construction, but a gateway
//! mutates `assigned_node_id`/`last_received_asn` in `Uplink` cells as nodes
//! join, send data, and go silent.

use crate::NodeId;

/// Largest cell count among the compiled schedules (`SCHEDULE_HUGE`).
pub const MAX_CELLS: usize = 137;

/// One slot's role within a slotframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CellType {
    Beacon,
    SharedUplink,
    Downlink,
    Uplink,
}

/// One slot of a slotframe.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cell {
    pub cell_type: CellType,
    pub channel_offset: u16,
    /// `0` means unassigned. Only meaningful for `Uplink` cells.
    pub assigned_node_id: NodeId,
    /// Liveness stamp of the owning node. Only meaningful for `Uplink`
    /// cells.
    pub last_received_asn: u64,
}

impl Cell {
    pub const fn new(cell_type: CellType, channel_offset: u16) -> Self {
        Self {
            cell_type,
            channel_offset,
            assigned_node_id: 0,
            last_received_asn: 0,
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.cell_type == CellType::Uplink && self.assigned_node_id == 0
    }
}

/// A slotframe: structural fields plus, for the gateway, live assignment
/// state.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub id: u8,
    pub max_nodes: usize,
    pub backoff_n_min: u8,
    pub backoff_n_max: u8,
    pub n_cells: usize,
    cells: [Cell; MAX_CELLS],
}

impl Schedule {
    /// Build a live schedule from a compiled template (see
    /// [`crate::schedule_table`]).
    pub fn from_template(tpl: &crate::schedule_table::ScheduleTemplate) -> Self {
        let mut cells = [Cell::new(CellType::Downlink, 0); MAX_CELLS];
        for (i, &(cell_type, offset)) in tpl.cells.iter().enumerate() {
            cells[i] = Cell::new(cell_type, offset);
        }
        Self {
            id: tpl.id,
            max_nodes: tpl.max_nodes,
            backoff_n_min: tpl.backoff_n_min,
            backoff_n_max: tpl.backoff_n_max,
            n_cells: tpl.cells.len(),
            cells,
        }
    }

    pub fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    pub fn cell_mut(&mut self, index: usize) -> &mut Cell {
        &mut self.cells[index]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells[..self.n_cells]
    }

    /// P1: the first three cells are `Beacon`.
    /// P6 (combined with [`Self::node_count`]): `max_nodes` matches the
    /// number of `Uplink` cells.
    pub fn is_valid(&self) -> bool {
        let first_three_beacons = self.n_cells >= 3
            && self.cells[0].cell_type == CellType::Beacon
            && self.cells[1].cell_type == CellType::Beacon
            && self.cells[2].cell_type == CellType::Beacon;

        let uplink_count = self.cells().iter().filter(|c| c.cell_type == CellType::Uplink).count();

        first_three_beacons && uplink_count == self.max_nodes
    }

    /// P2: count of cells currently owned by a node.
    pub fn node_count(&self) -> usize {
        self.cells().iter().filter(|c| c.assigned_node_id != 0).count()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.max_nodes.saturating_sub(self.node_count())
    }

    /// First-fit assignment into an unassigned `Uplink` cell. Returns the
    /// admitted cell index.
    pub fn assign_next_uplink(&mut self, node_id: NodeId) -> Option<usize> {
        for i in 0..self.n_cells {
            if self.cells[i].is_unassigned() {
                self.cells[i].assigned_node_id = node_id;
                self.cells[i].last_received_asn = 0;
                return Some(i);
            }
        }
        None
    }

    /// Clears the cell owned by `node_id`, if any. Returns whether a cell
    /// was cleared (R2).
    pub fn deassign(&mut self, node_id: NodeId) -> bool {
        if node_id == 0 {
            return false;
        }
        for i in 0..self.n_cells {
            if self.cells[i].cell_type == CellType::Uplink && self.cells[i].assigned_node_id == node_id {
                self.cells[i].assigned_node_id = 0;
                self.cells[i].last_received_asn = 0;
                return true;
            }
        }
        false
    }

    pub fn cell_of(&self, node_id: NodeId) -> Option<usize> {
        (0..self.n_cells).find(|&i| {
            self.cells[i].cell_type == CellType::Uplink && self.cells[i].assigned_node_id == node_id
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schedule_table;

    #[test]
    fn minuscule_is_valid() {
        let s = Schedule::from_template(schedule_table::SCHEDULE_MINUSCULE);
        assert!(s.is_valid());
        assert_eq!(s.max_nodes, 5);
        assert_eq!(s.n_cells, 11);
    }

    #[test]
    fn assign_then_deassign_restores_cell() {
        let mut s = Schedule::from_template(schedule_table::SCHEDULE_MINUSCULE);
        let idx = s.assign_next_uplink(42).unwrap();
        assert_eq!(s.cell(idx).assigned_node_id, 42);
        assert_eq!(s.node_count(), 1);

        assert!(s.deassign(42));
        assert_eq!(s.cell(idx).assigned_node_id, 0);
        assert_eq!(s.node_count(), 0);
    }

    #[test]
    fn assign_exhausts_capacity() {
        let mut s = Schedule::from_template(schedule_table::SCHEDULE_MINUSCULE);
        for n in 1..=5u64 {
            assert!(s.assign_next_uplink(n).is_some());
        }
        assert_eq!(s.remaining_capacity(), 0);
        assert!(s.assign_next_uplink(6).is_none());
    }

    #[test]
    fn no_two_uplinks_share_a_node() {
        let mut s = Schedule::from_template(schedule_table::SCHEDULE_MINUSCULE);
        s.assign_next_uplink(1).unwrap();
        s.assign_next_uplink(2).unwrap();
        let mut seen = heapless::Vec::<NodeId, 16>::new();
        for c in s.cells() {
            if c.cell_type == CellType::Uplink && c.assigned_node_id != 0 {
                assert!(!seen.contains(&c.assigned_node_id));
                let _ = seen.push(c.assigned_node_id);
            }
        }
    }
}
