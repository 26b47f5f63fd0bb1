//! Pre-compiled slotframe schedules.
//!
//! Structural data transcribed from the reference implementation's
//! `all_schedules.c`: seven fixed schedules, each identified by a one-byte
//! id, selectable over the air (a beacon's `active_schedule_id`) but never
//! negotiated beyond that (spec §1 Non-goals).

use crate::schedule::CellType::{self, Beacon, Downlink, SharedUplink, Uplink};

/// A compiled schedule: immutable structural data. [`crate::schedule::Schedule`]
/// copies this into a live, mutable instance at selection time.
pub struct ScheduleTemplate {
    pub id: u8,
    pub max_nodes: usize,
    pub backoff_n_min: u8,
    pub backoff_n_max: u8,
    pub cells: &'static [(CellType, u16)],
}

/// Beacon-only schedule used while scanning the network.
pub static SCHEDULE_ONLY_BEACONS: &ScheduleTemplate = &ScheduleTemplate {
    id: 0xBE,
    max_nodes: 0,
    backoff_n_min: 5,
    backoff_n_max: 9,
    cells: &[(Beacon, 0), (Beacon, 1), (Beacon, 2)],
};

/// Beacon-only schedule for the `BLINK_ENABLE_BACKGROUND_SCAN` optimized
/// scan path (single cell, channel offset irrelevant).
pub static SCHEDULE_ONLY_BEACONS_OPTIMIZED_SCAN: &ScheduleTemplate = &ScheduleTemplate {
    id: 0xBF,
    max_nodes: 0,
    backoff_n_min: 5,
    backoff_n_max: 9,
    cells: &[(Uplink, 0)],
};

/// 11 cells, up to 5 nodes. The literal input to end-to-end scenarios 1 and
/// 6.
pub static SCHEDULE_MINUSCULE: &ScheduleTemplate = &ScheduleTemplate {
    id: 6,
    max_nodes: 5,
    backoff_n_min: 5,
    backoff_n_max: 9,
    cells: &[
        (Beacon, 0),
        (Beacon, 1),
        (Beacon, 2),
        (SharedUplink, 6),
        (Downlink, 3),
        (Uplink, 5),
        (Uplink, 1),
        (Downlink, 4),
        (Uplink, 0),
        (Uplink, 7),
        (Uplink, 2),
    ],
};

/// 17 cells, up to 11 nodes.
pub static SCHEDULE_TINY: &ScheduleTemplate = &ScheduleTemplate {
    id: 5,
    max_nodes: 11,
    backoff_n_min: 5,
    backoff_n_max: 9,
    cells: &[
        (Beacon, 0),
        (Beacon, 1),
        (Beacon, 2),
        (SharedUplink, 2),
        (Downlink, 5),
        (Uplink, 6),
        (Uplink, 13),
        (Uplink, 7),
        (Uplink, 0),
        (Downlink, 4),
        (Uplink, 10),
        (Uplink, 12),
        (Uplink, 1),
        (Uplink, 11),
        (Uplink, 8),
        (Uplink, 3),
        (Uplink, 9),
    ],
};

/// 41 cells, up to 29 nodes.
pub static SCHEDULE_SMALL: &ScheduleTemplate = &ScheduleTemplate {
    id: 4,
    max_nodes: 29,
    backoff_n_min: 5,
    backoff_n_max: 9,
    cells: &[
        (Beacon, 0),
        (Beacon, 1),
        (Beacon, 2),
        (SharedUplink, 36),
        (Downlink, 20),
        (Uplink, 13),
        (Uplink, 27),
        (Uplink, 29),
        (Uplink, 9),
        (Downlink, 0),
        (Uplink, 4),
        (Uplink, 33),
        (Uplink, 3),
        (Uplink, 30),
        (Uplink, 31),
        (SharedUplink, 22),
        (Downlink, 15),
        (Uplink, 11),
        (Uplink, 16),
        (Uplink, 24),
        (Uplink, 21),
        (Downlink, 2),
        (Uplink, 19),
        (Uplink, 10),
        (Uplink, 25),
        (Uplink, 34),
        (Uplink, 14),
        (SharedUplink, 28),
        (Downlink, 32),
        (Uplink, 1),
        (Uplink, 5),
        (Uplink, 18),
        (Uplink, 7),
        (Downlink, 23),
        (Uplink, 12),
        (Uplink, 17),
        (Uplink, 6),
        (Uplink, 35),
        (Uplink, 8),
        (Uplink, 37),
        (Uplink, 26),
    ],
};

/// 101 cells, up to 74 nodes.
pub static SCHEDULE_BIG: &ScheduleTemplate = &ScheduleTemplate {
    id: 2,
    max_nodes: 74,
    backoff_n_min: 5,
    backoff_n_max: 9,
    cells: &[
        (Beacon, 0),
        (Beacon, 1),
        (Beacon, 2),
        (SharedUplink, 23),
        (Downlink, 74),
        (Uplink, 78),
        (Uplink, 97),
        (Uplink, 63),
        (Uplink, 32),
        (Downlink, 59),
        (Uplink, 21),
        (Uplink, 9),
        (Uplink, 48),
        (Uplink, 53),
        (Uplink, 79),
        (SharedUplink, 92),
        (Downlink, 71),
        (Uplink, 26),
        (Uplink, 81),
        (Uplink, 27),
        (Uplink, 89),
        (Downlink, 1),
        (Uplink, 56),
        (Uplink, 6),
        (Uplink, 46),
        (Uplink, 34),
        (Uplink, 19),
        (SharedUplink, 60),
        (Downlink, 15),
        (Uplink, 58),
        (Uplink, 72),
        (Uplink, 42),
        (Uplink, 41),
        (Downlink, 50),
        (Uplink, 73),
        (Uplink, 4),
        (Uplink, 55),
        (Uplink, 16),
        (Uplink, 90),
        (SharedUplink, 69),
        (Downlink, 7),
        (Uplink, 95),
        (Uplink, 24),
        (Uplink, 84),
        (Uplink, 33),
        (Downlink, 76),
        (Uplink, 94),
        (Uplink, 62),
        (Uplink, 93),
        (Uplink, 45),
        (Uplink, 83),
        (SharedUplink, 49),
        (Downlink, 13),
        (Uplink, 65),
        (Uplink, 39),
        (Uplink, 12),
        (Uplink, 67),
        (Downlink, 5),
        (Uplink, 36),
        (Uplink, 44),
        (Uplink, 10),
        (Uplink, 66),
        (Uplink, 88),
        (SharedUplink, 61),
        (Downlink, 47),
        (Uplink, 35),
        (Uplink, 87),
        (Uplink, 70),
        (Uplink, 2),
        (Downlink, 82),
        (Uplink, 17),
        (Uplink, 28),
        (Uplink, 14),
        (Uplink, 8),
        (Uplink, 22),
        (SharedUplink, 51),
        (Downlink, 91),
        (Uplink, 85),
        (Uplink, 68),
        (Uplink, 86),
        (Uplink, 80),
        (Downlink, 75),
        (Uplink, 25),
        (Uplink, 54),
        (Uplink, 57),
        (Uplink, 3),
        (Uplink, 38),
        (SharedUplink, 37),
        (Downlink, 20),
        (Uplink, 18),
        (Uplink, 64),
        (Uplink, 30),
        (Uplink, 31),
        (Downlink, 96),
        (Uplink, 11),
        (Uplink, 77),
        (Uplink, 29),
        (Uplink, 0),
        (Uplink, 43),
        (Uplink, 40),
        (Uplink, 52),
    ],
};

/// 137 cells, up to 101 nodes. `SCAN_MAX_SLOTS` is this
/// schedule's cell count.
pub static SCHEDULE_HUGE: &ScheduleTemplate = &ScheduleTemplate {
    id: 1,
    max_nodes: 101,
    backoff_n_min: 5,
    backoff_n_max: 9,
    cells: &[
        (Beacon, 0),
        (Beacon, 1),
        (Beacon, 2),
        (SharedUplink, 9),
        (Downlink, 30),
        (Uplink, 33),
        (Uplink, 91),
        (Uplink, 43),
        (Uplink, 13),
        (Downlink, 103),
        (Uplink, 102),
        (Uplink, 83),
        (Uplink, 90),
        (Uplink, 0),
        (Uplink, 92),
        (SharedUplink, 11),
        (Downlink, 38),
        (Uplink, 59),
        (Uplink, 52),
        (Uplink, 114),
        (Uplink, 31),
        (Downlink, 7),
        (Uplink, 63),
        (Uplink, 104),
        (Uplink, 111),
        (Uplink, 53),
        (Uplink, 22),
        (SharedUplink, 130),
        (Downlink, 26),
        (Uplink, 80),
        (Uplink, 3),
        (Uplink, 125),
        (Uplink, 20),
        (Downlink, 65),
        (Uplink, 18),
        (Uplink, 96),
        (Uplink, 10),
        (Uplink, 37),
        (Uplink, 16),
        (SharedUplink, 101),
        (Downlink, 110),
        (Uplink, 12),
        (Uplink, 15),
        (Uplink, 55),
        (Uplink, 100),
        (Downlink, 123),
        (Uplink, 112),
        (Uplink, 40),
        (Uplink, 2),
        (Uplink, 21),
        (Uplink, 4),
        (SharedUplink, 47),
        (Downlink, 84),
        (Uplink, 58),
        (Uplink, 17),
        (Uplink, 60),
        (Uplink, 107),
        (Downlink, 49),
        (Uplink, 115),
        (Uplink, 126),
        (Uplink, 35),
        (Uplink, 36),
        (Uplink, 68),
        (SharedUplink, 93),
        (Downlink, 124),
        (Uplink, 79),
        (Uplink, 28),
        (Uplink, 14),
        (Uplink, 6),
        (Downlink, 72),
        (Uplink, 70),
        (Uplink, 86),
        (Uplink, 71),
        (Uplink, 81),
        (Uplink, 128),
        (SharedUplink, 97),
        (Downlink, 131),
        (Uplink, 45),
        (Uplink, 23),
        (Uplink, 50),
        (Uplink, 98),
        (Downlink, 106),
        (Uplink, 118),
        (Uplink, 77),
        (Uplink, 61),
        (Uplink, 8),
        (Uplink, 116),
        (SharedUplink, 108),
        (Downlink, 69),
        (Uplink, 119),
        (Uplink, 82),
        (Uplink, 74),
        (Uplink, 89),
        (Downlink, 99),
        (Uplink, 56),
        (Uplink, 109),
        (Uplink, 57),
        (Uplink, 46),
        (Uplink, 132),
        (SharedUplink, 44),
        (Downlink, 34),
        (Uplink, 39),
        (Uplink, 19),
        (Uplink, 85),
        (Uplink, 1),
        (Downlink, 27),
        (Uplink, 41),
        (Uplink, 5),
        (Uplink, 29),
        (Uplink, 32),
        (Uplink, 54),
        (SharedUplink, 25),
        (Downlink, 24),
        (Uplink, 120),
        (Uplink, 64),
        (Uplink, 117),
        (Uplink, 78),
        (Downlink, 94),
        (Uplink, 88),
        (Uplink, 127),
        (Uplink, 48),
        (Uplink, 87),
        (Uplink, 42),
        (SharedUplink, 75),
        (Downlink, 62),
        (Uplink, 51),
        (Uplink, 113),
        (Uplink, 73),
        (Uplink, 67),
        (Downlink, 121),
        (Uplink, 66),
        (Uplink, 122),
        (Uplink, 76),
        (Uplink, 95),
        (Uplink, 133),
        (Uplink, 105),
        (Uplink, 129),
    ],
};

/// All known schedules, keyed by [`ScheduleTemplate::id`].
pub static SCHEDULE_TABLE: &[&ScheduleTemplate] = &[
    SCHEDULE_ONLY_BEACONS,
    SCHEDULE_ONLY_BEACONS_OPTIMIZED_SCAN,
    SCHEDULE_MINUSCULE,
    SCHEDULE_TINY,
    SCHEDULE_SMALL,
    SCHEDULE_BIG,
    SCHEDULE_HUGE,
];

/// `SCAN_MAX_SLOTS`: the cell count of the largest schedule.
pub const SCAN_MAX_SLOTS: usize = 137;

pub fn find(id: u8) -> Option<&'static ScheduleTemplate> {
    SCHEDULE_TABLE.iter().copied().find(|s| s.id == id)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_schedule_starts_with_three_beacons_and_matches_max_nodes() {
        // `schedule_only_beacons_optimized_scan` (0xBF) is the one exception:
        // the original source gives it a single non-beacon cell (see
        // all_schedules.c) since it is never selected as an active data
        // schedule, only used to park the radio on a fixed channel during
        // BLINK_ENABLE_BACKGROUND_SCAN. P1 applies to schedules that carry
        // node assignments; this one never does (`max_nodes == 0`).
        for tpl in SCHEDULE_TABLE {
            if tpl.id == SCHEDULE_ONLY_BEACONS_OPTIMIZED_SCAN.id {
                continue;
            }
            assert_eq!(tpl.cells[0].0, Beacon);
            assert_eq!(tpl.cells[1].0, Beacon);
            assert_eq!(tpl.cells[2].0, Beacon);
            let uplinks = tpl.cells.iter().filter(|(t, _)| *t == Uplink).count();
            assert_eq!(uplinks, tpl.max_nodes, "schedule id {}", tpl.id);
        }
    }

    #[test]
    fn find_looks_up_by_id() {
        assert_eq!(find(6).unwrap().id, 6);
        assert_eq!(find(0xBE).unwrap().cells.len(), 3);
        assert!(find(200).is_none());
    }

    #[test]
    fn scan_max_slots_matches_largest_schedule() {
        assert_eq!(SCAN_MAX_SLOTS, SCHEDULE_HUGE.cells.len());
    }
}
