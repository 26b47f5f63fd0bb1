//! Scan table and gateway selection.

use crate::packet::Bloom;
use crate::NodeId;

/// Fixed scan-table capacity (spec §3: "e.g. 5 gateways").
pub const SCAN_TABLE_CAPACITY: usize = 5;

/// Freshness window for scan-table entries.
pub const SCAN_OLD_US: u64 = 500_000;

/// RSSI improvement required to hand over from the currently synced
/// gateway during a background scan.
pub const HANDOVER_HYSTERESIS_DB: i8 = 9;

/// Latest beacon header observed from a candidate gateway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeaconInfo {
    pub version: u8,
    pub asn: u64,
    pub remaining_capacity: u8,
    pub active_schedule_id: u8,
    pub src: NodeId,
    pub bloom: Bloom,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct ChannelSample {
    rssi: i8,
    /// `0` means "never written" (spec's "non-zero" freshness test).
    timestamp: u64,
    captured_asn: u64,
}

impl ChannelSample {
    fn is_present(&self) -> bool {
        self.timestamp != 0
    }

    fn is_fresh(&self, reference_ts: u64, scan_old_us: u64) -> bool {
        self.is_present() && reference_ts.saturating_sub(self.timestamp) <= scan_old_us
    }
}

struct ScanEntry {
    gateway_id: NodeId,
    channels: [ChannelSample; 3],
    beacon: Option<BeaconInfo>,
    /// Most recent timestamp across all three channel samples — drives
    /// freshness eviction and reuse selection.
    latest_ts: u64,
}

/// Per-channel sample returned by [`ScanTable::scan_select`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanChannelInfo {
    pub gateway_id: NodeId,
    pub rssi: i8,
    pub timestamp: u64,
    pub captured_asn: u64,
    pub beacon: BeaconInfo,
}

pub struct ScanTable {
    entries: [Option<ScanEntry>; SCAN_TABLE_CAPACITY],
}

impl ScanTable {
    pub fn new() -> Self {
        Self { entries: core::array::from_fn(|_| None) }
    }

    fn index_of(&self, gateway_id: NodeId) -> Option<usize> {
        self.entries.iter().position(|e| matches!(e, Some(e) if e.gateway_id == gateway_id))
    }

    /// Inserts or updates one RSSI/timestamp sample for `(beacon.src,
    /// channel)` (spec §4.3 algorithm).
    pub fn scan_add(&mut self, beacon: BeaconInfo, rssi: i8, channel: u8, ts: u64, asn: u64, scan_old_us: u64) {
        let ch = channel as usize % 3;

        if let Some(idx) = self.index_of(beacon.src) {
            let entry = self.entries[idx].as_mut().unwrap();
            entry.channels[ch] = ChannelSample { rssi, timestamp: ts, captured_asn: asn };
            entry.beacon = Some(beacon);
            entry.latest_ts = entry.latest_ts.max(ts);
            return;
        }

        let mut first_empty: Option<usize> = None;
        let mut oldest: Option<(usize, u64)> = None;

        for (i, slot) in self.entries.iter_mut().enumerate() {
            match slot {
                None => {
                    if first_empty.is_none() {
                        first_empty = Some(i);
                    }
                }
                Some(entry) => {
                    if ts.saturating_sub(entry.latest_ts) > scan_old_us {
                        // Stale: treat as reclaimable by tracking it as the
                        // oldest candidate (it will generally win that
                        // comparison below).
                    }
                    if oldest.map_or(true, |(_, oldest_ts)| entry.latest_ts < oldest_ts) {
                        oldest = Some((i, entry.latest_ts));
                    }
                }
            }
        }

        let mut new_entry = ScanEntry {
            gateway_id: beacon.src,
            channels: [ChannelSample::default(); 3],
            beacon: None,
            latest_ts: ts,
        };
        new_entry.channels[ch] = ChannelSample { rssi, timestamp: ts, captured_asn: asn };
        new_entry.beacon = Some(beacon);

        match first_empty {
            Some(i) => self.entries[i] = Some(new_entry),
            None => {
                let (i, _) = oldest.expect("scan table capacity is non-zero");
                self.entries[i] = Some(new_entry);
            }
        }
    }

    /// Picks the best candidate gateway. `current` is the
    /// currently synced gateway's (id, rssi), if any — only consulted
    /// during a `background_while_joined` scan, where a hysteresis margin
    /// is required before handing over.
    pub fn scan_select(
        &self,
        window_end_ts: u64,
        scan_old_us: u64,
        handover_hysteresis_db: i8,
        current: Option<(NodeId, i8)>,
        background_while_joined: bool,
    ) -> Option<ScanChannelInfo> {
        let mut best: Option<(usize, i32)> = None;

        for (i, slot) in self.entries.iter().enumerate() {
            let entry = match slot {
                Some(e) => e,
                None => continue,
            };
            let Some(beacon) = entry.beacon else { continue };
            if beacon.remaining_capacity == 0 {
                continue;
            }

            let fresh: heapless::Vec<i32, 3> = entry
                .channels
                .iter()
                .filter(|s| s.is_fresh(window_end_ts, scan_old_us))
                .map(|s| s.rssi as i32)
                .collect();
            if fresh.is_empty() {
                continue;
            }
            let mean = fresh.iter().sum::<i32>() / fresh.len() as i32;

            if best.map_or(true, |(_, best_mean)| mean > best_mean) {
                best = Some((i, mean));
            }
        }

        let (idx, _) = best?;
        let entry = self.entries[idx].as_ref().unwrap();
        let beacon = entry.beacon?;

        // Within the winning entry, the freshest per-channel sample wins;
        // ties broken by lower channel index (we scan channels in index
        // order and only replace on strictly-newer timestamps).
        let mut winner: Option<(usize, &ChannelSample)> = None;
        for (ch, sample) in entry.channels.iter().enumerate() {
            if !sample.is_fresh(window_end_ts, scan_old_us) {
                continue;
            }
            if winner.map_or(true, |(_, w)| sample.timestamp > w.timestamp) {
                winner = Some((ch, sample));
            }
        }
        let (_, sample) = winner?;

        if background_while_joined {
            if let Some((_, current_rssi)) = current {
                if (sample.rssi as i32) <= current_rssi as i32 + handover_hysteresis_db as i32 {
                    return None;
                }
            }
        }

        Some(ScanChannelInfo {
            gateway_id: entry.gateway_id,
            rssi: sample.rssi,
            timestamp: sample.timestamp,
            captured_asn: sample.captured_asn,
            beacon,
        })
    }
}

impl Default for ScanTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn beacon(src: NodeId, remaining_capacity: u8) -> BeaconInfo {
        BeaconInfo {
            version: crate::packet::PROTOCOL_VERSION,
            asn: 10,
            remaining_capacity,
            active_schedule_id: 6,
            src,
            bloom: Bloom::new(),
        }
    }

    #[test]
    fn holds_at_most_one_entry_per_gateway() {
        let mut t = ScanTable::new();
        t.scan_add(beacon(1, 5), -40, 37, 1_000, 10, SCAN_OLD_US);
        t.scan_add(beacon(1, 5), -41, 38, 1_100, 10, SCAN_OLD_US);
        assert_eq!(t.entries.iter().filter(|e| e.is_some()).count(), 1);
    }

    #[test]
    fn scan_add_is_idempotent_given_identical_ts() {
        let mut t = ScanTable::new();
        t.scan_add(beacon(1, 5), -40, 37, 1_000, 10, SCAN_OLD_US);
        t.scan_add(beacon(1, 5), -40, 37, 1_000, 10, SCAN_OLD_US);
        let info = t.scan_select(1_000, SCAN_OLD_US, HANDOVER_HYSTERESIS_DB, None, false).unwrap();
        assert_eq!(info.rssi, -40);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut t = ScanTable::new();
        for g in 1..=SCAN_TABLE_CAPACITY as NodeId {
            t.scan_add(beacon(g, 5), -50, 37, g * 1000, 1, SCAN_OLD_US);
        }
        // Gateway 1 is oldest; a new gateway should evict it.
        t.scan_add(beacon(99, 5), -50, 37, 100_000, 1, SCAN_OLD_US);
        assert!(t.index_of(1).is_none());
        assert!(t.index_of(99).is_some());
    }

    #[test]
    fn selects_strongest_mean_rssi_and_skips_full_gateways() {
        let mut t = ScanTable::new();
        t.scan_add(beacon(1, 5), -70, 37, 1_000, 1, SCAN_OLD_US);
        t.scan_add(beacon(2, 0), -30, 37, 1_000, 1, SCAN_OLD_US);
        let best = t.scan_select(1_000, SCAN_OLD_US, HANDOVER_HYSTERESIS_DB, None, false).unwrap();
        assert_eq!(best.gateway_id, 1);
    }

    #[test]
    fn returns_none_without_hysteresis_margin_during_background_scan() {
        let mut t = ScanTable::new();
        t.scan_add(beacon(2, 5), -50, 37, 1_000, 1, SCAN_OLD_US);
        let none = t.scan_select(1_000, SCAN_OLD_US, HANDOVER_HYSTERESIS_DB, Some((1, -45)), true);
        assert!(none.is_none());

        let some = t.scan_select(1_000, SCAN_OLD_US, HANDOVER_HYSTERESIS_DB, Some((1, -70)), true);
        assert!(some.is_some());
    }

    #[test]
    fn stale_entries_invalidated_on_next_write() {
        let mut t = ScanTable::new();
        t.scan_add(beacon(1, 5), -50, 37, 0, 1, SCAN_OLD_US);
        assert!(t.scan_select(SCAN_OLD_US + 1, SCAN_OLD_US, HANDOVER_HYSTERESIS_DB, None, false).is_none());
    }

    proptest! {
        /// P5: the scan table holds at most one entry per gateway id, no
        /// matter how many `scan_add` calls (from any mix of gateway ids
        /// and channels) it absorbs.
        #[test]
        fn holds_at_most_one_entry_per_gateway_id_under_arbitrary_writes(
            writes in proptest::collection::vec(
                (1u64..8, -100i8..=0, 0u8..6, 0u64..10_000),
                0..64,
            ),
        ) {
            let mut t = ScanTable::new();
            for (gw, rssi, channel, ts) in writes {
                t.scan_add(beacon(gw, 5), rssi, channel, ts, 1, SCAN_OLD_US);
            }
            let mut seen = heapless::Vec::<NodeId, SCAN_TABLE_CAPACITY>::new();
            for slot in t.entries.iter().flatten() {
                prop_assert!(!seen.contains(&slot.gateway_id));
                let _ = seen.push(slot.gateway_id);
            }
            prop_assert!(seen.len() <= SCAN_TABLE_CAPACITY);
        }
    }
}
