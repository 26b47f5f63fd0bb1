//! Timing constants and per-instance configuration.
//!
//! Defaults mirror the constants table in the MAC specification; all
//! durations are expressed in microseconds unless noted.

/// Maximum on-wire frame size.
pub const MAX_FRAME_LEN: usize = 255;

/// Mean time-on-air for a maximum-size frame at 2 Mbps, used to derive the
/// TX/RX slot budgets (`4 * MAX_FRAME_LEN`).
pub const PACKET_TOA_US: u32 = 4 * MAX_FRAME_LEN as u32;

/// Number of device-liveness-tracking slotframes a node tolerates without
/// receiving anything from its gateway before declaring the link lost.
pub const DEFAULT_MAX_SLOTFRAMES_NO_RX_LEAVE: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Delay from the start of a slot to arming the transmitter.
    pub tx_offset_us: u32,
    /// Guard time reserved for receiver turn-on before the expected
    /// preamble.
    pub rx_guard_us: u32,
    /// Guard time reserved at the end of a slot, after the last possible
    /// frame end, before the next slot may start.
    pub end_guard_us: u32,

    /// Freshness window for scan-table entries and scan-selection samples.
    pub scan_old_us: u64,
    /// Minimum RSSI improvement (dBm) required to hand over from the
    /// currently synced gateway to a better-looking candidate found during
    /// a background scan.
    pub handover_hysteresis_db: i8,

    /// Time since last successful sync after which a stalled join attempt
    /// gives up entirely (returns to `Idle`).
    pub join_timeout_since_synced_us: u64,
    /// Number of consecutive slotframes without an RX from the gateway
    /// after which a joined node declares the peer lost.
    pub max_slotframes_no_rx_leave: u32,

    /// Fixed radio TX/RX chain latency plus propagation delay (`δ_radio`),
    /// used to compute the expected start-of-frame timestamp for drift
    /// correction. Platform specific; pinned here per deployment.
    pub radio_delay_us: u32,

    /// Fix the radio to a single data channel instead of hopping (mainly
    /// useful for tests and wired/coax bench setups).
    pub fixed_channel: Option<u8>,
    /// Send a zero-length keepalive frame in an owned uplink cell when
    /// there is no application data queued, so the gateway's liveness
    /// tracking does not expire the cell.
    pub keepalive_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tx_offset_us: 300,
            rx_guard_us: 150,
            end_guard_us: 150,

            scan_old_us: 500_000,
            handover_hysteresis_db: 9,

            join_timeout_since_synced_us: 5_000_000,
            max_slotframes_no_rx_leave: DEFAULT_MAX_SLOTFRAMES_NO_RX_LEAVE,

            radio_delay_us: 0,
            fixed_channel: None,
            keepalive_enabled: false,
        }
    }
}

impl Config {
    /// Delay from the start of a slot to arming the receiver
    /// (`tx_offset_us - rx_guard_us`).
    pub fn rx_offset_us(&self) -> u32 {
        self.tx_offset_us - self.rx_guard_us
    }

    /// Upper bound on transmit time-on-air plus a small scheduling margin.
    pub fn tx_max_us(&self) -> u32 {
        PACKET_TOA_US + 50
    }

    /// Upper bound on receive time, including the guard before the
    /// preamble.
    pub fn rx_max_us(&self) -> u32 {
        self.rx_guard_us + self.tx_max_us()
    }

    /// Total slot duration.
    pub fn whole_slot_us(&self) -> u32 {
        self.tx_offset_us + self.tx_max_us() + self.end_guard_us
    }

    /// Deadline for a pending join request before it is considered a
    /// collision and retried with backoff (`1.5 * whole_slot_us`).
    pub fn joining_timeout_us(&self) -> u64 {
        (self.whole_slot_us() as u64 * 3) / 2
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_timing_matches_spec() {
        let c = Config::default();
        assert_eq!(c.tx_offset_us, 300);
        assert_eq!(c.rx_guard_us, 150);
        assert_eq!(c.rx_offset_us(), 150);
        assert_eq!(c.tx_max_us(), 4 * 255 + 50);
        assert_eq!(c.rx_max_us(), 150 + 4 * 255 + 50);
        assert_eq!(c.whole_slot_us(), 300 + 4 * 255 + 50 + 150);
        assert_eq!(c.joining_timeout_us(), (c.whole_slot_us() as u64 * 3) / 2);
    }
}
