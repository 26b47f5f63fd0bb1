//! MAC core: the slot-driven state machine that drives the radio and
//! timers, corrects drift on beacon reception, and hosts the association
//! sub-state machine.
//!
//! Outer per-slot dispatch (`new_slot`) and an inner intra-slot sub-state
//! (`IntraSlotState`) are kept as two separate levels rather than one flat
//! state enum, with the intra-slot activities realized as match arms on
//! `(timer_channel, intra_slot_state)`.

use log::{debug, trace, warn};

use crate::assoc::{Assoc, AssocState, JoinTimeoutOutcome};
use crate::config::{Config, MAX_FRAME_LEN};
use crate::error::{Error, Stats};
use crate::event::{DisconnectReason, Event, EventSink};
use crate::packet::{Bloom, Body, DecodeError, Frame};
use crate::queue::{NextFrame, Queue};
use crate::radio::{Phy, Radio};
use crate::rng::Rng;
use crate::scan::ScanTable;
use crate::schedule::CellType;
use crate::schedule_table::{self, ScheduleTemplate};
use crate::scheduler::{NodeType, RadioAction, Scheduler, SlotInfo};
use crate::timer::{Timer, TimerChannel};
use crate::NodeId;

/// Drift below which the inter-slot timer is left alone.
const DRIFT_IGNORE_US: i64 = 40;
/// Drift at or above which the slot aborts and association desyncs.
const DRIFT_RESYNC_US: i64 = 150;

/// Inner intra-slot sub-state. Reset to `Sleep` at the end of
/// every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum IntraSlotState {
    Sleep,
    TxOffset,
    TxData,
    RxOffset,
    RxDataListen,
    RxData,
    ScanListen,
    ScanRx,
}

/// The slot-driven MAC, generic over its four ISR-adjacent collaborators:
/// the radio, the high-frequency timer, the byte-random source and the
/// application event sink. `E` is the radio's own error type.
pub struct Mac<R, T, G, S, E> {
    radio: R,
    timer: T,
    rng: G,
    sink: S,
    config: Config,
    node_id: NodeId,

    scheduler: Scheduler,
    queue: Queue,
    scan_table: ScanTable,
    assoc: Assoc,

    asn: u64,
    start_slot_ts: u64,
    intra: IntraSlotState,
    scan_start_ts: u64,
    last_beacon_has_self: bool,
    background_scan_active: bool,
    stats: Stats,

    _marker: core::marker::PhantomData<E>,
}

impl<R, T, G, S, E> Mac<R, T, G, S, E>
where
    R: Radio<E>,
    T: Timer,
    G: Rng,
    S: EventSink,
{
    pub fn new(
        radio: R,
        timer: T,
        rng: G,
        sink: S,
        config: Config,
        node_type: NodeType,
        node_id: NodeId,
        initial_schedule: &ScheduleTemplate,
    ) -> Result<Self, Error<E>> {
        let fixed_channel = config.fixed_channel;
        let mut mac = Self {
            radio,
            timer,
            rng,
            sink,
            config,
            node_id,
            scheduler: Scheduler::init(node_type, node_id, initial_schedule, fixed_channel),
            queue: Queue::new(),
            scan_table: ScanTable::new(),
            assoc: Assoc::new(),
            asn: 0,
            start_slot_ts: 0,
            intra: IntraSlotState::Sleep,
            scan_start_ts: 0,
            last_beacon_has_self: true,
            background_scan_active: false,
            stats: Stats::default(),
            _marker: core::marker::PhantomData,
        };
        mac.radio.init(Phy::Ble2M).map_err(Error::Radio)?;
        Ok(mac)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn is_joined(&self) -> bool {
        self.scheduler.is_gateway() || self.assoc.is_joined()
    }

    pub fn synced_gateway(&self) -> Option<NodeId> {
        self.assoc.synced_gateway()
    }

    /// Enqueue an application payload for transmission (uplink on a node,
    /// broadcast downlink on a gateway).
    pub fn push_data(&mut self, payload: &[u8]) -> Result<(), Error<E>> {
        let mut frame = heapless::Vec::new();
        frame.extend_from_slice(payload).map_err(|_| Error::QueueFull)?;
        self.queue.push_data(frame);
        Ok(())
    }

    /// Explicit application-requested disconnect.
    pub fn disconnect(&mut self) {
        if self.assoc.is_joined() {
            let gateway = self.assoc.synced_gateway();
            self.assoc.disconnect(DisconnectReason::Requested, self.timer.now_us());
            if let Some(gw) = gateway {
                self.sink.on_event(Event::Disconnected(gw, DisconnectReason::Requested));
            }
        }
    }

    fn go_sleep(&mut self) {
        self.timer.cancel(TimerChannel::T1);
        self.timer.cancel(TimerChannel::T2);
        self.timer.cancel(TimerChannel::T3);
        self.radio.disable();
        self.intra = IntraSlotState::Sleep;
    }

    /// `new_slot`: called when the `InterSlot` timer fires.
    pub fn new_slot(&mut self) -> Result<(), Error<E>> {
        self.start_slot_ts = self.timer.now_us();
        self.timer.set_oneshot_with_ref(TimerChannel::InterSlot, self.start_slot_ts, self.config.whole_slot_us());

        let asn = self.asn;
        self.asn += 1;

        if self.scheduler.is_gateway() {
            self.sweep_gateway_liveness(asn);
            let info = self.scheduler.tick(asn);
            self.dispatch_scheduled(asn, info)
        } else {
            if self.background_scan_active {
                self.background_scan_active = false;
                self.finish_background_scan(asn);
            }
            if self.assoc.state() == AssocState::Scanning {
                self.finish_scan_if_due(asn);
            }
            self.dispatch_node(asn)
        }
    }

    fn sweep_gateway_liveness(&mut self, asn: u64) {
        let window = self.scheduler.active_schedule_slot_count() as u64 * self.config.max_slotframes_no_rx_leave as u64;
        for node_id in self.scheduler.sweep_liveness(asn, window) {
            debug!("gateway: evicting node {} for liveness", node_id);
            self.sink.on_event(Event::NodeLeft(node_id, DisconnectReason::PeerLostTimeout));
        }
    }

    fn dispatch_node(&mut self, asn: u64) -> Result<(), Error<E>> {
        match self.assoc.state() {
            AssocState::Idle => {
                self.assoc.start_scanning(self.start_slot_ts);
                self.enter_scan_slot(asn)
            }
            AssocState::Scanning => self.enter_scan_slot(asn),
            AssocState::Synced | AssocState::Joining | AssocState::Joined => self.dispatch_synced_or_joined(asn),
        }
    }

    fn dispatch_synced_or_joined(&mut self, asn: u64) -> Result<(), Error<E>> {
        if self.assoc.state() == AssocState::Joined {
            let gw = self.assoc.synced_gateway();
            if let Some(reason) = self.assoc.check_disconnect(
                asn,
                self.scheduler.active_schedule_slot_count() as u64,
                self.config.max_slotframes_no_rx_leave,
                self.last_beacon_has_self,
                self.start_slot_ts,
            ) {
                self.scheduler.deassign(self.node_id);
                if let Some(gw) = gw {
                    self.sink.on_event(Event::Disconnected(gw, reason));
                }
                return self.enter_scan_slot(asn);
            }
        }

        if self.assoc.state() == AssocState::Synced {
            self.assoc.tick_synced_backoff();
        }
        if matches!(self.assoc.state(), AssocState::Synced | AssocState::Joining) {
            let gw = self.assoc.synced_gateway();
            if let JoinTimeoutOutcome::GiveUp(reason) = self.check_join_timeout() {
                if let Some(gw) = gw {
                    self.sink.on_event(Event::Disconnected(gw, reason));
                }
                return self.enter_scan_slot(asn);
            }
        }

        let info = self.scheduler.tick(asn);

        if info.cell_type == CellType::SharedUplink && self.assoc.state() == AssocState::Synced {
            if self.assoc.backoff_random_time() != 0 {
                self.go_sleep();
                return Ok(());
            }
            self.assoc.try_join(self.start_slot_ts, self.config.joining_timeout_us());
        }

        if self.assoc.state() == AssocState::Joined && info.available_for_scan {
            return self.enter_background_scan_slot(asn);
        }

        self.dispatch_scheduled(asn, info)
    }

    fn check_join_timeout(&mut self) -> JoinTimeoutOutcome {
        let now = self.start_slot_ts;
        let (n_min, n_max) = self.scheduler.backoff_range();
        let outcome = self.assoc.check_join_timeout(now, self.config.join_timeout_since_synced_us, n_min, n_max, &mut self.rng);
        if let JoinTimeoutOutcome::Retry = outcome {
            self.stats.join_collision += 1;
        }
        outcome
    }

    fn dispatch_scheduled(&mut self, asn: u64, info: SlotInfo) -> Result<(), Error<E>> {
        match info.radio_action {
            RadioAction::Sleep => {
                self.go_sleep();
                Ok(())
            }
            RadioAction::Tx => self.tx_activity(asn, &info),
            RadioAction::Rx => self.rx_activity(&info),
        }
    }

    // ---- TX path: Ti1 -> Ti2 -> Ti3 / Tie1 -----------------------------

    fn tx_activity(&mut self, asn: u64, info: &SlotInfo) -> Result<(), Error<E>> {
        let Some(frame) = self.build_tx_frame(asn, info) else {
            trace!("tx: no frame available, sleeping");
            self.go_sleep();
            return Ok(());
        };

        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = frame.encode(&mut buf);
        self.radio.set_channel(info.channel).map_err(Error::Radio)?;
        self.radio.tx_prepare(&buf[..len]).map_err(Error::Radio)?;

        self.intra = IntraSlotState::TxOffset;
        self.timer.set_oneshot_with_ref(TimerChannel::T1, self.start_slot_ts, self.config.tx_offset_us);
        self.timer.set_oneshot_with_ref(
            TimerChannel::T2,
            self.start_slot_ts,
            self.config.tx_offset_us + self.config.tx_max_us(),
        );
        Ok(())
    }

    fn build_tx_frame(&mut self, asn: u64, info: &SlotInfo) -> Option<Frame> {
        if info.cell_type == CellType::Beacon && self.scheduler.is_gateway() {
            let bloom = self.build_bloom();
            let remaining = self.scheduler.remaining_capacity().min(u8::MAX as usize) as u8;
            return Some(Frame::beacon(self.node_id, asn, remaining, self.scheduler.active_schedule_id(), bloom));
        }

        let owned_uplink = info.cell_type == CellType::Uplink && self.scheduler.cell_of(self.node_id) == Some(info.cell_index);
        let next =
            self.queue.next_for_slot(info.cell_type, owned_uplink, self.scheduler.is_gateway(), self.config.keepalive_enabled)?;

        Some(match next {
            NextFrame::JoinRequest(gateway_id) => Frame::join_request(self.node_id, gateway_id),
            NextFrame::JoinResponse(node_id, cell) => Frame::join_response(self.node_id, node_id, cell),
            NextFrame::Data(payload) => {
                let dst = if self.scheduler.is_gateway() { crate::BROADCAST } else { self.assoc.synced_gateway().unwrap_or(0) };
                Frame::data(self.node_id, dst, payload)
            }
            NextFrame::Keepalive => {
                Frame::data(self.node_id, self.assoc.synced_gateway().unwrap_or(0), heapless::Vec::new())
            }
        })
    }

    fn build_bloom(&self) -> Bloom {
        let mut bloom = Bloom::new();
        for id in self.scheduler.joined_node_ids() {
            bloom.insert(id);
        }
        bloom
    }

    // ---- RX path: Ri1 -> Ri2 -> Ri3 -> Ri4 / Rie1 / Rie2 ---------------

    fn rx_activity(&mut self, info: &SlotInfo) -> Result<(), Error<E>> {
        self.radio.set_channel(info.channel).map_err(Error::Radio)?;

        self.intra = IntraSlotState::RxOffset;
        self.timer.set_oneshot_with_ref(TimerChannel::T1, self.start_slot_ts, self.config.rx_offset_us());
        self.timer
            .set_oneshot_with_ref(TimerChannel::T2, self.start_slot_ts, self.config.tx_offset_us + self.config.rx_guard_us);
        self.timer
            .set_oneshot_with_ref(TimerChannel::T3, self.start_slot_ts, self.config.rx_offset_us() + self.config.rx_max_us());
        Ok(())
    }

    fn enter_scan_slot(&mut self, asn: u64) -> Result<(), Error<E>> {
        let channel = self.scan_channel(asn);
        self.radio.set_channel(channel).map_err(Error::Radio)?;
        self.intra = IntraSlotState::ScanListen;
        self.radio.rx().map_err(Error::Radio)?;
        Ok(())
    }

    /// Background scan (spec §4.4): a `Joined` node listens for a single
    /// slot on a cell it would otherwise sleep through, looking for a
    /// stronger candidate gateway to hand over to.
    fn enter_background_scan_slot(&mut self, asn: u64) -> Result<(), Error<E>> {
        self.background_scan_active = true;
        self.enter_scan_slot(asn)
    }

    fn scan_channel(&self, asn: u64) -> u8 {
        crate::channel_hop::beacon_channel((asn % 3) as usize, self.config.fixed_channel)
    }

    /// Timer callback dispatch for `T1`/`T2`/`T3` (the platform integration
    /// routes `InterSlot` straight to [`Self::new_slot`]).
    pub fn on_timer(&mut self, channel: TimerChannel) -> Result<(), Error<E>> {
        match (channel, self.intra) {
            (TimerChannel::T1, IntraSlotState::TxOffset) => {
                self.intra = IntraSlotState::TxData;
                self.radio.tx_dispatch().map_err(Error::Radio)
            }
            (TimerChannel::T2, IntraSlotState::TxOffset) | (TimerChannel::T2, IntraSlotState::TxData) => {
                // Tie1: transmission overran.
                self.stats.transient_radio_abort += 1;
                self.go_sleep();
                Ok(())
            }
            (TimerChannel::T1, IntraSlotState::RxOffset) => {
                self.intra = IntraSlotState::RxDataListen;
                self.radio.rx().map_err(Error::Radio)
            }
            (TimerChannel::T2, IntraSlotState::RxOffset) => {
                // Rie1: guard expired with no preamble.
                self.go_sleep();
                Ok(())
            }
            (TimerChannel::T3, IntraSlotState::RxDataListen) | (TimerChannel::T3, IntraSlotState::RxData) => {
                // Rie2: overran.
                self.stats.transient_radio_abort += 1;
                self.go_sleep();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Radio start-of-frame ISR, `ts` is the hardware-captured microsecond
    /// timestamp.
    pub fn on_start_frame(&mut self, ts: u64) -> Result<(), Error<E>> {
        match self.intra {
            IntraSlotState::RxDataListen => {
                self.intra = IntraSlotState::RxData;
                self.timer.cancel(TimerChannel::T2);
                self.apply_drift_correction(ts)
            }
            IntraSlotState::ScanListen => {
                self.intra = IntraSlotState::ScanRx;
                self.scan_start_ts = ts;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn apply_drift_correction(&mut self, ts: u64) -> Result<(), Error<E>> {
        let expected = self.start_slot_ts + self.config.tx_offset_us as u64 + self.config.radio_delay_us as u64;
        let drift = ts as i64 - expected as i64;

        if drift.abs() < DRIFT_IGNORE_US {
            return Ok(());
        }
        if drift.abs() < DRIFT_RESYNC_US {
            let whole = self.config.whole_slot_us() as i64;
            let total = (whole + drift).max(0) as u32;
            self.timer.set_oneshot_with_ref_diff(TimerChannel::InterSlot, self.start_slot_ts, total);
            return Ok(());
        }

        warn!("mac: drift {} us exceeds resync threshold, desyncing", drift);
        self.timer.cancel(TimerChannel::T3);
        self.go_sleep();
        if !self.scheduler.is_gateway() {
            let gw = self.assoc.synced_gateway();
            self.scheduler.deassign(self.node_id);
            self.assoc.disconnect(DisconnectReason::DriftResync, self.start_slot_ts);
            if let Some(gw) = gw {
                self.sink.on_event(Event::Disconnected(gw, DisconnectReason::DriftResync));
            }
        }
        Ok(())
    }

    /// Radio end-of-frame ISR.
    pub fn on_end_frame(&mut self) -> Result<(), Error<E>> {
        match self.intra {
            IntraSlotState::TxData => {
                self.timer.cancel(TimerChannel::T2);
                self.go_sleep();
                Ok(())
            }
            IntraSlotState::RxData => {
                self.timer.cancel(TimerChannel::T3);
                self.intra = IntraSlotState::Sleep;
                self.radio.disable();
                self.process_received_frame()
            }
            IntraSlotState::ScanRx => {
                self.process_scan_frame();
                self.radio.disable();
                self.intra = IntraSlotState::Sleep;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn process_received_frame(&mut self) -> Result<(), Error<E>> {
        if !self.radio.pending_rx_read() {
            return Ok(());
        }
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = self.radio.get_rx_packet(&mut buf);
        let frame = match Frame::decode(&buf[..len]) {
            Ok(f) => f,
            Err(DecodeError::BadVersion) => {
                self.stats.bad_protocol_version += 1;
                return Ok(());
            }
            Err(_) => return Ok(()),
        };

        if frame.header.dst != self.node_id && !frame.is_broadcast() {
            return Ok(());
        }

        let asn = self.asn.saturating_sub(1);
        match frame.body {
            Body::Beacon { remaining_capacity, active_schedule_id, bloom, .. } => {
                self.last_beacon_has_self = bloom.contains(self.node_id);
                self.assoc.note_rx_from_gateway(asn);
                self.assoc.note_remaining_capacity(remaining_capacity);
                if active_schedule_id != self.scheduler.active_schedule_id() && !self.scheduler.set_schedule(active_schedule_id) {
                    self.stats.unknown_schedule += 1;
                }
            }
            Body::JoinRequest if self.scheduler.is_gateway() => {
                self.scheduler.register_rx(frame.header.src, asn);
                if let Some(idx) = self.scheduler.cell_of(frame.header.src) {
                    // Retransmitted request (its JoinResponse was lost):
                    // re-queue for the cell it already holds, don't reassign.
                    self.queue.set_join_response(frame.header.src, idx as u16);
                } else if let Some(cell) = self.scheduler.assign_next_uplink(frame.header.src) {
                    self.queue.set_join_response(frame.header.src, cell as u16);
                    self.sink.on_event(Event::NodeJoined(frame.header.src));
                }
            }
            Body::JoinResponse { .. } if !self.scheduler.is_gateway() => {
                self.queue.clear_join_packet();
                self.assoc.joined(self.start_slot_ts);
                if let Some(gw) = self.assoc.synced_gateway() {
                    self.sink.on_event(Event::Connected(gw));
                }
            }
            Body::Data { payload } => {
                self.scheduler.register_rx(frame.header.src, asn);
                self.sink.on_event(Event::NewPacket(payload));
            }
            _ => {}
        }
        Ok(())
    }

    fn process_scan_frame(&mut self) {
        if !self.radio.pending_rx_read() {
            return;
        }
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = self.radio.get_rx_packet(&mut buf);
        let Ok(frame) = Frame::decode(&buf[..len]) else { return };
        let Body::Beacon { asn: beacon_asn, remaining_capacity, active_schedule_id, bloom } = frame.body else { return };
        if remaining_capacity == 0 {
            return;
        }
        let beacon = crate::scan::BeaconInfo {
            version: frame.header.version,
            asn: beacon_asn,
            remaining_capacity,
            active_schedule_id,
            src: frame.header.src,
            bloom,
        };
        let current_asn = self.asn.saturating_sub(1);
        let channel = self.scan_channel(current_asn);
        let rssi = self.radio.rssi();
        self.scan_table.scan_add(beacon, rssi, channel, self.scan_start_ts, current_asn, self.config.scan_old_us);
    }

    /// Called once the foreground scan window (`SCAN_MAX_SLOTS`) elapses, to
    /// pick a gateway and synchronize.
    fn finish_scan_if_due(&mut self, asn: u64) {
        if self.assoc.tick_scanning() {
            self.select_gateway_and_sync(asn, false);
        }
    }

    /// Called the slot after a background scan (spec §4.4): evaluates the
    /// single sample it gathered for a handover candidate. A no-op if the
    /// node disconnected for some other reason during the scan slot.
    fn finish_background_scan(&mut self, asn: u64) {
        if self.assoc.state() == AssocState::Joined {
            self.select_gateway_and_sync(asn, true);
        }
    }

    fn select_gateway_and_sync(&mut self, asn: u64, background_while_joined: bool) {
        let current = self
            .assoc
            .synced_gateway()
            .filter(|_| background_while_joined)
            .map(|gw| (gw, self.radio.rssi()));
        let Some(candidate) = self.scan_table.scan_select(
            self.start_slot_ts,
            self.config.scan_old_us,
            self.config.handover_hysteresis_db,
            current,
            background_while_joined,
        ) else {
            if !background_while_joined {
                self.assoc.scan_failed(self.start_slot_ts);
            }
            return;
        };

        if background_while_joined {
            // Hysteresis cleared: leave the current gateway for the
            // stronger candidate found in the background scan.
            let old_gateway = self.assoc.synced_gateway();
            self.scheduler.deassign(self.node_id);
            if let Some(gw) = old_gateway {
                self.sink.on_event(Event::Disconnected(gw, DisconnectReason::Handover));
            }
        }

        self.scheduler.set_schedule(candidate.beacon.active_schedule_id);

        let asn_since_beacon = asn.saturating_sub(candidate.captured_asn) + 2;
        self.asn = candidate.beacon.asn + asn_since_beacon - 1;

        let whole_slot = self.config.whole_slot_us() as i64;
        let gateway_ts = candidate.timestamp as i64 - self.config.tx_offset_us as i64 + asn_since_beacon as i64 * whole_slot;
        let sync_diff = gateway_ts - self.start_slot_ts as i64 - self.config.radio_delay_us as i64;

        self.start_slot_ts = (self.start_slot_ts as i64 + sync_diff).max(0) as u64;
        self.timer.set_oneshot_with_ref(TimerChannel::InterSlot, self.start_slot_ts, self.config.whole_slot_us());

        self.assoc.synced(candidate.gateway_id, candidate.beacon.remaining_capacity, self.start_slot_ts);
        self.queue.set_join_request(candidate.gateway_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::mock::RecordingSink;
    use crate::radio::mock::MockRadio;
    use crate::rng::mock::MockRng;
    use crate::timer::mock::MockTimer;

    type TestMac = Mac<MockRadio, MockTimer, MockRng, RecordingSink, ()>;

    fn gateway() -> TestMac {
        Mac::new(
            MockRadio::new(),
            MockTimer::new(),
            MockRng::new(&[1, 2, 3, 4]),
            RecordingSink::default(),
            Config::default(),
            NodeType::Gateway,
            1,
            schedule_table::SCHEDULE_MINUSCULE,
        )
        .unwrap()
    }

    fn node(id: NodeId) -> TestMac {
        Mac::new(
            MockRadio::new(),
            MockTimer::new(),
            MockRng::new(&[1, 2, 3, 4]),
            RecordingSink::default(),
            Config::default(),
            NodeType::Node,
            id,
            schedule_table::SCHEDULE_MINUSCULE,
        )
        .unwrap()
    }

    #[test]
    fn gateway_beacons_on_first_slot() {
        let mut m = gateway();
        m.new_slot().unwrap();
        assert_eq!(m.intra, IntraSlotState::TxOffset);
        assert!(matches!(m.radio.calls.last(), Some(crate::radio::mock::Call::TxPrepare(_))));
    }

    #[test]
    fn tx_with_empty_queue_on_owned_uplink_goes_to_sleep() {
        let mut m = node(7);
        m.scheduler.assign_next_uplink(7);
        let idx = m.scheduler.cell_of(7).unwrap();
        m.assoc.start_scanning(0);
        m.assoc.synced(1, 5, 0);
        m.assoc.try_join(0, 100_000);
        m.assoc.joined(0);
        m.asn = idx as u64;
        m.new_slot().unwrap();
        assert_eq!(m.intra, IntraSlotState::Sleep);
    }

    #[test]
    fn tx_overrun_is_recovered_locally() {
        let mut m = gateway();
        m.new_slot().unwrap();
        m.on_timer(TimerChannel::T2).unwrap();
        assert_eq!(m.intra, IntraSlotState::Sleep);
        assert_eq!(m.stats().transient_radio_abort, 1);
    }

    #[test]
    fn small_drift_is_ignored() {
        let mut m = node(7);
        m.intra = IntraSlotState::RxDataListen;
        m.start_slot_ts = 0;
        let expected = m.config.tx_offset_us as u64;
        m.on_start_frame(expected + 10).unwrap();
        assert!(!m.timer.is_armed(TimerChannel::InterSlot));
    }

    #[test]
    fn moderate_drift_reprograms_inter_slot_timer() {
        let mut m = node(7);
        m.intra = IntraSlotState::RxDataListen;
        m.start_slot_ts = 0;
        let expected = m.config.tx_offset_us as u64;
        m.on_start_frame(expected + 100).unwrap();
        let whole = m.config.whole_slot_us() as u64;
        assert_eq!(m.timer.deadline(TimerChannel::InterSlot), Some(whole + 100));
    }

    #[test]
    fn large_drift_desyncs_to_idle() {
        let mut m = node(7);
        m.assoc.start_scanning(0);
        m.assoc.synced(1, 5, 0);
        m.assoc.try_join(0, 100_000);
        m.assoc.joined(0);
        m.intra = IntraSlotState::RxDataListen;
        m.start_slot_ts = 0;
        let expected = m.config.tx_offset_us as u64;
        m.on_start_frame(expected + 500).unwrap();
        assert_eq!(m.assoc.state(), AssocState::Idle);
    }

    #[test]
    fn join_request_is_admitted_and_response_queued() {
        let mut m = gateway();
        let frame = Frame::join_request(42, 1);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = frame.encode(&mut buf);
        m.radio.inject_rx(&buf[..len]);
        m.intra = IntraSlotState::RxData;
        m.asn = 4;
        m.on_end_frame().unwrap();
        assert!(m.queue.has_join_packet());
        assert!(matches!(m.sink.events.last(), Some(Event::NodeJoined(42))));
    }

    #[test]
    fn retransmitted_join_request_reuses_existing_cell_without_reassigning() {
        let mut m = gateway();
        let idx = m.scheduler.assign_next_uplink(42).unwrap();
        m.scheduler.register_rx(42, 1);

        let frame = Frame::join_request(42, 1);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = frame.encode(&mut buf);
        m.radio.inject_rx(&buf[..len]);
        m.intra = IntraSlotState::RxData;
        m.asn = 4;
        m.on_end_frame().unwrap();

        assert!(m.queue.has_join_packet());
        assert_eq!(m.scheduler.cell_of(42), Some(idx));
        assert!(m.sink.events.is_empty());
        assert_eq!(m.scheduler.remaining_capacity(), 4);
    }

    #[test]
    fn join_response_marks_node_joined_and_emits_connected() {
        let mut m = node(7);
        m.assoc.start_scanning(0);
        m.assoc.synced(1, 5, 0);
        m.assoc.try_join(0, 100_000);
        let frame = Frame::join_response(1, 7, 3);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = frame.encode(&mut buf);
        m.radio.inject_rx(&buf[..len]);
        m.intra = IntraSlotState::RxData;
        m.on_end_frame().unwrap();
        assert_eq!(m.assoc.state(), AssocState::Joined);
        assert!(matches!(m.sink.events.last(), Some(Event::Connected(1))));
    }

    #[test]
    fn background_scan_hands_over_to_stronger_gateway() {
        let mut m = node(7);
        m.assoc.start_scanning(0);
        m.assoc.synced(1, 5, 0);
        m.assoc.try_join(0, 100_000);
        m.assoc.joined(0);
        m.scheduler.assign_next_uplink(7);
        m.radio.rssi = -80;
        m.start_slot_ts = 1_000;

        let beacon = crate::scan::BeaconInfo {
            version: crate::packet::PROTOCOL_VERSION,
            asn: 1,
            remaining_capacity: 5,
            active_schedule_id: 6,
            src: 99,
            bloom: Bloom::new(),
        };
        m.scan_table.scan_add(beacon, -30, 0, 900, 1, m.config.scan_old_us);

        m.select_gateway_and_sync(5, true);

        assert_eq!(m.assoc.state(), AssocState::Synced);
        assert_eq!(m.assoc.synced_gateway(), Some(99));
        assert_eq!(m.scheduler.cell_of(7), None);
        assert!(matches!(m.sink.events.last(), Some(Event::Disconnected(1, DisconnectReason::Handover))));
    }

    #[test]
    fn background_scan_stays_put_without_hysteresis_margin() {
        let mut m = node(7);
        m.assoc.start_scanning(0);
        m.assoc.synced(1, 5, 0);
        m.assoc.try_join(0, 100_000);
        m.assoc.joined(0);
        let idx = m.scheduler.assign_next_uplink(7).unwrap();
        m.radio.rssi = -40;
        m.start_slot_ts = 1_000;

        let beacon = crate::scan::BeaconInfo {
            version: crate::packet::PROTOCOL_VERSION,
            asn: 1,
            remaining_capacity: 5,
            active_schedule_id: 6,
            src: 99,
            bloom: Bloom::new(),
        };
        m.scan_table.scan_add(beacon, -35, 0, 900, 1, m.config.scan_old_us);

        m.select_gateway_and_sync(5, true);

        assert_eq!(m.assoc.state(), AssocState::Joined);
        assert_eq!(m.assoc.synced_gateway(), Some(1));
        assert_eq!(m.scheduler.cell_of(7), Some(idx));
        assert!(m.sink.events.is_empty());
    }
}
