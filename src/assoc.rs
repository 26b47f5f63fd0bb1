//! Association state machine.
//!
//! This is its own component that [`crate::mac::Mac`] drives by calling
//! these methods and reading [`Assoc::state`], rather than a `join_state`
//! field folded directly into the MAC.

use crate::event::DisconnectReason;
use crate::rng::Rng;
use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AssocState {
    Idle,
    Scanning,
    Synced,
    Joining,
    Joined,
}

/// Binary-exponential backoff state for join-request retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// `-1` means unset (no collision registered yet).
    n: i16,
    pub random_time: u16,
}

impl Backoff {
    const fn unset() -> Self {
        Self { n: -1, random_time: 0 }
    }

    pub fn n(&self) -> Option<u8> {
        if self.n < 0 {
            None
        } else {
            Some(self.n as u8)
        }
    }

    /// Applies one exponential-backoff step (P4): `n` grows from
    /// `backoff_n_min` towards `backoff_n_max`, and `random_time` is
    /// resampled uniformly in `[0, 2^n - 1]`.
    fn register_collision(&mut self, rng: &mut impl Rng, n_min: u8, n_max: u8) {
        self.n = if self.n < 0 {
            n_min as i16
        } else {
            (self.n + 1).min(n_max as i16)
        };
        let n = self.n as u32;
        let sample = rng.next_u32();
        let modulus = 1u32 << n;
        self.random_time = (sample % modulus) as u16;
    }

    fn reset(&mut self) {
        *self = Self::unset();
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::unset()
    }
}

/// Node-side association bookkeeping. The gateway does not run
/// this state machine — its liveness tracking lives in
/// [`crate::scheduler::Scheduler`].
pub struct Assoc {
    state: AssocState,
    last_state_change_ts: u64,
    last_received_from_gateway_asn: u64,
    backoff: Backoff,
    join_response_timeout_ts: u64,
    synced_gateway: NodeId,
    synced_gateway_remaining_capacity: u8,
    synced_ts: u64,
    scan_slots_elapsed: usize,
}

impl Assoc {
    pub fn new() -> Self {
        Self {
            state: AssocState::Idle,
            last_state_change_ts: 0,
            last_received_from_gateway_asn: 0,
            backoff: Backoff::unset(),
            join_response_timeout_ts: 0,
            synced_gateway: 0,
            synced_gateway_remaining_capacity: 0,
            synced_ts: 0,
            scan_slots_elapsed: 0,
        }
    }

    pub fn state(&self) -> AssocState {
        self.state
    }

    pub fn is_joined(&self) -> bool {
        self.state == AssocState::Joined
    }

    pub fn synced_gateway(&self) -> Option<NodeId> {
        (self.state != AssocState::Idle && self.synced_gateway != 0).then_some(self.synced_gateway)
    }

    pub fn backoff_random_time(&self) -> u16 {
        self.backoff.random_time
    }

    fn transition(&mut self, next: AssocState, now_ts: u64) {
        self.state = next;
        self.last_state_change_ts = now_ts;
    }

    /// Idle → Scanning: adopted on the next slot tick while idle.
    pub fn start_scanning(&mut self, now_ts: u64) {
        self.scan_slots_elapsed = 0;
        self.transition(AssocState::Scanning, now_ts);
    }

    /// Called once per slot while `Scanning`; returns `true` once
    /// `SCAN_MAX_SLOTS` have elapsed without a candidate (caller should then
    /// call [`Self::scan_failed`]).
    pub fn tick_scanning(&mut self) -> bool {
        self.scan_slots_elapsed += 1;
        self.scan_slots_elapsed >= crate::schedule_table::SCAN_MAX_SLOTS
    }

    /// Scanning → Idle: scan window elapsed without a selectable gateway.
    pub fn scan_failed(&mut self, now_ts: u64) {
        self.transition(AssocState::Idle, now_ts);
    }

    /// Scanning → Synced: `select_gateway_and_sync` found a candidate.
    /// Resets backoff; the caller is responsible for enqueueing the
    /// `JoinRequest` targeted at `gateway_id`.
    pub fn synced(&mut self, gateway_id: NodeId, remaining_capacity: u8, now_ts: u64) {
        self.synced_gateway = gateway_id;
        self.synced_gateway_remaining_capacity = remaining_capacity;
        self.synced_ts = now_ts;
        self.backoff.reset();
        self.transition(AssocState::Synced, now_ts);
    }

    /// Call once per slot while `Synced`: decrements the backoff counter.
    pub fn tick_synced_backoff(&mut self) {
        if self.backoff.random_time > 0 {
            self.backoff.random_time -= 1;
        }
    }

    /// Synced → Joining: eligible on the first `SharedUplink` slot where
    /// `backoff_random_time == 0`.
    pub fn try_join(&mut self, now_ts: u64, joining_timeout_us: u64) -> bool {
        if self.state == AssocState::Synced && self.backoff.random_time == 0 {
            self.join_response_timeout_ts = now_ts + joining_timeout_us;
            self.transition(AssocState::Joining, now_ts);
            true
        } else {
            false
        }
    }

    /// Joining → Joined: a `JoinResponse` addressed to self arrived.
    pub fn joined(&mut self, now_ts: u64) {
        self.backoff.reset();
        self.transition(AssocState::Joined, now_ts);
    }
}

/// What to do when `join_response_timeout_ts` has expired while `Joining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTimeoutOutcome {
    /// Re-enqueue a `JoinRequest` and retry with backoff (`JoinCollision`).
    Retry,
    /// Capacity is exhausted, or too long has passed since sync: give up
    /// (`JoinTimeout`).
    GiveUp(DisconnectReason),
    /// No timeout yet.
    StillWaiting,
}

impl Assoc {
    /// Checks (and, on expiry, acts on) the `JOINING_TIMEOUT` deadline.
    pub fn check_join_timeout(
        &mut self,
        now_ts: u64,
        join_timeout_since_synced_us: u64,
        n_min: u8,
        n_max: u8,
        rng: &mut impl Rng,
    ) -> JoinTimeoutOutcome {
        if self.state != AssocState::Joining || now_ts < self.join_response_timeout_ts {
            return JoinTimeoutOutcome::StillWaiting;
        }

        if now_ts.saturating_sub(self.synced_ts) > join_timeout_since_synced_us {
            self.backoff.reset();
            self.transition(AssocState::Idle, now_ts);
            return JoinTimeoutOutcome::GiveUp(DisconnectReason::JoinTimeoutSinceSynced);
        }

        if self.synced_gateway_remaining_capacity == 0 {
            self.backoff.reset();
            self.transition(AssocState::Idle, now_ts);
            return JoinTimeoutOutcome::GiveUp(DisconnectReason::CapacityExhausted);
        }

        self.backoff.register_collision(rng, n_min, n_max);
        self.transition(AssocState::Synced, now_ts);
        JoinTimeoutOutcome::Retry
    }

    /// Updates the liveness stamp used by [`Self::check_disconnect`].
    pub fn note_rx_from_gateway(&mut self, asn: u64) {
        self.last_received_from_gateway_asn = asn;
    }

    pub fn note_remaining_capacity(&mut self, remaining_capacity: u8) {
        self.synced_gateway_remaining_capacity = remaining_capacity;
    }

    /// Joined → Idle checks: peer-lost timeout or bloom
    /// eviction. `in_bloom` is whether the latest beacon's bloom still
    /// contains this node's own id.
    pub fn check_disconnect(
        &mut self,
        asn: u64,
        slotframe_len: u64,
        max_slotframes_no_rx_leave: u32,
        in_bloom: bool,
        now_ts: u64,
    ) -> Option<DisconnectReason> {
        if self.state != AssocState::Joined {
            return None;
        }

        let liveness_window = slotframe_len * max_slotframes_no_rx_leave as u64;
        if asn.saturating_sub(self.last_received_from_gateway_asn) > liveness_window {
            self.disconnect(DisconnectReason::PeerLostTimeout, now_ts);
            return Some(DisconnectReason::PeerLostTimeout);
        }
        if !in_bloom {
            self.disconnect(DisconnectReason::PeerLostBloom, now_ts);
            return Some(DisconnectReason::PeerLostBloom);
        }
        None
    }

    /// Explicit application-requested disconnect, or a drift-triggered
    /// re-sync.
    pub fn disconnect(&mut self, reason: DisconnectReason, now_ts: u64) -> DisconnectReason {
        let _ = reason;
        self.synced_gateway = 0;
        self.transition(AssocState::Idle, now_ts);
        reason
    }
}

impl Default for Assoc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rng::mock::MockRng;
    use proptest::prelude::*;

    #[test]
    fn backoff_grows_and_stays_in_range() {
        let mut rng = MockRng::new(&[0xAB, 0xCD, 0x01, 0x02, 0x03]);
        let mut b = Backoff::unset();
        let mut ns = heapless::Vec::<u8, 8>::new();
        for _ in 0..6 {
            b.register_collision(&mut rng, 5, 9);
            let n = b.n().unwrap();
            let _ = ns.push(n);
            assert!((b.random_time as u32) < (1u32 << n));
        }
        assert_eq!(ns.as_slice(), &[5, 6, 7, 8, 9, 9]);
    }

    #[test]
    fn synced_eligible_to_join_immediately() {
        let mut a = Assoc::new();
        a.start_scanning(0);
        a.synced(7, 5, 10);
        assert_eq!(a.backoff_random_time(), 0);
        assert!(a.try_join(11, 450));
        assert_eq!(a.state(), AssocState::Joining);
    }

    #[test]
    fn join_timeout_retries_then_gives_up_on_zero_capacity() {
        let mut rng = MockRng::new(&[1, 2, 3, 4, 5]);
        let mut a = Assoc::new();
        a.start_scanning(0);
        a.synced(7, 1, 0);
        a.try_join(0, 450);

        let outcome = a.check_join_timeout(451, 5_000_000, 5, 9, &mut rng);
        assert_eq!(outcome, JoinTimeoutOutcome::Retry);
        assert_eq!(a.state(), AssocState::Synced);

        a.note_remaining_capacity(0);
        a.try_join(451, 450);
        let outcome = a.check_join_timeout(902, 5_000_000, 5, 9, &mut rng);
        assert_eq!(outcome, JoinTimeoutOutcome::GiveUp(DisconnectReason::CapacityExhausted));
        assert_eq!(a.state(), AssocState::Idle);
        assert_eq!(a.backoff.n(), None);
        assert_eq!(a.backoff_random_time(), 0);
    }

    #[test]
    fn join_timeout_since_synced_gives_up_and_resets_backoff() {
        let mut rng = MockRng::new(&[1, 2, 3, 4, 5]);
        let mut a = Assoc::new();
        a.start_scanning(0);
        a.synced(7, 5, 0);
        a.try_join(0, 450);

        let outcome = a.check_join_timeout(5_000_451, 5_000_000, 5, 9, &mut rng);
        assert_eq!(outcome, JoinTimeoutOutcome::GiveUp(DisconnectReason::JoinTimeoutSinceSynced));
        assert_eq!(a.state(), AssocState::Idle);
        assert_eq!(a.backoff.n(), None);
        assert_eq!(a.backoff_random_time(), 0);
    }

    #[test]
    fn peer_lost_timeout_disconnects() {
        let mut a = Assoc::new();
        a.start_scanning(0);
        a.synced(7, 5, 0);
        a.try_join(0, 450);
        a.joined(500);
        a.note_rx_from_gateway(0);

        let reason = a.check_disconnect(56, 11, 5, true, 10_000);
        assert_eq!(reason, Some(DisconnectReason::PeerLostTimeout));
        assert_eq!(a.state(), AssocState::Idle);
    }

    #[test]
    fn bloom_eviction_disconnects_when_still_live() {
        let mut a = Assoc::new();
        a.start_scanning(0);
        a.synced(7, 5, 0);
        a.try_join(0, 450);
        a.joined(500);
        a.note_rx_from_gateway(10);

        let reason = a.check_disconnect(10, 11, 5, false, 10_000);
        assert_eq!(reason, Some(DisconnectReason::PeerLostBloom));
    }

    proptest! {
        /// P4: `backoff_random_time in [0, 2^n - 1]` with `n in
        /// [backoff_n_min, backoff_n_max]` after any number of collisions,
        /// for arbitrary RNG bytes and a valid `(n_min, n_max)` range.
        #[test]
        fn backoff_stays_in_range_for_any_rng_bytes(
            bytes in proptest::collection::vec(any::<u8>(), 1..32),
            n_min in 1u8..10,
            extra in 0u8..8,
            collisions in 1usize..20,
        ) {
            let n_max = n_min + extra;
            let mut rng = MockRng::new(&bytes);
            let mut b = Backoff::unset();
            for _ in 0..collisions {
                b.register_collision(&mut rng, n_min, n_max);
                let n = b.n().unwrap();
                prop_assert!(n >= n_min && n <= n_max);
                prop_assert!((b.random_time as u32) < (1u32 << n));
            }
        }
    }
}
