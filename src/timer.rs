//! High-frequency timer collaborator.
//!
//! Timer "channels" are a hardware multiplexing artifact on the reference
//! platform; this crate models them as the [`TimerChannel`] enum rather
//! than raw integers. The trait carries no callback storage (there is no
//! allocator to box one in) — firing is delivered by the platform
//! integration layer calling [`crate::mac::Mac::on_timer`].

/// Named one-shot/periodic timer channel. `InterSlot` is the single source
/// of truth for slot timing; `T1`-`T3` are intra-slot and are all
/// cancelled at the end of every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerChannel {
    InterSlot,
    T1,
    T2,
    T3,
}

/// Monotonic microsecond-resolution timer with named one-shot channels.
///
/// All methods are relative to the same unknown epoch. Re-arming an
/// already-armed channel overrides it — this is intentional and is relied
/// on by drift correction to reprogram `InterSlot` mid-slot.
pub trait Timer {
    /// Current time in microseconds since some unknown epoch.
    fn now_us(&self) -> u64;

    /// Arm `channel` to fire `duration_us` after `ref_ts`.
    fn set_oneshot_with_ref(&mut self, channel: TimerChannel, ref_ts: u64, duration_us: u32);

    /// Arm `channel` so that exactly `total_us` will have elapsed since
    /// `ref_ts` when it fires, rather than `duration_us` after now — used
    /// when re-arming against a reference timestamp that was itself just
    /// adjusted (drift correction) without re-deriving the remaining
    /// duration by hand.
    fn set_oneshot_with_ref_diff(&mut self, channel: TimerChannel, ref_ts: u64, total_us: u32);

    /// Arm `channel` to fire every `period_us`.
    fn set_periodic(&mut self, channel: TimerChannel, period_us: u32);

    /// Disarm `channel`, if armed.
    fn cancel(&mut self, channel: TimerChannel);
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Armed {
        Oneshot(u64),
        Periodic(u32),
    }

    /// Deterministic timer for tests: time only moves when [`MockTimer::set_now`]
    /// or [`MockTimer::advance`] is called.
    #[derive(Debug, Clone, Default)]
    pub struct MockTimer {
        now: u64,
        channels: [Option<Armed>; 4],
    }

    fn idx(channel: TimerChannel) -> usize {
        match channel {
            TimerChannel::InterSlot => 0,
            TimerChannel::T1 => 1,
            TimerChannel::T2 => 2,
            TimerChannel::T3 => 3,
        }
    }

    impl MockTimer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_now(&mut self, now: u64) {
            self.now = now;
        }

        pub fn advance(&mut self, delta_us: u64) {
            self.now += delta_us;
        }

        /// Absolute deadline currently armed on `channel`, if any.
        pub fn deadline(&self, channel: TimerChannel) -> Option<u64> {
            match self.channels[idx(channel)] {
                Some(Armed::Oneshot(ts)) => Some(ts),
                _ => None,
            }
        }

        pub fn is_armed(&self, channel: TimerChannel) -> bool {
            self.channels[idx(channel)].is_some()
        }

        /// Channels whose deadline is at or before `now()`, in channel order.
        pub fn due(&self) -> heapless::Vec<TimerChannel, 4> {
            let mut out = heapless::Vec::new();
            for ch in [
                TimerChannel::InterSlot,
                TimerChannel::T1,
                TimerChannel::T2,
                TimerChannel::T3,
            ] {
                if let Some(Armed::Oneshot(ts)) = self.channels[idx(ch)] {
                    if ts <= self.now {
                        let _ = out.push(ch);
                    }
                }
            }
            out
        }
    }

    impl Timer for MockTimer {
        fn now_us(&self) -> u64 {
            self.now
        }

        fn set_oneshot_with_ref(&mut self, channel: TimerChannel, ref_ts: u64, duration_us: u32) {
            self.channels[idx(channel)] = Some(Armed::Oneshot(ref_ts + duration_us as u64));
        }

        fn set_oneshot_with_ref_diff(&mut self, channel: TimerChannel, ref_ts: u64, total_us: u32) {
            self.channels[idx(channel)] = Some(Armed::Oneshot(ref_ts + total_us as u64));
        }

        fn set_periodic(&mut self, channel: TimerChannel, period_us: u32) {
            self.channels[idx(channel)] = Some(Armed::Periodic(period_us));
        }

        fn cancel(&mut self, channel: TimerChannel) {
            self.channels[idx(channel)] = None;
        }
    }

    #[test]
    fn oneshot_overrides_existing_arm() {
        let mut t = MockTimer::new();
        t.set_oneshot_with_ref(TimerChannel::InterSlot, 0, 1000);
        assert_eq!(t.deadline(TimerChannel::InterSlot), Some(1000));

        t.set_oneshot_with_ref(TimerChannel::InterSlot, 0, 1100);
        assert_eq!(t.deadline(TimerChannel::InterSlot), Some(1100));
    }

    #[test]
    fn cancel_clears_channel() {
        let mut t = MockTimer::new();
        t.set_oneshot_with_ref(TimerChannel::T1, 0, 500);
        t.cancel(TimerChannel::T1);
        assert!(!t.is_armed(TimerChannel::T1));
    }

    #[test]
    fn due_reports_only_elapsed_channels() {
        let mut t = MockTimer::new();
        t.set_oneshot_with_ref(TimerChannel::T1, 0, 100);
        t.set_oneshot_with_ref(TimerChannel::T2, 0, 500);
        t.set_now(200);
        assert_eq!(t.due().as_slice(), &[TimerChannel::T1]);
    }
}
