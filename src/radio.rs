//! Radio collaborator consumed by the MAC.
//!
//! Out of scope: the on-wire byte layout below the header and the lower
//! radio driver itself. What the MAC needs is this narrow,
//! callback-driven surface — start/end-frame timestamps are delivered to
//! `Mac::on_start_frame`/`Mac::on_end_frame` by the platform integration,
//! not stored as closures on the trait (no allocator to box one in).

use crate::config::MAX_FRAME_LEN;

/// Radio PHY mode. The MAC only ever uses `Ble2M`, but the trait carries the
/// selector so a platform integration can assert it picked the right mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phy {
    Ble2M,
}

pub trait Radio<E> {
    /// One-time radio bring-up. Start/end-frame notifications are wired by
    /// the integrator directly to `Mac::on_start_frame`/`on_end_frame`.
    fn init(&mut self, phy: Phy) -> Result<(), E>;

    fn set_channel(&mut self, channel: u8) -> Result<(), E>;

    /// Arm the receiver. Must not be called from within the end-of-frame
    /// ISR of a transmission that is about to disable the radio — the MAC
    /// defers such re-arms through a short timer callback.
    fn rx(&mut self) -> Result<(), E>;

    /// Load `frame` into the radio without starting transmission.
    fn tx_prepare(&mut self, frame: &[u8]) -> Result<(), E>;

    /// Start transmitting the frame loaded by `tx_prepare`.
    fn tx_dispatch(&mut self) -> Result<(), E>;

    /// Turn the radio off and cancel any in-flight operation.
    fn disable(&mut self);

    fn rssi(&self) -> i8;

    fn pending_rx_read(&self) -> bool;

    /// Copies the received frame into `buf`, returning its length.
    fn get_rx_packet(&mut self, buf: &mut [u8; MAX_FRAME_LEN]) -> usize;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Init,
        SetChannel(u8),
        Rx,
        TxPrepare(heapless::Vec<u8, MAX_FRAME_LEN>),
        TxDispatch,
        Disable,
    }

    /// Records every call it receives, in the teacher's "scripted
    /// expectations" mock spirit (see `radio::mock::MockRadio` in the
    /// teacher's own test suite) — but hand-rolled here since this trait is
    /// callback-shaped rather than the teacher's polling `radio` crate
    /// traits.
    #[derive(Debug, Default)]
    pub struct MockRadio {
        pub calls: heapless::Vec<Call, 64>,
        pub rssi: i8,
        pending: Option<heapless::Vec<u8, MAX_FRAME_LEN>>,
    }

    impl MockRadio {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulate a frame having arrived; `pending_rx_read` becomes true
        /// until `get_rx_packet` is called.
        pub fn inject_rx(&mut self, data: &[u8]) {
            let mut v = heapless::Vec::new();
            let _ = v.extend_from_slice(data);
            self.pending = Some(v);
        }
    }

    impl Radio<()> for MockRadio {
        fn init(&mut self, _phy: Phy) -> Result<(), ()> {
            let _ = self.calls.push(Call::Init);
            Ok(())
        }

        fn set_channel(&mut self, channel: u8) -> Result<(), ()> {
            let _ = self.calls.push(Call::SetChannel(channel));
            Ok(())
        }

        fn rx(&mut self) -> Result<(), ()> {
            let _ = self.calls.push(Call::Rx);
            Ok(())
        }

        fn tx_prepare(&mut self, frame: &[u8]) -> Result<(), ()> {
            let mut v = heapless::Vec::new();
            let _ = v.extend_from_slice(frame);
            let _ = self.calls.push(Call::TxPrepare(v));
            Ok(())
        }

        fn tx_dispatch(&mut self) -> Result<(), ()> {
            let _ = self.calls.push(Call::TxDispatch);
            Ok(())
        }

        fn disable(&mut self) {
            let _ = self.calls.push(Call::Disable);
        }

        fn rssi(&self) -> i8 {
            self.rssi
        }

        fn pending_rx_read(&self) -> bool {
            self.pending.is_some()
        }

        fn get_rx_packet(&mut self, buf: &mut [u8; MAX_FRAME_LEN]) -> usize {
            match self.pending.take() {
                Some(v) => {
                    buf[..v.len()].copy_from_slice(&v);
                    v.len()
                }
                None => 0,
            }
        }
    }

    #[test]
    fn records_calls_in_order() {
        let mut r = MockRadio::new();
        r.rx().unwrap();
        r.tx_prepare(&[1, 2, 3]).unwrap();
        assert_eq!(r.calls.len(), 2);
        assert_eq!(r.calls[0], Call::Rx);
    }

    #[test]
    fn inject_then_read_clears_pending() {
        let mut r = MockRadio::new();
        r.inject_rx(&[9, 9]);
        assert!(r.pending_rx_read());
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = r.get_rx_packet(&mut buf);
        assert_eq!(n, 2);
        assert!(!r.pending_rx_read());
    }
}
