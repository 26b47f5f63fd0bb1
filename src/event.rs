//! Application-facing events.
//!
//! Redesigned per spec §9 from the reference implementation's
//! function-pointer callback into a tagged-variant sum type plus a
//! polymorphic [`EventSink`], matching the teacher's habit of deriving
//! `Debug, Clone, PartialEq` on its state enums throughout `mac_802154`.

use crate::packet::MAX_PAYLOAD_LEN;
use crate::NodeId;

/// Why a node or a gateway's view of a node ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisconnectReason {
    /// No RX from the gateway for `MAX_SLOTFRAMES_NO_RX_LEAVE` slotframes.
    PeerLostTimeout,
    /// Own device id absent from the gateway's latest beacon bloom filter.
    PeerLostBloom,
    /// A start-of-frame timestamp drifted `>= 150us` from expectation.
    DriftResync,
    /// `JOIN_TIMEOUT_SINCE_SYNCED` expired without reaching `Joined`.
    JoinTimeoutSinceSynced,
    /// The synced gateway's remaining capacity reached zero before a
    /// `JoinResponse` arrived.
    CapacityExhausted,
    /// The application asked to disconnect explicitly.
    Requested,
    /// A background scan found a stronger candidate gateway and handed over.
    Handover,
}

/// Application-visible events, delivered through an [`EventSink`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Connected(NodeId),
    Disconnected(NodeId, DisconnectReason),
    NewPacket(heapless::Vec<u8, MAX_PAYLOAD_LEN>),
    NodeJoined(NodeId),
    NodeLeft(NodeId, DisconnectReason),
    Error,
}

/// A sink capability for MAC events — any `FnMut(Event)` qualifies.
pub trait EventSink {
    fn on_event(&mut self, event: Event);
}

impl<F: FnMut(Event)> EventSink for F {
    fn on_event(&mut self, event: Event) {
        self(event)
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::*;

    /// Records every event it receives, in order, for test assertions.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub events: heapless::Vec<Event, 32>,
    }

    impl EventSink for RecordingSink {
        fn on_event(&mut self, event: Event) {
            let _ = self.events.push(event);
        }
    }
}
