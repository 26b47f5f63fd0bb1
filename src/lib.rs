//! Slot-driven, channel-hopping MAC core for low-power wireless networks.
//!
//! One device (the gateway) owns time and the active slotframe; the other
//! devices (nodes) scan for beacons, synchronize, join a reserved uplink
//! cell and exchange unicast data in their assigned slots. This crate
//! implements the slotframe scheduler, the slot-driven MAC state machine,
//! the scan-and-select gateway selection logic, the association state
//! machine and the transmit queue. The radio, the high-frequency timer and
//! the byte-level RNG source are external collaborators, specified here as
//! traits (see [`radio`], [`timer`], [`rng`]).

#![no_std]

#[cfg(test)]
extern crate std;

pub mod assoc;
pub mod channel_hop;
pub mod config;
pub mod error;
pub mod event;
pub mod mac;
pub mod packet;
pub mod queue;
pub mod radio;
pub mod rng;
pub mod scan;
pub mod schedule;
pub mod schedule_table;
pub mod scheduler;
pub mod timer;

pub mod prelude {
    pub use crate::assoc::{Assoc, AssocState};
    pub use crate::config::Config;
    pub use crate::error::Error;
    pub use crate::event::{DisconnectReason, Event, EventSink};
    pub use crate::mac::Mac;
    pub use crate::packet::{Body, Frame, FrameType, Header};
    pub use crate::radio::Radio;
    pub use crate::rng::Rng;
    pub use crate::schedule::{Cell, CellType, Schedule};
    pub use crate::scheduler::{NodeType, RadioAction, Scheduler, SlotInfo};
    pub use crate::timer::{Timer, TimerChannel};
}

/// 64-bit device identifier. `0` means unassigned, [`BROADCAST`] addresses
/// every node.
pub type NodeId = u64;

/// Broadcast destination address (spec: `0xFFFFFFFFFFFFFFFF`).
pub const BROADCAST: NodeId = u64::MAX;
