use crate::packet::DecodeError;

/// Errors returned directly from the public API.
///
/// Per the MAC's error handling design, most of the taxonomy below is
/// *not* surfaced here: transient per-slot radio issues are recovered
/// locally (the slot aborts to `Sleep`) and association-level issues
/// surface as an [`Event::Disconnected`](crate::event::Event::Disconnected)
/// with a [`DisconnectReason`](crate::event::DisconnectReason). `Error` is
/// reserved for calls that can genuinely fail synchronously: a full queue,
/// a malformed frame handed to a decoder, or the wrapped radio error type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The data queue is full and the caller asked to reject rather than
    /// drop-oldest (see [`crate::queue::Queue::push_data`]).
    QueueFull,

    /// A received frame could not be decoded.
    Decode(DecodeError),

    /// `set_schedule` was called with an id not present in the schedule
    /// table.
    UnknownSchedule(u8),

    /// Wrapper for unhandled / underlying radio errors.
    Radio(E),

    /// The radio was asked to start an operation while already busy.
    Busy,
}

impl<E> From<DecodeError> for Error<E> {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

/// Counters for conditions that are recovered from locally rather than
/// returned as an [`Error`] — see the error handling design's propagation
/// policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    /// TX or RX overran its slot and was aborted.
    pub transient_radio_abort: u32,
    /// A beacon's announced schedule id was not found in the local table.
    pub unknown_schedule: u32,
    /// A received frame carried an unsupported protocol version.
    pub bad_protocol_version: u32,
    /// A `JOINING_TIMEOUT` expired and the node is retrying with backoff.
    pub join_collision: u32,
}
