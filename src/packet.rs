//! Frame layout.
//!
//! All frames share a common header (`version`, `type`, `dst`, `src`);
//! `Beacon` frames add an ASN, remaining capacity, active schedule id and a
//! bloom filter of joined node ids. The on-wire byte layout below the field
//! semantics specified here is out of scope — this module only
//! needs to be internally consistent, not match any particular reference
//! encoding bit-for-bit.

use crate::config::MAX_FRAME_LEN;
use crate::NodeId;

/// Protocol version this crate speaks. Frames with a different version are
/// dropped silently (`BadProtocolVersion`, spec §7).
pub const PROTOCOL_VERSION: u8 = 1;

const HEADER_LEN: usize = 1 + 1 + 8 + 8;

/// Size of the bloom filter carried in every `Beacon` frame. Platform
/// specific in the reference implementation; pinned here for
/// interoperability.
pub const BLOOM_BYTES: usize = 32;

/// Largest payload a `Data` frame can carry once the header is subtracted.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - HEADER_LEN - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    TooShort,
    BadVersion,
    BadFrameType,
    BadLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    Beacon,
    JoinRequest,
    JoinResponse,
    Data,
}

impl FrameType {
    fn to_byte(self) -> u8 {
        match self {
            FrameType::Beacon => b'B',
            FrameType::JoinRequest => b'J',
            FrameType::JoinResponse => b'R',
            FrameType::Data => b'D',
        }
    }

    fn from_byte(b: u8) -> Result<Self, DecodeError> {
        match b {
            b'B' => Ok(FrameType::Beacon),
            b'J' => Ok(FrameType::JoinRequest),
            b'R' => Ok(FrameType::JoinResponse),
            b'D' => Ok(FrameType::Data),
            _ => Err(DecodeError::BadFrameType),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub version: u8,
    pub frame_type: FrameType,
    pub dst: NodeId,
    pub src: NodeId,
}

impl Header {
    fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.version;
        buf[1] = self.frame_type.to_byte();
        buf[2..10].copy_from_slice(&self.dst.to_le_bytes());
        buf[10..18].copy_from_slice(&self.src.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::TooShort);
        }
        let version = buf[0];
        let frame_type = FrameType::from_byte(buf[1])?;
        let dst = NodeId::from_le_bytes(buf[2..10].try_into().unwrap());
        let src = NodeId::from_le_bytes(buf[10..18].try_into().unwrap());
        Ok(Header { version, frame_type, dst, src })
    }
}

/// Probabilistic membership set the gateway uses to announce which nodes
/// are currently joined. Tested purely through `contains`/`insert`; the
/// hash mix is not required to match any particular reference
/// implementation (spec §1, §9 — bloom size/derivation is platform
/// specific).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bloom {
    bits: [u8; BLOOM_BYTES],
}

const BLOOM_HASHES: usize = 3;

impl Bloom {
    pub fn new() -> Self {
        Self { bits: [0u8; BLOOM_BYTES] }
    }

    pub fn insert(&mut self, id: NodeId) {
        for h in Self::hashes(id) {
            self.bits[(h / 8) as usize % BLOOM_BYTES] |= 1 << (h % 8);
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        Self::hashes(id).into_iter().all(|h| {
            self.bits[(h / 8) as usize % BLOOM_BYTES] & (1 << (h % 8)) != 0
        })
    }

    fn hashes(id: NodeId) -> [u32; BLOOM_HASHES] {
        let mut out = [0u32; BLOOM_HASHES];
        for (k, slot) in out.iter_mut().enumerate() {
            // FNV-1a seeded per hash index.
            let mut h: u64 = 0xcbf2_9ce4_8422_2325 ^ (k as u64).wrapping_mul(0x1000_0000_01b3);
            for byte in id.to_le_bytes() {
                h ^= byte as u64;
                h = h.wrapping_mul(0x1000_0000_01b3);
            }
            *slot = (h % (BLOOM_BYTES as u64 * 8)) as u32;
        }
        out
    }

    fn as_bytes(&self) -> &[u8; BLOOM_BYTES] {
        &self.bits
    }

    fn from_bytes(bytes: [u8; BLOOM_BYTES]) -> Self {
        Self { bits: bytes }
    }
}

impl Default for Bloom {
    fn default() -> Self {
        Self::new()
    }
}

/// Tests `bloom_contains(device_id, bytes)` per spec §3: whether `id` is a
/// member of the raw bloom bytes carried on the wire.
pub fn bloom_contains(id: NodeId, bytes: &[u8; BLOOM_BYTES]) -> bool {
    Bloom::from_bytes(*bytes).contains(id)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Beacon {
        asn: u64,
        remaining_capacity: u8,
        active_schedule_id: u8,
        bloom: Bloom,
    },
    JoinRequest,
    /// The cell index a joining node was admitted to.
    JoinResponse { assigned_cell: u16 },
    Data { payload: heapless::Vec<u8, MAX_PAYLOAD_LEN> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: Header,
    pub body: Body,
}

impl Frame {
    pub fn beacon(src: NodeId, asn: u64, remaining_capacity: u8, active_schedule_id: u8, bloom: Bloom) -> Self {
        Self {
            header: Header { version: PROTOCOL_VERSION, frame_type: FrameType::Beacon, dst: crate::BROADCAST, src },
            body: Body::Beacon { asn, remaining_capacity, active_schedule_id, bloom },
        }
    }

    pub fn join_request(src: NodeId, gateway_id: NodeId) -> Self {
        Self {
            header: Header { version: PROTOCOL_VERSION, frame_type: FrameType::JoinRequest, dst: gateway_id, src },
            body: Body::JoinRequest,
        }
    }

    pub fn join_response(src_gateway: NodeId, node_id: NodeId, assigned_cell: u16) -> Self {
        Self {
            header: Header { version: PROTOCOL_VERSION, frame_type: FrameType::JoinResponse, dst: node_id, src: src_gateway },
            body: Body::JoinResponse { assigned_cell },
        }
    }

    pub fn data(src: NodeId, dst: NodeId, payload: heapless::Vec<u8, MAX_PAYLOAD_LEN>) -> Self {
        Self {
            header: Header { version: PROTOCOL_VERSION, frame_type: FrameType::Data, dst, src },
            body: Body::Data { payload },
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.header.dst == crate::BROADCAST
    }

    pub fn encode(&self, buf: &mut [u8; MAX_FRAME_LEN]) -> usize {
        self.header.encode(buf);
        let mut len = HEADER_LEN;
        match &self.body {
            Body::Beacon { asn, remaining_capacity, active_schedule_id, bloom } => {
                buf[len..len + 8].copy_from_slice(&asn.to_le_bytes());
                len += 8;
                buf[len] = *remaining_capacity;
                len += 1;
                buf[len] = *active_schedule_id;
                len += 1;
                buf[len..len + BLOOM_BYTES].copy_from_slice(bloom.as_bytes());
                len += BLOOM_BYTES;
            }
            Body::JoinRequest => {}
            Body::JoinResponse { assigned_cell } => {
                buf[len..len + 2].copy_from_slice(&assigned_cell.to_le_bytes());
                len += 2;
            }
            Body::Data { payload } => {
                buf[len..len + payload.len()].copy_from_slice(payload);
                len += payload.len();
            }
        }
        len
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let header = Header::decode(buf)?;
        if header.version != PROTOCOL_VERSION {
            return Err(DecodeError::BadVersion);
        }
        let rest = &buf[HEADER_LEN..];
        let body = match header.frame_type {
            FrameType::Beacon => {
                if rest.len() < 8 + 1 + 1 + BLOOM_BYTES {
                    return Err(DecodeError::TooShort);
                }
                let asn = u64::from_le_bytes(rest[0..8].try_into().unwrap());
                let remaining_capacity = rest[8];
                let active_schedule_id = rest[9];
                let mut bloom_bytes = [0u8; BLOOM_BYTES];
                bloom_bytes.copy_from_slice(&rest[10..10 + BLOOM_BYTES]);
                Body::Beacon { asn, remaining_capacity, active_schedule_id, bloom: Bloom::from_bytes(bloom_bytes) }
            }
            FrameType::JoinRequest => Body::JoinRequest,
            FrameType::JoinResponse => {
                if rest.len() < 2 {
                    return Err(DecodeError::TooShort);
                }
                let assigned_cell = u16::from_le_bytes(rest[0..2].try_into().unwrap());
                Body::JoinResponse { assigned_cell }
            }
            FrameType::Data => {
                if rest.len() > MAX_PAYLOAD_LEN {
                    return Err(DecodeError::BadLength);
                }
                let mut payload = heapless::Vec::new();
                payload.extend_from_slice(rest).map_err(|_| DecodeError::BadLength)?;
                Body::Data { payload }
            }
        };
        Ok(Frame { header, body })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_round_trips() {
        let f = Frame::join_request(0x1122, 0x3344);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = f.encode(&mut buf);
        let decoded = Frame::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn beacon_round_trips_with_bloom() {
        let mut bloom = Bloom::new();
        bloom.insert(0xabcd);
        let f = Frame::beacon(0x1, 42, 3, 6, bloom);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = f.encode(&mut buf);
        let decoded = Frame::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, f);
        if let Body::Beacon { bloom, .. } = decoded.body {
            assert!(bloom.contains(0xabcd));
            assert!(!bloom.contains(0xdead));
        } else {
            panic!("expected beacon body");
        }
    }

    #[test]
    fn data_round_trips() {
        let mut payload = heapless::Vec::new();
        payload.extend_from_slice(b"hello").unwrap();
        let f = Frame::data(1, 2, payload);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = f.encode(&mut buf);
        let decoded = Frame::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn bad_version_is_rejected() {
        let f = Frame::join_request(1, 2);
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = f.encode(&mut buf);
        buf[0] = PROTOCOL_VERSION + 1;
        assert_eq!(Frame::decode(&buf[..n]), Err(DecodeError::BadVersion));
    }

    #[test]
    fn broadcast_destination_is_recognised() {
        let bloom = Bloom::new();
        let f = Frame::beacon(5, 0, 5, 6, bloom);
        assert!(f.is_broadcast());
    }
}
