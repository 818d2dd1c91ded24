//! sACN (ANSI E1.31) datagram codec.
//!
//! Decoding never fails loudly: the format is lossy, unauthenticated UDP,
//! so truncated or foreign datagrams are the normal failure mode and simply
//! yield `None`. Encoding produces a full 638-byte data packet and is the
//! exact inverse of the decode offsets.

use std::net::Ipv4Addr;

// ── Wire constants ───────────────────────────────────────────────────

/// UDP port every sACN universe is transmitted on.
pub const SACN_PORT: u16 = 5568;

/// Number of DMX512 slots in a universe.
pub const SLOT_COUNT: usize = 512;

/// Smallest datagram that can carry a start code.
pub const MIN_PACKET_SIZE: usize = 126;

/// Largest datagram the receiver accepts.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// Size of a data packet carrying a full universe.
pub const FULL_PACKET_SIZE: usize = PROPERTY_VALUES_OFFSET + 1 + SLOT_COUNT;

/// Lowest and highest legal universe numbers.
pub const UNIVERSE_MIN: u16 = 1;
pub const UNIVERSE_MAX: u16 = 63999;

/// `"ASC-E1.17\0\0\0"`, the ACN packet identifier at bytes 4..16.
pub const ACN_PACKET_IDENTIFIER: [u8; 12] = [
    0x41, 0x53, 0x43, 0x2d, 0x45, 0x31, 0x2e, 0x31, 0x37, 0x00, 0x00, 0x00,
];

const SIGNATURE_RANGE: std::ops::Range<usize> = 4..16;
const PRIORITY_OFFSET: usize = 108;
const SEQUENCE_OFFSET: usize = 111;
const UNIVERSE_OFFSET: usize = 113;
const PROPERTY_COUNT_OFFSET: usize = 123;
const PROPERTY_VALUES_OFFSET: usize = 125;

const ROOT_LAYER_START: usize = 16;
const FRAMING_LAYER_START: usize = 38;
const DMP_LAYER_START: usize = 115;
const SOURCE_NAME_OFFSET: usize = 44;
const SOURCE_NAME_LEN: usize = 64;

const VECTOR_ROOT_E131_DATA: u32 = 0x0000_0004;
const VECTOR_E131_DATA_PACKET: u32 = 0x0000_0002;
const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;
const DMP_ADDRESS_TYPE: u8 = 0xa1;

/// Source name written into encoded packets.
pub const DEFAULT_SOURCE_NAME: &str = "creature-net";

/// Default priority for transmitted data (E1.31 §6.2.3).
pub const DEFAULT_PRIORITY: u8 = 100;

// ── Frame ────────────────────────────────────────────────────────────

/// One decoded lighting snapshot for a single universe.
///
/// `slots` always holds exactly 512 values; positions beyond what the
/// sender transmitted are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub universe: u16,
    pub sequence: u8,
    pub priority: u8,
    pub start_code: u8,
    pub slots: [u8; SLOT_COUNT],
}

impl Frame {
    /// An all-zero frame for `universe` at the default priority.
    pub fn new(universe: u16) -> Self {
        Self {
            universe,
            sequence: 0,
            priority: DEFAULT_PRIORITY,
            start_code: 0,
            slots: [0; SLOT_COUNT],
        }
    }

    /// Encode this frame as a complete E1.31 data packet.
    pub fn to_datagram(&self) -> Vec<u8> {
        encode(self)
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Decode one datagram into a [`Frame`].
///
/// Returns `None` when the datagram is shorter than [`MIN_PACKET_SIZE`],
/// carries the wrong ACN identifier, or declares zero property values.
pub fn decode(datagram: &[u8]) -> Option<Frame> {
    if datagram.len() < MIN_PACKET_SIZE {
        return None;
    }
    if datagram.get(SIGNATURE_RANGE)? != ACN_PACKET_IDENTIFIER {
        return None;
    }

    let property_count = usize::from(read_u16(datagram, PROPERTY_COUNT_OFFSET)?);
    if property_count == 0 {
        return None;
    }

    let end = (PROPERTY_VALUES_OFFSET + property_count).min(datagram.len());
    let values = datagram.get(PROPERTY_VALUES_OFFSET..end)?;
    let (&start_code, data) = values.split_first()?;

    let mut slots = [0u8; SLOT_COUNT];
    let copied = data.len().min(SLOT_COUNT);
    slots[..copied].copy_from_slice(&data[..copied]);

    Some(Frame {
        universe: read_u16(datagram, UNIVERSE_OFFSET)?,
        sequence: *datagram.get(SEQUENCE_OFFSET)?,
        priority: *datagram.get(PRIORITY_OFFSET)?,
        start_code,
        slots,
    })
}

fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

// ── Encoding ─────────────────────────────────────────────────────────

/// Encode a frame as a full 638-byte E1.31 data packet.
///
/// The CID is left zeroed and the source name is [`DEFAULT_SOURCE_NAME`].
pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut buf = vec![0u8; FULL_PACKET_SIZE];

    // Root layer
    buf[0..2].copy_from_slice(&0x0010u16.to_be_bytes());
    buf[SIGNATURE_RANGE].copy_from_slice(&ACN_PACKET_IDENTIFIER);
    write_flags_and_length(&mut buf, ROOT_LAYER_START);
    buf[18..22].copy_from_slice(&VECTOR_ROOT_E131_DATA.to_be_bytes());

    // Framing layer
    write_flags_and_length(&mut buf, FRAMING_LAYER_START);
    buf[40..44].copy_from_slice(&VECTOR_E131_DATA_PACKET.to_be_bytes());
    let name = DEFAULT_SOURCE_NAME.as_bytes();
    let name_len = name.len().min(SOURCE_NAME_LEN - 1);
    buf[SOURCE_NAME_OFFSET..SOURCE_NAME_OFFSET + name_len].copy_from_slice(&name[..name_len]);
    buf[PRIORITY_OFFSET] = frame.priority;
    buf[SEQUENCE_OFFSET] = frame.sequence;
    buf[UNIVERSE_OFFSET..UNIVERSE_OFFSET + 2].copy_from_slice(&frame.universe.to_be_bytes());

    // DMP layer
    write_flags_and_length(&mut buf, DMP_LAYER_START);
    buf[117] = VECTOR_DMP_SET_PROPERTY;
    buf[118] = DMP_ADDRESS_TYPE;
    buf[121..123].copy_from_slice(&1u16.to_be_bytes());
    let property_count = u16::try_from(SLOT_COUNT + 1).unwrap_or(u16::MAX);
    buf[PROPERTY_COUNT_OFFSET..PROPERTY_COUNT_OFFSET + 2]
        .copy_from_slice(&property_count.to_be_bytes());
    buf[PROPERTY_VALUES_OFFSET] = frame.start_code;
    buf[PROPERTY_VALUES_OFFSET + 1..].copy_from_slice(&frame.slots);

    buf
}

/// PDU flags (0x7) in the high nibble, PDU length in the low 12 bits.
fn write_flags_and_length(buf: &mut [u8], layer_start: usize) {
    let pdu_len = u16::try_from(buf.len() - layer_start).unwrap_or(0x0fff) & 0x0fff;
    buf[layer_start..layer_start + 2].copy_from_slice(&(0x7000 | pdu_len).to_be_bytes());
}

// ── Addressing ───────────────────────────────────────────────────────

/// The multicast group a universe is transmitted on: `239.255.<hi>.<lo>`.
pub fn multicast_group(universe: u16) -> Ipv4Addr {
    let [hi, lo] = universe.to_be_bytes();
    Ipv4Addr::new(239, 255, hi, lo)
}

/// `true` if `universe` is inside the legal 1..=63999 range.
pub fn is_valid_universe(universe: u16) -> bool {
    (UNIVERSE_MIN..=UNIVERSE_MAX).contains(&universe)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A minimal valid packet: header plus `values` as the property values.
    fn packet_with_values(universe: u16, values: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; PROPERTY_VALUES_OFFSET + values.len()];
        buf[SIGNATURE_RANGE].copy_from_slice(&ACN_PACKET_IDENTIFIER);
        buf[PRIORITY_OFFSET] = 150;
        buf[SEQUENCE_OFFSET] = 7;
        buf[UNIVERSE_OFFSET..UNIVERSE_OFFSET + 2].copy_from_slice(&universe.to_be_bytes());
        let count = u16::try_from(values.len()).unwrap();
        buf[PROPERTY_COUNT_OFFSET..PROPERTY_COUNT_OFFSET + 2].copy_from_slice(&count.to_be_bytes());
        buf[PROPERTY_VALUES_OFFSET..].copy_from_slice(values);
        buf
    }

    #[test]
    fn decodes_full_universe() {
        let mut frame = Frame::new(42);
        for (i, slot) in frame.slots.iter_mut().enumerate() {
            *slot = u8::try_from(i % 251).unwrap();
        }
        let datagram = encode(&frame);
        assert_eq!(datagram.len(), 638);

        let decoded = decode(&datagram).unwrap();
        assert_eq!(decoded.universe, 42);
        assert_eq!(decoded.slots, frame.slots);
        assert_eq!(decoded.priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn rejects_short_packet() {
        let datagram = packet_with_values(1, &[0, 1, 2]);
        assert!(decode(&datagram[..MIN_PACKET_SIZE - 1]).is_none());
        assert!(decode(&[]).is_none());
    }

    #[test]
    fn rejects_wrong_signature() {
        let mut datagram = packet_with_values(1, &[0, 255, 255]);
        datagram[4] = b'X';
        assert!(decode(&datagram).is_none());
    }

    #[test]
    fn rejects_zero_property_count() {
        let mut datagram = packet_with_values(1, &[0, 10, 20]);
        datagram[PROPERTY_COUNT_OFFSET] = 0;
        datagram[PROPERTY_COUNT_OFFSET + 1] = 0;
        assert!(decode(&datagram).is_none());
    }

    #[test]
    fn partial_universe_is_zero_filled() {
        let datagram = packet_with_values(3, &[0xdd, 11, 22, 33, 44]);
        let frame = decode(&datagram).unwrap();

        assert_eq!(frame.start_code, 0xdd);
        assert_eq!(&frame.slots[0..4], &[11, 22, 33, 44]);
        assert!(frame.slots[4..].iter().all(|&v| v == 0));
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.priority, 150);
        assert_eq!(frame.universe, 3);
    }

    #[test]
    fn property_count_larger_than_datagram_is_clamped() {
        let mut datagram = packet_with_values(9, &[0, 1, 2]);
        datagram[PROPERTY_COUNT_OFFSET..PROPERTY_COUNT_OFFSET + 2]
            .copy_from_slice(&600u16.to_be_bytes());

        let frame = decode(&datagram).unwrap();
        assert_eq!(&frame.slots[0..2], &[1, 2]);
        assert_eq!(frame.slots[2], 0);
    }

    #[test]
    fn encoded_layers_carry_flags_and_lengths() {
        let datagram = encode(&Frame::new(1));
        assert_eq!(&datagram[16..18], &[0x72, 0x6e]);
        assert_eq!(&datagram[38..40], &[0x72, 0x58]);
        assert_eq!(&datagram[115..117], &[0x72, 0x0b]);
        assert_eq!(&datagram[123..125], &[0x02, 0x01]);
        assert_eq!(&datagram[44..56], b"creature-net");
    }

    #[test]
    fn multicast_group_derivation() {
        assert_eq!(multicast_group(1), Ipv4Addr::new(239, 255, 0, 1));
        assert_eq!(multicast_group(256), Ipv4Addr::new(239, 255, 1, 0));
        assert_eq!(multicast_group(63999), Ipv4Addr::new(239, 255, 249, 255));
    }

    #[test]
    fn universe_range() {
        assert!(!is_valid_universe(0));
        assert!(is_valid_universe(1));
        assert!(is_valid_universe(63999));
        assert!(!is_valid_universe(64000));
    }
}
