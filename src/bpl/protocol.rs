// BPL serial protocol implementation
//
// Decoded packet: [Payload..., PacketID, DeviceID, Length, CRC8]
// Wire frame:     COBS(decoded packet) followed by a single 0x00 delimiter
//
// Length counts the whole decoded packet (payload + 4 trailer bytes).

use tracing::trace;

/// Frame delimiter. COBS guarantees it never appears inside an encoded frame.
pub const FRAME_DELIMITER: u8 = 0x00;

/// Trailer bytes after the payload: packet id, device id, length, crc
pub const TRAILER_LEN: usize = 4;

/// Largest payload whose total length still fits the one-byte length field
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - TRAILER_LEN;

/// Largest decoded packet
pub const MAX_DECODED_LEN: usize = u8::MAX as usize;

/// Largest COBS-encoded packet (without the delimiter)
pub const MAX_ENCODED_LEN: usize = MAX_DECODED_LEN + MAX_DECODED_LEN / 254 + 1;

/// Packet ids understood by the device firmware
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketId {
    Mode = 0x01,
    Velocity = 0x02,
    Position = 0x03,
    Current = 0x05,
    PositionLimits = 0x10,
    VelocityLimits = 0x11,
    CurrentLimits = 0x12,
    Save = 0x50,
    Request = 0x60, // payload = ids of the quantities being asked for
    SerialNumber = 0x61,
    ModelNumber = 0x62,
    Temperature = 0x66,
    SoftwareVersion = 0x6C,
    Voltage = 0x90,
    HeartbeatSet = 0x91,
    HeartbeatFrequency = 0x92,
}

impl From<PacketId> for u8 {
    fn from(id: PacketId) -> Self {
        id as u8
    }
}

/// One decoded packet.
///
/// The id is kept raw so packets the firmware adds later are still delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub device_id: u8,
    pub packet_id: u8,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn is(&self, device_id: u8, packet_id: PacketId) -> bool {
        self.device_id == device_id && self.packet_id == packet_id as u8
    }
}

/// Error types for BPL communication
#[derive(Debug, thiserror::Error)]
pub enum BplError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed float payload: {len} bytes is not a whole number of floats")]
    MalformedPayload { len: usize },

    #[error("Payload of {len} bytes exceeds the {max} byte limit", max = MAX_PAYLOAD_LEN)]
    PayloadTooLarge { len: usize },
}

pub type Result<T> = std::result::Result<T, BplError>;

/// Reasons a delimited chunk is not a packet. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub(crate) enum FrameError {
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),

    #[error("invalid COBS encoding")]
    Cobs,

    #[error("length byte {declared} does not match decoded length {actual}")]
    LengthMismatch { declared: u8, actual: usize },

    #[error("crc mismatch: expected 0x{expected:02X}, got 0x{received:02X}")]
    CrcMismatch { expected: u8, received: u8 },
}

/// CRC-8, polynomial 0x4D reflected, init 0x00, final xor 0xFF
const CRC_8_BPL: crc::Algorithm<u8> = crc::Algorithm {
    width: 8,
    poly: 0x4D,
    init: 0x00,
    refin: true,
    refout: true,
    xorout: 0xFF,
    check: 0x7B,
    residue: 0x15,
};

const CRC8: crc::Crc<u8> = crc::Crc::<u8>::new(&CRC_8_BPL);

/// Build the wire frame for one packet
pub fn encode_packet(device_id: u8, packet_id: impl Into<u8>, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > MAX_PAYLOAD_LEN {
        return Err(BplError::PayloadTooLarge { len: data.len() });
    }

    let mut packet = Vec::with_capacity(data.len() + TRAILER_LEN);
    packet.extend_from_slice(data);
    packet.push(packet_id.into());
    packet.push(device_id);
    packet.push((data.len() + TRAILER_LEN) as u8);
    packet.push(CRC8.checksum(&packet));

    let mut frame = cobs::encode_vec(&packet);
    frame.push(FRAME_DELIMITER);
    Ok(frame)
}

/// Parse one frame with its delimiter already stripped
pub(crate) fn parse_frame(frame: &[u8]) -> std::result::Result<Packet, FrameError> {
    if frame.len() < TRAILER_LEN {
        return Err(FrameError::TooShort(frame.len()));
    }

    let decoded = cobs::decode_vec(frame).map_err(|_| FrameError::Cobs)?;
    if decoded.len() < TRAILER_LEN {
        return Err(FrameError::TooShort(decoded.len()));
    }

    let n = decoded.len();
    let declared = decoded[n - 2];
    if declared as usize != n {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: n,
        });
    }

    let expected = CRC8.checksum(&decoded[..n - 1]);
    let received = decoded[n - 1];
    if expected != received {
        return Err(FrameError::CrcMismatch { expected, received });
    }

    let packet = Packet {
        device_id: decoded[n - 3],
        packet_id: decoded[n - 4],
        data: decoded[..n - TRAILER_LEN].to_vec(),
    };
    trace!("Parsed packet {:?}", packet);
    Ok(packet)
}

/// Serialize floats as consecutive little-endian f32
pub fn encode_floats(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`encode_floats`]
pub fn decode_floats(data: &[u8]) -> Result<Vec<f32>> {
    if data.len() % 4 != 0 {
        return Err(BplError::MalformedPayload { len: data.len() });
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Payload of a REQUEST packet asking for one quantity
pub fn encode_request(quantity: PacketId) -> Vec<u8> {
    vec![quantity as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc8() {
        assert_eq!(CRC8.checksum(b"123456789"), CRC_8_BPL.check);
        assert_eq!(CRC8.checksum(&[]), 0xFF);
    }

    #[test]
    fn test_encode_request_packet() {
        // Position request to device 1, as shown in the BPL protocol docs
        let frame =
            encode_packet(0x01, PacketId::Request, &encode_request(PacketId::Position)).unwrap();
        assert_eq!(frame, [0x06, 0x03, 0x60, 0x01, 0x05, 0x52, 0x00]);

        let frame =
            encode_packet(0x02, PacketId::Request, &encode_request(PacketId::Position)).unwrap();
        assert_eq!(frame, [0x06, 0x03, 0x60, 0x02, 0x05, 0x77, 0x00]);
    }

    #[test]
    fn test_encode_velocity_packet() {
        // -1.0f32 = 00 00 80 BF, so the payload starts with two stuffed zeros
        let frame = encode_packet(0x01, PacketId::Velocity, &encode_floats(&[-1.0])).unwrap();
        assert_eq!(
            frame,
            [0x01, 0x01, 0x07, 0x80, 0xBF, 0x02, 0x01, 0x08, 0x7D, 0x00]
        );
        // Only the delimiter is zero
        assert_eq!(frame.iter().filter(|&&b| b == 0).count(), 1);
    }

    #[test]
    fn test_parse_frame() {
        let frame = [0x09, 0x0A, 0xD7, 0xA3, 0x3C, 0x03, 0x02, 0x08, 0x81];
        let packet = parse_frame(&frame).unwrap();
        assert_eq!(packet.device_id, 0x02);
        assert_eq!(packet.packet_id, PacketId::Position as u8);
        assert!(packet.is(0x02, PacketId::Position));
        assert_eq!(decode_floats(&packet.data).unwrap(), vec![0.02f32]);
    }

    #[test]
    fn test_parse_frame_rejects_corruption() {
        let mut frame = encode_packet(0x02, PacketId::Position, &encode_floats(&[1.5])).unwrap();
        frame.pop(); // delimiter
        assert!(parse_frame(&frame).is_ok());

        // Flip a payload bit
        let mut bad = frame.clone();
        bad[3] ^= 0x01;
        assert!(matches!(
            parse_frame(&bad),
            Err(FrameError::CrcMismatch { .. })
        ));

        // Drop a byte
        let short = &frame[1..];
        assert!(parse_frame(short).is_err());

        assert_eq!(parse_frame(&[0x01, 0x02]), Err(FrameError::TooShort(2)));
    }

    #[test]
    fn test_empty_payload() {
        let frame = encode_packet(0x05, PacketId::SerialNumber, &[]).unwrap();
        assert_eq!(frame, [0x05, 0x61, 0x05, 0x04, 0xAB, 0x00]);
        let packet = parse_frame(&frame[..frame.len() - 1]).unwrap();
        assert!(packet.data.is_empty());
        assert!(packet.is(0x05, PacketId::SerialNumber));
    }

    #[test]
    fn test_payload_limit() {
        let max = vec![0xAA; MAX_PAYLOAD_LEN];
        let frame = encode_packet(0x01, PacketId::Mode, &max).unwrap();
        assert!(frame.len() - 1 <= MAX_ENCODED_LEN);
        let packet = parse_frame(&frame[..frame.len() - 1]).unwrap();
        assert_eq!(packet.data, max);

        let too_big = vec![0xAA; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encode_packet(0x01, PacketId::Mode, &too_big),
            Err(BplError::PayloadTooLarge { len }) if len == MAX_PAYLOAD_LEN + 1
        ));
    }

    #[test]
    fn test_full_block_has_no_trailing_code() {
        // 250 payload + 4 trailer = 254 non-zero bytes: exactly one full COBS block
        let data = vec![0xFE; 250];
        let frame = encode_packet(0x01, PacketId::Mode, &data).unwrap();
        assert_eq!(frame.len(), 256);
        assert_eq!(frame[0], 0xFF);
        assert_eq!(&frame[251..], [0x01, 0x01, 0xFE, 0xAE, 0x00]);

        let packet = parse_frame(&frame[..frame.len() - 1]).unwrap();
        assert_eq!(packet.data, data);
        assert!(packet.is(0x01, PacketId::Mode));
    }

    #[test]
    fn test_payload_with_zeros() {
        let data = [0u8, 0, 0, 0, 1, 0, 2];
        let frame = encode_packet(0x03, PacketId::Current, &data).unwrap();
        assert!(!frame[..frame.len() - 1].contains(&0));
        let packet = parse_frame(&frame[..frame.len() - 1]).unwrap();
        assert_eq!(packet.data, data);
    }

    #[test]
    fn test_float_round_trip() {
        for value in [0.0f32, -0.0, 1.0, -1.0, 0.02, 5.6, f32::MAX, f32::MIN_POSITIVE, f32::INFINITY] {
            let decoded = decode_floats(&encode_floats(&[value])).unwrap();
            assert_eq!(decoded.len(), 1);
            assert_eq!(decoded[0].to_bits(), value.to_bits());
        }
        let nan = decode_floats(&encode_floats(&[f32::NAN])).unwrap();
        assert!(nan[0].is_nan());
    }

    #[test]
    fn test_float_encoding_is_little_endian() {
        assert_eq!(encode_floats(&[1.0]), [0x00, 0x00, 0x80, 0x3F]);
        assert_eq!(encode_floats(&[1.0, -1.0]).len(), 8);
    }

    #[test]
    fn test_decode_floats_malformed() {
        assert!(matches!(
            decode_floats(&[0, 0, 0x80]),
            Err(BplError::MalformedPayload { len: 3 })
        ));
        assert_eq!(decode_floats(&[]).unwrap(), Vec::<f32>::new());
    }
}
