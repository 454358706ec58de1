// Stream de-framer: turns arbitrary chunks of serial bytes into packets

use tracing::{debug, trace};

use super::protocol::{parse_frame, Packet, FRAME_DELIMITER, MAX_ENCODED_LEN, TRAILER_LEN};

/// Accumulates bytes across reads and yields every complete, valid packet.
///
/// A chunk that fails to parse is retried from each following byte, so
/// line noise in front of a frame costs only the noise.
#[derive(Debug, Default)]
pub struct PacketReader {
    pending: Vec<u8>,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly read bytes, returning the packets they completed
    pub fn receive_bytes(&mut self, data: &[u8]) -> Vec<Packet> {
        self.pending.extend_from_slice(data);

        let mut packets = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.pending[consumed..]
            .iter()
            .position(|&b| b == FRAME_DELIMITER)
        {
            let chunk = &self.pending[consumed..consumed + pos];
            if !chunk.is_empty() {
                if let Some(packet) = Self::sync_frame(chunk) {
                    packets.push(packet);
                }
            }
            consumed += pos + 1;
        }
        self.pending.drain(..consumed);

        // Nothing longer than one encoded frame can still complete a packet
        if self.pending.len() > MAX_ENCODED_LEN {
            let excess = self.pending.len() - MAX_ENCODED_LEN;
            trace!("Discarding {} stale bytes", excess);
            self.pending.drain(..excess);
        }

        packets
    }

    /// Number of bytes waiting for a delimiter
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn sync_frame(chunk: &[u8]) -> Option<Packet> {
        for start in 0..=chunk.len().saturating_sub(TRAILER_LEN) {
            match parse_frame(&chunk[start..]) {
                Ok(packet) => {
                    if start > 0 {
                        debug!("Resynced after skipping {} bytes", start);
                    }
                    return Some(packet);
                }
                Err(e) => trace!("No frame at offset {}: {}", start, e),
            }
        }
        debug!("Discarded {} byte chunk with no valid frame", chunk.len());
        None
    }
}
