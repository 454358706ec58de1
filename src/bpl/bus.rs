// BPL device bus: packet send helpers and timeout-bounded requests

use std::time::Duration;
use tracing::{debug, trace, warn};

use super::channel::Channel;
use super::clock::{Clock, SystemClock};
use super::protocol::{
    decode_floats, encode_floats, encode_packet, encode_request, BplError, PacketId, Result,
};
use super::reader::PacketReader;

/// Sleep between polls of the channel while waiting for a reply
pub const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Pause after every request so back-to-back queries don't flood a slow device
pub const SETTLE_DELAY: Duration = Duration::from_millis(1);

/// Owns the channel and the de-framer for one serial link
pub struct BplBus<C: Channel, K: Clock = SystemClock> {
    channel: C,
    reader: PacketReader,
    clock: K,
}

impl<C: Channel> BplBus<C> {
    pub fn new(channel: C) -> Self {
        Self::with_clock(channel, SystemClock)
    }
}

impl<C: Channel, K: Clock> BplBus<C, K> {
    pub fn with_clock(channel: C, clock: K) -> Self {
        Self {
            channel,
            reader: PacketReader::new(),
            clock,
        }
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Encode and write one packet
    pub fn send_packet(&mut self, device_id: u8, packet_id: PacketId, data: &[u8]) -> Result<()> {
        let frame = encode_packet(device_id, packet_id, data)?;
        debug!(
            "Send to device 0x{:02X}: {:?} ({} bytes)",
            device_id,
            packet_id,
            data.len()
        );
        self.channel.write(&frame)?;
        Ok(())
    }

    /// Command an open-loop velocity
    pub fn send_velocity(&mut self, device_id: u8, velocity: f32) -> Result<()> {
        self.send_packet(device_id, PacketId::Velocity, &encode_floats(&[velocity]))
    }

    /// Ask a device for one quantity and wait for its reply.
    ///
    /// Returns the payload of the first packet from `device_id` carrying
    /// `quantity`, or `None` if nothing matched within `timeout`. Other
    /// traffic arriving meanwhile is discarded.
    pub fn request(
        &mut self,
        device_id: u8,
        quantity: PacketId,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>> {
        self.send_packet(device_id, PacketId::Request, &encode_request(quantity))?;
        let reply = self.wait_for(device_id, quantity, timeout);
        self.clock.sleep(SETTLE_DELAY);
        Ok(reply)
    }

    /// Query a joint position. `None` means the device did not answer in time.
    pub fn request_position(&mut self, device_id: u8, timeout: Duration) -> Result<Option<f32>> {
        let Some(data) = self.request(device_id, PacketId::Position, timeout)? else {
            return Ok(None);
        };

        let position = decode_floats(&data)?
            .first()
            .copied()
            .ok_or(BplError::MalformedPayload { len: data.len() })?;
        debug!("Device 0x{:02X} position: {}", device_id, position);
        Ok(Some(position))
    }

    fn wait_for(&mut self, device_id: u8, quantity: PacketId, timeout: Duration) -> Option<Vec<u8>> {
        let start = self.clock.now();

        loop {
            self.clock.sleep(POLL_INTERVAL);

            let bytes = match self.channel.read() {
                Ok(bytes) => bytes,
                Err(e) => {
                    trace!("Read failed while polling, treating as no data: {}", e);
                    Vec::new()
                }
            };

            if !bytes.is_empty() {
                let packets = self.reader.receive_bytes(&bytes);
                if let Some(packet) = packets.into_iter().find(|p| p.is(device_id, quantity)) {
                    return Some(packet.data);
                }
            }

            if self.clock.now().duration_since(start) > timeout {
                warn!(
                    "Request for {:?} from device 0x{:02X} timed out after {:?}",
                    quantity, device_id, timeout
                );
                return None;
            }
        }
    }
}
