// BPL serial protocol for the wrist and gripper actuators
//
// Provides:
// - Packet codec (COBS framing, CRC-8, float payloads)
// - Stream de-framer with resync
// - Serial channel and the request/response bus

mod bus;
mod channel;
mod clock;
pub mod protocol;
mod reader;

pub use bus::{BplBus, POLL_INTERVAL, SETTLE_DELAY};
pub use channel::{Channel, SerialChannel};
pub use clock::{Clock, SystemClock};
pub use protocol::{
    decode_floats, encode_floats, encode_packet, encode_request, BplError, Packet, PacketId,
};
pub use reader::PacketReader;
