//! Packet codec: the 16-byte header plus a struct payload.
//!
//! Header layout, all fields big-endian:
//!
//! ```text
//! +--------------+-------+-----------+---------+-------+------+------+-------+
//! | payload_len  | empty | component | command | empty |  id  | type | empty |
//! |   4 bytes    |  2    |   2       |   2     |  1    |  2   |  1   |  2    |
//! +--------------+-------+-----------+---------+-------+------+------+-------+
//! ```
//!
//! A payload struct carrying an integer `ERRC` field is an application
//! error rather than a result: the low 16 bits of the value hold the
//! failing component id and the high bits a 15-bit code (codes at or
//! above 16384 have 16384 subtracted).

use crate::error::{BlazeError, ProtocolError};
use crate::method::{self, MethodCategory};
use crate::value::{BlazeStruct, Value};
use bytes::{BufMut, BytesMut};

/// Size of the fixed packet header in bytes.
pub const PACKET_HEADER_SIZE: usize = 16;

/// The keepalive frame: a header-shaped constant with type byte
/// `SendKeepAlive` and zero payload, written every 30 seconds.
pub const KEEPALIVE_FRAME: [u8; PACKET_HEADER_SIZE] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x80, 0, 0,
];

/// Packet type discriminator at header byte 13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    SendCommand,
    Result,
    ReceiveMessage,
    SendKeepAlive,
    ReceiveKeepAlive,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x00 => Ok(PacketType::SendCommand),
            0x20 => Ok(PacketType::Result),
            0x40 => Ok(PacketType::ReceiveMessage),
            0x80 => Ok(PacketType::SendKeepAlive),
            0xA0 => Ok(PacketType::ReceiveKeepAlive),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            PacketType::SendCommand => 0x00,
            PacketType::Result => 0x20,
            PacketType::ReceiveMessage => 0x40,
            PacketType::SendKeepAlive => 0x80,
            PacketType::ReceiveKeepAlive => 0xA0,
        }
    }

    pub fn is_keepalive(self) -> bool {
        matches!(self, PacketType::SendKeepAlive | PacketType::ReceiveKeepAlive)
    }

    fn category(self) -> MethodCategory {
        match self {
            PacketType::ReceiveMessage => MethodCategory::Message,
            _ => MethodCategory::Command,
        }
    }
}

/// A decoded packet.
#[derive(Debug, Clone)]
pub struct Packet {
    /// `"Component.command"`, a numeric pair for unknown ids, or the
    /// literal `"KeepAlive"` for keepalive packets.
    pub method: String,
    pub packet_type: PacketType,
    /// Correlation id, echoed back by the peer.
    pub id: u16,
    /// Declared payload length from the header.
    pub payload_length: u32,
    /// The payload struct (present even for error packets).
    pub data: BlazeStruct,
    /// Application error resolved from the `ERRC` field, if any.
    pub error: Option<BlazeError>,
}

impl Packet {
    /// Builds an outbound command packet. The correlation id is
    /// assigned by the socket at send time.
    pub fn command(method: impl Into<String>, data: BlazeStruct) -> Self {
        Self {
            method: method.into(),
            packet_type: PacketType::SendCommand,
            id: 0,
            payload_length: 0,
            data,
            error: None,
        }
    }

    /// Reads the declared payload length from a header prefix.
    pub fn declared_payload_length(header: &[u8]) -> Result<usize, ProtocolError> {
        if header.len() < 4 {
            return Err(ProtocolError::Truncated {
                needed: 4 - header.len(),
            });
        }
        Ok(u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize)
    }

    /// Decodes one whole packet (header plus payload).
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: PACKET_HEADER_SIZE - buf.len(),
            });
        }

        let payload_length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let component = u16::from_be_bytes([buf[6], buf[7]]);
        let command = u16::from_be_bytes([buf[8], buf[9]]);
        let id = u16::from_be_bytes([buf[11], buf[12]]);
        let packet_type = PacketType::from_byte(buf[13])?;

        let method = if packet_type.is_keepalive() {
            "KeepAlive".to_string()
        } else {
            method::method_name(component, command, packet_type.category())
        };

        let mut cursor = &buf[PACKET_HEADER_SIZE..];
        let data = BlazeStruct::decode_root(&mut cursor)?;

        let error = match data.get("ERRC") {
            Some(Value::Int(value)) => Some(resolve_error(*value)),
            _ => None,
        };

        Ok(Self {
            method,
            packet_type,
            id,
            payload_length,
            data,
            error,
        })
    }

    /// Encodes the packet, backfilling the payload length.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let (component, command) = method::resolve_method(&self.method)
            .ok_or_else(|| ProtocolError::UnknownMethod(self.method.clone()))?;

        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE + 64);
        buf.put_u32(0); // length, backfilled below
        buf.put_u16(0);
        buf.put_u16(component);
        buf.put_u16(command);
        buf.put_u8(0);
        buf.put_u16(self.id);
        buf.put_u8(self.packet_type.byte());
        buf.put_u16(0);

        self.data.encode_root(&mut buf)?;

        let payload_length = (buf.len() - PACKET_HEADER_SIZE) as u32;
        buf[0..4].copy_from_slice(&payload_length.to_be_bytes());
        Ok(buf)
    }

    /// Splits the packet into a result or its application error.
    pub fn into_result(self) -> Result<Packet, BlazeError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

fn resolve_error(value: i64) -> BlazeError {
    let component = (value & 0xFFFF) as u16;
    let mut code = value >> 16;
    if code >= 16384 {
        code -= 16384;
    }

    let component_name = method::component_name(component)
        .map(str::to_string)
        .unwrap_or_else(|| component.to_string());

    match method::error_entry(component, code) {
        Some((name, description)) => BlazeError {
            component: component_name,
            code,
            name: name.to_string(),
            description,
        },
        None => BlazeError {
            component: component_name,
            code,
            name: code.to_string(),
            description: method::UNKNOWN_ERROR_DESCRIPTION,
        },
    }
}
