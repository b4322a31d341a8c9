//! Codec for the Blaze tagged binary protocol.
//!
//! The wire format is a stream of packets, each a fixed 16-byte header
//! followed by a tagged struct payload. Payload values are typed
//! (integers, strings, blobs, nested structs, lists, maps, unions) and
//! keyed by compressed 4-character tags. This crate provides the codec
//! layers from varints up to whole packets, plus a [`PacketAssembler`]
//! that reassembles packets from arbitrary stream chunk boundaries.
//!
//! ```
//! use tunguska_protocol::{BlazeStruct, Packet, Tag, Value};
//!
//! let data = BlazeStruct::new()
//!     .with(Tag::new("AUTH").unwrap(), Value::Text("code".into()));
//! let mut packet = Packet::command("Authentication.login", data);
//! packet.id = 1;
//! let bytes = packet.encode().unwrap();
//! let decoded = Packet::decode(&bytes).unwrap();
//! assert_eq!(decoded.method, "Authentication.login");
//! ```

mod assemble;
mod error;
pub mod method;
mod packet;
mod tag;
mod value;
pub mod varint;

pub use assemble::PacketAssembler;
pub use error::{BlazeError, ProtocolError};
pub use method::MethodCategory;
pub use packet::{Packet, PacketType, KEEPALIVE_FRAME, PACKET_HEADER_SIZE};
pub use tag::Tag;
pub use value::{BlazeStruct, FieldKey, Value, ValueKind, UNION_EMPTY};
