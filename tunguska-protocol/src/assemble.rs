//! Stream reassembly: turns arbitrary TCP/TLS chunk boundaries into
//! whole packets.
//!
//! The transport delivers byte chunks with no alignment guarantees. The
//! assembler reads the declared payload length from the 16-byte header
//! and accumulates chunks until one whole packet is buffered. A chunk
//! that would overrun the declared length is a framing fault: the
//! partial packet is discarded and the assembler resets to idle without
//! dispatching.

use crate::error::ProtocolError;
use crate::packet::{Packet, PACKET_HEADER_SIZE};

enum State {
    Idle,
    Accumulating {
        expected: usize,
        received: usize,
        buffer: Vec<u8>,
    },
}

/// Stream state machine reassembling packets from raw chunks.
pub struct PacketAssembler {
    state: State,
}

impl PacketAssembler {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Feeds one raw chunk, returning a packet once a whole one has
    /// been accumulated. A decode error discards the packet being
    /// assembled but leaves the assembler usable for the next one.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Packet>, ProtocolError> {
        match &mut self.state {
            State::Idle => {
                if chunk.len() < PACKET_HEADER_SIZE {
                    return Err(ProtocolError::Truncated {
                        needed: PACKET_HEADER_SIZE - chunk.len(),
                    });
                }
                let payload_length = Packet::declared_payload_length(chunk)?;
                let expected = PACKET_HEADER_SIZE + payload_length;

                if chunk.len() >= expected {
                    // Complete packet in a single chunk.
                    return Packet::decode(chunk).map(Some);
                }

                let mut buffer = vec![0u8; expected];
                buffer[..chunk.len()].copy_from_slice(chunk);
                self.state = State::Accumulating {
                    expected,
                    received: chunk.len(),
                    buffer,
                };
                Ok(None)
            }
            State::Accumulating {
                expected,
                received,
                buffer,
            } => {
                // A finished packet should already have reset us.
                if *received >= *expected {
                    tracing::warn!(
                        received = *received,
                        expected = *expected,
                        "assembler stuck past declared length, discarding partial packet"
                    );
                    self.state = State::Idle;
                    return Ok(None);
                }

                if *received + chunk.len() > *expected {
                    tracing::warn!(
                        received = *received,
                        expected = *expected,
                        chunk = chunk.len(),
                        "chunk overruns declared packet length, discarding partial packet"
                    );
                    self.state = State::Idle;
                    return Ok(None);
                }

                buffer[*received..*received + chunk.len()].copy_from_slice(chunk);
                *received += chunk.len();

                if *received >= *expected {
                    let buffer = std::mem::take(buffer);
                    self.state = State::Idle;
                    return Packet::decode(&buffer).map(Some);
                }
                Ok(None)
            }
        }
    }
}

impl Default for PacketAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;
    use crate::value::{BlazeStruct, Value};

    fn sample_packet() -> Vec<u8> {
        let data = BlazeStruct::new()
            .with(Tag::new("NAME").unwrap(), Value::Text("server one".into()))
            .with(Tag::new("GID ").unwrap(), Value::Int(123456));
        let mut packet = Packet::command("GameManager.joinGame", data);
        packet.id = 42;
        packet.encode().unwrap().to_vec()
    }

    #[test]
    fn test_whole_chunk() {
        let bytes = sample_packet();
        let mut assembler = PacketAssembler::new();
        let packet = assembler.push(&bytes).unwrap().unwrap();
        assert_eq!(packet.method, "GameManager.joinGame");
        assert_eq!(packet.id, 42);
        assert!(assembler.is_idle());
    }

    #[test]
    fn test_one_byte_chunks_match_whole() {
        let bytes = sample_packet();
        let whole = Packet::decode(&bytes).unwrap();

        let mut assembler = PacketAssembler::new();
        let mut dispatched = Vec::new();
        // The first chunk must still contain a readable header.
        assembler.push(&bytes[..PACKET_HEADER_SIZE]).unwrap();
        for b in &bytes[PACKET_HEADER_SIZE..] {
            if let Some(packet) = assembler.push(std::slice::from_ref(b)).unwrap() {
                dispatched.push(packet);
            }
        }

        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].method, whole.method);
        assert_eq!(dispatched[0].id, whole.id);
        assert_eq!(dispatched[0].data, whole.data);
        assert!(assembler.is_idle());
    }

    #[test]
    fn test_split_in_two() {
        let bytes = sample_packet();
        let mid = bytes.len() / 2;
        let mut assembler = PacketAssembler::new();
        assert!(assembler.push(&bytes[..mid]).unwrap().is_none());
        let packet = assembler.push(&bytes[mid..]).unwrap().unwrap();
        assert_eq!(packet.id, 42);
    }

    #[test]
    fn test_overflow_resets_without_dispatch() {
        let bytes = sample_packet();
        let mut assembler = PacketAssembler::new();
        assert!(assembler.push(&bytes[..bytes.len() - 4]).unwrap().is_none());
        // Eight more bytes than the packet has room for.
        let mut tail = bytes[bytes.len() - 4..].to_vec();
        tail.extend_from_slice(&[0u8; 8]);
        assert!(assembler.push(&tail).unwrap().is_none());
        assert!(assembler.is_idle());
    }

    #[test]
    fn test_back_to_back_packets() {
        let bytes = sample_packet();
        let mut assembler = PacketAssembler::new();
        assert!(assembler.push(&bytes).unwrap().is_some());
        assert!(assembler.push(&bytes).unwrap().is_some());
    }

    #[test]
    fn test_decode_error_resets_state() {
        // Header declaring a 1-byte payload holding an unknown type is
        // fatal for that packet only.
        let mut bad = vec![0u8; PACKET_HEADER_SIZE];
        bad[3] = 4; // payload length 4
        bad.extend_from_slice(&[0xD2, 0x5C, 0xF4, 11]);
        let mut assembler = PacketAssembler::new();
        assert!(assembler.push(&bad).is_err());
        assert!(assembler.is_idle());

        let good = sample_packet();
        assert!(assembler.push(&good).unwrap().is_some());
    }
}
