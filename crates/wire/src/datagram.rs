//! Datagram framing and chunking.
//!
//! Header layout is a fixed 8 bytes: connection id (4B LE), opcode (1B),
//! message id (1B, wraps), block number (1B), and one trailing byte that
//! carries the total block count on `Data0` and is otherwise unused.

use crate::Error;
use bytes::{Bytes, BytesMut, BufMut};

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Data0 = 0,
    DataN = 1,
    Ping = 2,
    Err = 3,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Data0),
            1 => Ok(Self::DataN),
            2 => Ok(Self::Ping),
            3 => Ok(Self::Err),
            _ => Err(Error::InvalidInput),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DatagramHeader {
    pub connection_id: u32,
    pub opcode: Opcode,
    pub message_id: u8,
    pub block_number: u8,
    pub extra: u8,
}

impl DatagramHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.connection_id);
        buf.put_u8(self.opcode as u8);
        buf.put_u8(self.message_id);
        buf.put_u8(self.block_number);
        buf.put_u8(self.extra);
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }

        Ok(Self {
            connection_id: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            opcode: Opcode::from_u8(bytes[4])?,
            message_id: bytes[5],
            block_number: bytes[6],
            extra: bytes[7],
        })
    }
}

#[derive(Debug)]
pub struct DatagramPacket {
    pub header: DatagramHeader,
    pub payload: Bytes,
}

pub fn decode_packet(bytes: &[u8]) -> Result<DatagramPacket, Error> {
    let header = DatagramHeader::decode(bytes)?;
    Ok(DatagramPacket {
        header,
        payload: Bytes::copy_from_slice(&bytes[HEADER_LEN..]),
    })
}

/// Split a serialized message into datagram blocks, each no larger than
/// `dgram_size` including the 8-byte header. `message_id` is the caller's
/// wrapping per-message counter.
///
/// # Test
///
/// ```
/// use graphnode_wire::datagram::{chunk_message, Opcode, decode_packet};
///
/// let payload = vec![7u8; 25];
/// let blocks = chunk_message(1, 0, 18, &payload);
/// // capacity per block is 18 - 8 = 10, so 25 bytes needs 3 blocks
/// assert_eq!(blocks.len(), 3);
///
/// let first = decode_packet(&blocks[0]).unwrap();
/// assert_eq!(first.header.opcode, Opcode::Data0);
/// assert_eq!(first.header.extra, 3);
/// ```
pub fn chunk_message(connection_id: u32, message_id: u8, dgram_size: usize, payload: &[u8]) -> Vec<Bytes> {
    let capacity = dgram_size.saturating_sub(HEADER_LEN).max(1);
    let total_blocks = payload.len().div_ceil(capacity).max(1);

    (0..total_blocks)
        .map(|block| {
            let start = block * capacity;
            let end = (start + capacity).min(payload.len());
            let chunk = &payload[start..end];

            let header = DatagramHeader {
                connection_id,
                opcode: if block == 0 { Opcode::Data0 } else { Opcode::DataN },
                message_id,
                block_number: block as u8,
                extra: if block == 0 { total_blocks as u8 } else { 0 },
            };

            let mut buf = BytesMut::with_capacity(HEADER_LEN + chunk.len());
            header.encode(&mut buf);
            buf.extend_from_slice(chunk);
            buf.freeze()
        })
        .collect()
}

/// Single-slot datagram reassembly for a subscriber endpoint, per the
/// intentional single-slot-per-endpoint design.
#[derive(Default)]
pub struct Reassembler {
    slot: Option<Slot>,
}

struct Slot {
    message_id: u8,
    connection_id: u32,
    total_blocks: u8,
    received: Vec<Option<Bytes>>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one decoded datagram packet. Returns the reassembled message
    /// once the final block arrives. Mismatched message/connection ids are
    /// discarded silently, per spec.
    pub fn accept(&mut self, packet: DatagramPacket) -> Option<Bytes> {
        match packet.header.opcode {
            Opcode::Data0 => {
                let total_blocks = packet.header.extra;
                if total_blocks <= 1 {
                    self.slot = None;
                    return Some(packet.payload);
                }

                let mut received = vec![None; total_blocks as usize];
                received[0] = Some(packet.payload);
                self.slot = Some(Slot {
                    message_id: packet.header.message_id,
                    connection_id: packet.header.connection_id,
                    total_blocks,
                    received,
                });
                None
            }
            Opcode::DataN => {
                let slot = self.slot.as_mut()?;
                if slot.message_id != packet.header.message_id
                    || slot.connection_id != packet.header.connection_id
                {
                    return None;
                }

                let index = packet.header.block_number as usize;
                if index >= slot.received.len() {
                    return None;
                }
                slot.received[index] = Some(packet.payload);

                if index as u8 == slot.total_blocks - 1 && slot.received.iter().all(Option::is_some) {
                    let slot = self.slot.take().unwrap();
                    let mut message = BytesMut::new();
                    for block in slot.received.into_iter().flatten() {
                        message.extend_from_slice(&block);
                    }
                    Some(message.freeze())
                } else {
                    None
                }
            }
            Opcode::Ping | Opcode::Err => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_multi_block_message() {
        let payload = (0u8..40).collect::<Vec<_>>();
        let blocks = chunk_message(5, 3, 16, &payload);
        assert!(blocks.len() > 1);

        let mut reassembler = Reassembler::new();
        let mut result = None;
        for block in &blocks {
            let packet = decode_packet(block).unwrap();
            if let Some(message) = reassembler.accept(packet) {
                result = Some(message);
            }
        }
        assert_eq!(result.unwrap().as_ref(), payload.as_slice());
    }

    #[test]
    fn mismatched_message_id_is_discarded() {
        let payload = vec![1u8; 30];
        let blocks = chunk_message(1, 9, 16, &payload);
        let mut reassembler = Reassembler::new();
        reassembler.accept(decode_packet(&blocks[0]).unwrap());

        let mut tampered = BytesMut::from(&blocks[1][..]);
        tampered[5] = 200; // different message id
        assert!(reassembler.accept(decode_packet(&tampered).unwrap()).is_none());
    }
}
