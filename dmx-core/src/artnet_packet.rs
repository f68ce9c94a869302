// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Packing and parsing of Art-Net 4 ArtDmx packets.
//!
//! Only ArtDmx carries universe data. Any other OpCode (ArtPoll, ArtSync, ...) is reported as
//! [PacketError::UnsupportedOpCode] so receivers can skip it.

use byteorder::{ByteOrder, LittleEndian, NetworkEndian};

use crate::{definitions::*, packet_error::PacketError};

const ID_INDEX: usize = 0;
const OP_CODE_INDEX: usize = ID_INDEX + ARTNET_ID.len();
const PROTOCOL_VERSION_INDEX: usize = OP_CODE_INDEX + 2;
const SEQUENCE_INDEX: usize = PROTOCOL_VERSION_INDEX + 2;
const PHYSICAL_INDEX: usize = SEQUENCE_INDEX + 1;
const PORT_ADDRESS_INDEX: usize = PHYSICAL_INDEX + 1;
const LENGTH_INDEX: usize = PORT_ADDRESS_INDEX + 2;
const DATA_INDEX: usize = ARTNET_DMX_HEADER_LENGTH;

/// An ArtDmx packet carrying one universe.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ArtDmxPacket<'a> {
    /// Sequence number, 0 disables sequencing at the receiver.
    pub sequence: u8,

    /// Physical input port the data originates from, informational only.
    pub physical: u8,

    /// 15 bit port address: net in bits 8 to 14, sub-net and universe in the low byte.
    pub port_address: u16,

    /// Slot values, at most 512. Packed with an even length, padded with a zero if needed.
    pub values: &'a [u8],
}

impl<'a> ArtDmxPacket<'a> {
    /// Number of bytes the packed packet takes.
    pub fn len(&self) -> usize {
        DATA_INDEX + Self::data_length(self.values.len())
    }

    /// The data length field has to be even and at least 2.
    const fn data_length(values: usize) -> usize {
        let even = values + values % 2;
        if even < 2 { 2 } else { even }
    }

    /// Packs the packet into `buf` and returns the number of bytes written.
    ///
    /// # Errors
    /// TooManyDmxValues: More than 512 slot values.
    ///
    /// InvalidUniverse: The port address does not fit into 15 bits.
    ///
    /// PackBufferInsufficient: `buf` is shorter than [Self::len].
    pub fn pack(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        if self.values.len() > DMX_UNIVERSE_SIZE {
            Err(PacketError::TooManyDmxValues(self.values.len()))?;
        }

        if i32::from(self.port_address) > ARTNET_MAX_UNIVERSE {
            Err(PacketError::InvalidUniverse(i32::from(self.port_address)))?;
        }

        let len = self.len();
        if buf.len() < len {
            Err(PacketError::PackBufferInsufficient { need: len, have: buf.len() })?;
        }

        buf[ID_INDEX..OP_CODE_INDEX].copy_from_slice(&ARTNET_ID);
        LittleEndian::write_u16(&mut buf[OP_CODE_INDEX..PROTOCOL_VERSION_INDEX], ARTNET_OP_DMX);
        NetworkEndian::write_u16(&mut buf[PROTOCOL_VERSION_INDEX..SEQUENCE_INDEX], ARTNET_PROTOCOL_VERSION);
        buf[SEQUENCE_INDEX] = self.sequence;
        buf[PHYSICAL_INDEX] = self.physical;
        LittleEndian::write_u16(&mut buf[PORT_ADDRESS_INDEX..LENGTH_INDEX], self.port_address);
        NetworkEndian::write_u16(&mut buf[LENGTH_INDEX..DATA_INDEX], (len - DATA_INDEX) as u16);

        buf[DATA_INDEX..DATA_INDEX + self.values.len()].copy_from_slice(self.values);
        buf[DATA_INDEX + self.values.len()..len].fill(0);

        Ok(len)
    }

    /// Parses an ArtDmx packet. The slot values borrow from `buf`.
    ///
    /// # Errors
    /// ParseInsufficientData: The buffer is shorter than the header or than the length field claims.
    ///
    /// ParseInvalidData: The packet does not start with the Art-Net ID.
    ///
    /// UnsupportedOpCode: The packet is a valid Art-Net packet, but not ArtDmx.
    ///
    /// TooManyDmxValues: The length field exceeds 512.
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketError> {
        if buf.len() < PROTOCOL_VERSION_INDEX {
            Err(PacketError::ParseInsufficientData("buffer shorter than Art-Net id and OpCode"))?;
        }

        if buf[ID_INDEX..OP_CODE_INDEX] != ARTNET_ID {
            Err(PacketError::ParseInvalidData("missing Art-Net id"))?;
        }

        let op_code = LittleEndian::read_u16(&buf[OP_CODE_INDEX..PROTOCOL_VERSION_INDEX]);
        if op_code != ARTNET_OP_DMX {
            Err(PacketError::UnsupportedOpCode(op_code))?;
        }

        if buf.len() < DATA_INDEX {
            Err(PacketError::ParseInsufficientData("buffer shorter than ArtDmx header"))?;
        }

        let length = NetworkEndian::read_u16(&buf[LENGTH_INDEX..DATA_INDEX]) as usize;
        if length > DMX_UNIVERSE_SIZE {
            Err(PacketError::TooManyDmxValues(length))?;
        }
        if buf.len() < DATA_INDEX + length {
            Err(PacketError::ParseInsufficientData("buffer shorter than ArtDmx length field"))?;
        }

        Ok(ArtDmxPacket {
            sequence: buf[SEQUENCE_INDEX],
            physical: buf[PHYSICAL_INDEX],
            // top bit of the net byte is reserved
            port_address: LittleEndian::read_u16(&buf[PORT_ADDRESS_INDEX..LENGTH_INDEX]) & 0x7fff,
            values: &buf[DATA_INDEX..DATA_INDEX + length],
        })
    }
}

#[cfg(test)]
mod test_artnet_packet {
    use super::*;

    #[test]
    fn test_header_fields_fill_the_header() {
        assert_eq!(LENGTH_INDEX + 2, ARTNET_DMX_HEADER_LENGTH);
        assert_eq!(ARTNET_MAX_DMX_PACKET_SIZE, 530);
    }

    #[test]
    fn test_header_layout() {
        let packet = ArtDmxPacket {
            sequence: 3,
            physical: 0,
            port_address: 0x0102,
            values: &[10, 20, 30, 40],
        };

        let mut buf = [0u8; ARTNET_MAX_DMX_PACKET_SIZE];
        let len = packet.pack(&mut buf).unwrap();

        assert_eq!(len, 22);
        assert_eq!(&buf[0..8], b"Art-Net\0");
        assert_eq!(&buf[8..10], &[0x00, 0x50]);
        assert_eq!(&buf[10..12], &[0x00, 14]);
        assert_eq!(buf[12], 3);
        // SubUni then Net
        assert_eq!(&buf[14..16], &[0x02, 0x01]);
        assert_eq!(&buf[16..18], &[0x00, 0x04]);
        assert_eq!(&buf[18..22], &[10, 20, 30, 40]);

        assert_eq!(ArtDmxPacket::parse(&buf[..len]).unwrap(), packet);
    }

    #[test]
    fn test_odd_length_is_padded() {
        let packet = ArtDmxPacket {
            sequence: 1,
            physical: 0,
            port_address: 0,
            values: &[1, 2, 3],
        };

        let mut buf = [0xffu8; ARTNET_MAX_DMX_PACKET_SIZE];
        let len = packet.pack(&mut buf).unwrap();
        assert_eq!(len, DATA_INDEX + 4);
        assert_eq!(&buf[DATA_INDEX..len], &[1, 2, 3, 0]);

        let empty = ArtDmxPacket { values: &[], ..packet };
        assert_eq!(empty.len(), DATA_INDEX + 2);
    }

    #[test]
    fn test_parse_skips_other_op_codes() {
        let mut poll = [0u8; 14];
        poll[..8].copy_from_slice(&ARTNET_ID);
        LittleEndian::write_u16(&mut poll[8..10], 0x2000);

        assert_eq!(ArtDmxPacket::parse(&poll), Err(PacketError::UnsupportedOpCode(0x2000)));
        assert!(matches!(ArtDmxPacket::parse(b"ASC-E1.17\0\0\0"), Err(PacketError::ParseInvalidData(_))));
    }

    #[test]
    fn test_pack_rejects_16_bit_port_address() {
        let packet = ArtDmxPacket {
            sequence: 1,
            physical: 0,
            port_address: 0x8000,
            values: &[],
        };
        let mut buf = [0u8; ARTNET_MAX_DMX_PACKET_SIZE];
        assert_eq!(packet.pack(&mut buf), Err(PacketError::InvalidUniverse(0x8000)));
    }
}
