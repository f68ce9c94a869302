// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Packing and parsing of sACN data packets, ANSI E1.31-2018 Section 4.1.
//!
//! A data packet nests three PDUs: the ACN root layer, the E1.31 framing layer and the DMP layer carrying the start code and
//! slot values. Synchronization and discovery packets are not handled here, parsing one yields
//! [PacketError::PduInvalidVector].
//!
//! # Examples
//!
//! ```
//! use dmx_core::priority::Priority;
//! use dmx_core::sacn_packet::SacnDataPacket;
//! use dmx_core::source_name::SourceName;
//! use uuid::Uuid;
//!
//! let packet = SacnDataPacket {
//!     cid: Uuid::from_bytes([7; 16]),
//!     source_name: SourceName::new("Console").unwrap(),
//!     priority: Priority::DEFAULT,
//!     synchronization_address: 0,
//!     sequence_number: 42,
//!     preview_data: false,
//!     stream_terminated: false,
//!     universe: 1,
//!     start_code: 0,
//!     values: &[255, 128, 0],
//! };
//!
//! let mut buf = [0u8; 638];
//! let len = packet.pack(&mut buf).unwrap();
//! assert_eq!(len, packet.len());
//!
//! let parsed = SacnDataPacket::parse(&buf[..len]).unwrap();
//! assert_eq!(parsed, packet);
//! ```

use core::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};
use uuid::Uuid;

use crate::{definitions::*, packet_error::PacketError, priority::Priority, source_name::SourceName};

/// Returns the multicast group an sACN universe is transmitted to, 239.255.{hi}.{lo} as per ANSI E1.31-2018 Section 9.3.1.
pub const fn universe_to_ipv4_multicast_addr(universe: u16) -> Ipv4Addr {
    let [hi, lo] = universe.to_be_bytes();
    Ipv4Addr::new(E131_MULTICAST_IPV4_HIGHEST_BYTE, E131_MULTICAST_IPV4_SECOND_BYTE, hi, lo)
}

// Calculate the indexes of the fields within the buffer based on the size of the fields previous.
// All indexes are absolute within a data packet.

// Root layer
const PREAMBLE_SIZE_INDEX: usize = 0;
const POSTAMBLE_SIZE_INDEX: usize = PREAMBLE_SIZE_INDEX + E131_PREAMBLE_SIZE_FIELD_LENGTH;
const ACN_IDENTIFIER_INDEX: usize = POSTAMBLE_SIZE_INDEX + E131_POSTAMBLE_SIZE_FIELD_LENGTH;
const ROOT_FLAGS_LENGTH_INDEX: usize = ACN_IDENTIFIER_INDEX + E131_ACN_PACKET_IDENTIFIER.len();
const ROOT_VECTOR_INDEX: usize = ROOT_FLAGS_LENGTH_INDEX + E131_PDU_LENGTH_FLAGS_LENGTH;
const CID_INDEX: usize = ROOT_VECTOR_INDEX + E131_ROOT_LAYER_VECTOR_LENGTH;

// Framing layer
const FRAMING_FLAGS_LENGTH_INDEX: usize = CID_INDEX + E131_CID_FIELD_LENGTH;
const FRAMING_VECTOR_INDEX: usize = FRAMING_FLAGS_LENGTH_INDEX + E131_PDU_LENGTH_FLAGS_LENGTH;
const SOURCE_NAME_INDEX: usize = FRAMING_VECTOR_INDEX + E131_FRAMING_LAYER_VECTOR_LENGTH;
const PRIORITY_INDEX: usize = SOURCE_NAME_INDEX + E131_SOURCE_NAME_FIELD_LENGTH;
const SYNC_ADDR_INDEX: usize = PRIORITY_INDEX + E131_PRIORITY_FIELD_LENGTH;
const SEQ_NUM_INDEX: usize = SYNC_ADDR_INDEX + E131_SYNC_ADDR_FIELD_LENGTH;
const OPTIONS_FIELD_INDEX: usize = SEQ_NUM_INDEX + E131_SEQ_NUM_FIELD_LENGTH;
const UNIVERSE_INDEX: usize = OPTIONS_FIELD_INDEX + E131_OPTIONS_FIELD_LENGTH;

// DMP layer
const DMP_FLAGS_LENGTH_INDEX: usize = UNIVERSE_INDEX + E131_UNIVERSE_FIELD_LENGTH;
const DMP_VECTOR_INDEX: usize = DMP_FLAGS_LENGTH_INDEX + E131_PDU_LENGTH_FLAGS_LENGTH;
const ADDRESS_DATA_FIELD_INDEX: usize = DMP_VECTOR_INDEX + E131_DMP_LAYER_VECTOR_FIELD_LENGTH;
const FIRST_PROPERTY_ADDRESS_INDEX: usize = ADDRESS_DATA_FIELD_INDEX + E131_DMP_LAYER_ADDRESS_DATA_FIELD_LENGTH;
const ADDRESS_INCREMENT_INDEX: usize = FIRST_PROPERTY_ADDRESS_INDEX + E131_DMP_LAYER_FIRST_PROPERTY_ADDRESS_FIELD_LENGTH;
const PROPERTY_VALUE_COUNT_INDEX: usize = ADDRESS_INCREMENT_INDEX + E131_DMP_LAYER_ADDRESS_INCREMENT_FIELD_LENGTH;
const START_CODE_INDEX: usize = PROPERTY_VALUE_COUNT_INDEX + E131_DMP_LAYER_PROPERTY_VALUE_COUNT_FIELD_LENGTH;
const SLOTS_INDEX: usize = START_CODE_INDEX + 1;

/// Reads the flags and length field of a PDU.
///
/// # Errors
/// ParsePduInvalidFlags: If the flags don't match the flags expected for an ANSI E1.31-2018 packet as per Section 4 Table 4-1.
fn pdu_length(buf: &[u8]) -> Result<usize, PacketError> {
    // Flags are stored in the top 4 bits.
    let flags = buf[0] & 0xf0;
    if flags != E131_PDU_FLAGS {
        Err(PacketError::ParsePduInvalidFlags(flags))?;
    }

    Ok((NetworkEndian::read_u16(&buf[0..E131_PDU_LENGTH_FLAGS_LENGTH]) & 0x0fff) as usize)
}

fn write_pdu_length(buf: &mut [u8], length: usize) {
    let flags_and_length = u16::from(E131_PDU_FLAGS) << 8 | (length as u16) & 0x0fff;
    NetworkEndian::write_u16(&mut buf[0..E131_PDU_LENGTH_FLAGS_LENGTH], flags_and_length);
}

/// An sACN data packet carrying one universe.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct SacnDataPacket<'a> {
    /// Component identifier of the sending source.
    pub cid: Uuid,

    /// The name of the source.
    pub source_name: SourceName,

    /// Priority of the data within the universe, higher wins when merging.
    pub priority: Priority,

    /// Universe used to synchronize this packet, 0 if unsynchronized.
    pub synchronization_address: u16,

    /// Sequence number of the packet, per universe and source.
    pub sequence_number: u8,

    /// The data is intended for visualisation only.
    pub preview_data: bool,

    /// The source stops sending to this universe.
    pub stream_terminated: bool,

    /// The universe the data is for.
    pub universe: u16,

    /// DMX start code, 0 for dimmer data.
    pub start_code: u8,

    /// Slot values following the start code, at most 512.
    pub values: &'a [u8],
}

impl<'a> SacnDataPacket<'a> {
    /// Number of bytes the packed packet takes.
    pub fn len(&self) -> usize {
        SLOTS_INDEX + self.values.len()
    }

    /// Packs the packet into `buf` and returns the number of bytes written.
    ///
    /// # Errors
    /// TooManyDmxValues: More than 512 slot values.
    ///
    /// InvalidUniverse: The universe is outside of 1..=63999.
    ///
    /// PackBufferInsufficient: `buf` is shorter than [Self::len].
    pub fn pack(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        if self.values.len() > DMX_UNIVERSE_SIZE {
            Err(PacketError::TooManyDmxValues(self.values.len()))?;
        }

        if !(E131_MIN_UNIVERSE..=E131_MAX_UNIVERSE).contains(&i32::from(self.universe)) {
            Err(PacketError::InvalidUniverse(i32::from(self.universe)))?;
        }

        let len = self.len();
        if buf.len() < len {
            Err(PacketError::PackBufferInsufficient { need: len, have: buf.len() })?;
        }

        // Root layer
        NetworkEndian::write_u16(&mut buf[PREAMBLE_SIZE_INDEX..POSTAMBLE_SIZE_INDEX], E131_PREAMBLE_SIZE);
        NetworkEndian::write_u16(&mut buf[POSTAMBLE_SIZE_INDEX..ACN_IDENTIFIER_INDEX], E131_POSTAMBLE_SIZE);
        buf[ACN_IDENTIFIER_INDEX..ROOT_FLAGS_LENGTH_INDEX].copy_from_slice(&E131_ACN_PACKET_IDENTIFIER);
        write_pdu_length(&mut buf[ROOT_FLAGS_LENGTH_INDEX..], len - ROOT_FLAGS_LENGTH_INDEX);
        NetworkEndian::write_u32(&mut buf[ROOT_VECTOR_INDEX..CID_INDEX], VECTOR_ROOT_E131_DATA);
        buf[CID_INDEX..FRAMING_FLAGS_LENGTH_INDEX].copy_from_slice(self.cid.as_bytes());

        // Framing layer
        write_pdu_length(&mut buf[FRAMING_FLAGS_LENGTH_INDEX..], len - FRAMING_FLAGS_LENGTH_INDEX);
        NetworkEndian::write_u32(&mut buf[FRAMING_VECTOR_INDEX..SOURCE_NAME_INDEX], VECTOR_E131_DATA_PACKET);

        // Source name, null padded. SourceName::CAPACITY leaves room for the terminator.
        buf[SOURCE_NAME_INDEX..PRIORITY_INDEX].fill(0);
        buf[SOURCE_NAME_INDEX..SOURCE_NAME_INDEX + self.source_name.len()].copy_from_slice(self.source_name.as_bytes());

        buf[PRIORITY_INDEX] = self.priority.get();
        NetworkEndian::write_u16(&mut buf[SYNC_ADDR_INDEX..SEQ_NUM_INDEX], self.synchronization_address);
        buf[SEQ_NUM_INDEX] = self.sequence_number;

        let mut options = 0;
        if self.preview_data {
            options |= E131_PREVIEW_DATA_OPTION_BIT_MASK;
        }
        if self.stream_terminated {
            options |= E131_STREAM_TERMINATION_OPTION_BIT_MASK;
        }
        buf[OPTIONS_FIELD_INDEX] = options;

        NetworkEndian::write_u16(&mut buf[UNIVERSE_INDEX..DMP_FLAGS_LENGTH_INDEX], self.universe);

        // DMP layer
        write_pdu_length(&mut buf[DMP_FLAGS_LENGTH_INDEX..], len - DMP_FLAGS_LENGTH_INDEX);
        buf[DMP_VECTOR_INDEX] = VECTOR_DMP_SET_PROPERTY;
        buf[ADDRESS_DATA_FIELD_INDEX] = E131_DMP_LAYER_ADDRESS_DATA_FIELD;
        NetworkEndian::write_u16(
            &mut buf[FIRST_PROPERTY_ADDRESS_INDEX..ADDRESS_INCREMENT_INDEX],
            E131_DMP_LAYER_FIRST_PROPERTY_ADDRESS,
        );
        NetworkEndian::write_u16(&mut buf[ADDRESS_INCREMENT_INDEX..PROPERTY_VALUE_COUNT_INDEX], E131_DMP_LAYER_ADDRESS_INCREMENT);

        // Property value count includes the start code
        NetworkEndian::write_u16(&mut buf[PROPERTY_VALUE_COUNT_INDEX..START_CODE_INDEX], (self.values.len() + 1) as u16);
        buf[START_CODE_INDEX] = self.start_code;
        buf[SLOTS_INDEX..len].copy_from_slice(self.values);

        Ok(len)
    }

    /// Parses a data packet. The slot values borrow from `buf`.
    ///
    /// # Errors
    /// ParseInsufficientData: The buffer is shorter than the packet headers or than a PDU length field claims.
    ///
    /// ParseInvalidData: Preamble, postamble, ACN identifier or a DMP layer field hold unexpected values.
    ///
    /// PduInvalidVector: The packet is not a data packet, e.g. a synchronization or discovery packet.
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketError> {
        if buf.len() < SLOTS_INDEX {
            Err(PacketError::ParseInsufficientData("buffer shorter than data packet headers"))?;
        }

        // Root layer
        if NetworkEndian::read_u16(&buf[PREAMBLE_SIZE_INDEX..POSTAMBLE_SIZE_INDEX]) != E131_PREAMBLE_SIZE {
            Err(PacketError::ParseInvalidData("invalid preamble size"))?;
        }
        if NetworkEndian::read_u16(&buf[POSTAMBLE_SIZE_INDEX..ACN_IDENTIFIER_INDEX]) != E131_POSTAMBLE_SIZE {
            Err(PacketError::ParseInvalidData("invalid postamble size"))?;
        }
        if buf[ACN_IDENTIFIER_INDEX..ROOT_FLAGS_LENGTH_INDEX] != E131_ACN_PACKET_IDENTIFIER {
            Err(PacketError::ParseInvalidData("invalid ACN packet identifier"))?;
        }

        let root_length = pdu_length(&buf[ROOT_FLAGS_LENGTH_INDEX..])?;
        if buf.len() < ROOT_FLAGS_LENGTH_INDEX + root_length {
            Err(PacketError::ParseInsufficientData("buffer shorter than root layer pdu length field"))?;
        }

        let root_vector = NetworkEndian::read_u32(&buf[ROOT_VECTOR_INDEX..CID_INDEX]);
        if root_vector != VECTOR_ROOT_E131_DATA {
            Err(PacketError::PduInvalidVector(root_vector))?;
        }

        let mut cid = [0u8; E131_CID_FIELD_LENGTH];
        cid.copy_from_slice(&buf[CID_INDEX..FRAMING_FLAGS_LENGTH_INDEX]);
        let cid = Uuid::from_bytes(cid);

        // Framing layer
        let framing_length = pdu_length(&buf[FRAMING_FLAGS_LENGTH_INDEX..])?;
        if FRAMING_FLAGS_LENGTH_INDEX + framing_length != ROOT_FLAGS_LENGTH_INDEX + root_length {
            Err(PacketError::PduInvalidLength(framing_length))?;
        }

        let framing_vector = NetworkEndian::read_u32(&buf[FRAMING_VECTOR_INDEX..SOURCE_NAME_INDEX]);
        if framing_vector != VECTOR_E131_DATA_PACKET {
            Err(PacketError::PduInvalidVector(framing_vector))?;
        }

        let source_name = SourceName::try_from(&buf[SOURCE_NAME_INDEX..PRIORITY_INDEX])?;
        let priority = Priority::new(buf[PRIORITY_INDEX])?;
        let synchronization_address = NetworkEndian::read_u16(&buf[SYNC_ADDR_INDEX..SEQ_NUM_INDEX]);
        let sequence_number = buf[SEQ_NUM_INDEX];

        // Options, stored as bit flag.
        let preview_data = buf[OPTIONS_FIELD_INDEX] & E131_PREVIEW_DATA_OPTION_BIT_MASK != 0;
        let stream_terminated = buf[OPTIONS_FIELD_INDEX] & E131_STREAM_TERMINATION_OPTION_BIT_MASK != 0;

        let universe = NetworkEndian::read_u16(&buf[UNIVERSE_INDEX..DMP_FLAGS_LENGTH_INDEX]);
        if !(E131_MIN_UNIVERSE..=E131_MAX_UNIVERSE).contains(&i32::from(universe)) {
            Err(PacketError::InvalidUniverse(i32::from(universe)))?;
        }

        // DMP layer
        let dmp_length = pdu_length(&buf[DMP_FLAGS_LENGTH_INDEX..])?;
        let end = DMP_FLAGS_LENGTH_INDEX + dmp_length;
        if end != ROOT_FLAGS_LENGTH_INDEX + root_length || end < SLOTS_INDEX {
            Err(PacketError::PduInvalidLength(dmp_length))?;
        }

        if buf[DMP_VECTOR_INDEX] != VECTOR_DMP_SET_PROPERTY {
            Err(PacketError::PduInvalidVector(u32::from(buf[DMP_VECTOR_INDEX])))?;
        }
        if buf[ADDRESS_DATA_FIELD_INDEX] != E131_DMP_LAYER_ADDRESS_DATA_FIELD {
            Err(PacketError::ParseInvalidData("invalid Address and Data Type"))?;
        }
        if NetworkEndian::read_u16(&buf[FIRST_PROPERTY_ADDRESS_INDEX..ADDRESS_INCREMENT_INDEX]) != E131_DMP_LAYER_FIRST_PROPERTY_ADDRESS {
            Err(PacketError::ParseInvalidData("invalid First Property Address"))?;
        }
        if NetworkEndian::read_u16(&buf[ADDRESS_INCREMENT_INDEX..PROPERTY_VALUE_COUNT_INDEX]) != E131_DMP_LAYER_ADDRESS_INCREMENT {
            Err(PacketError::ParseInvalidData("invalid Address Increment"))?;
        }

        // The count includes the start code, it has to agree with the pdu length.
        let property_value_count = NetworkEndian::read_u16(&buf[PROPERTY_VALUE_COUNT_INDEX..START_CODE_INDEX]) as usize;
        if START_CODE_INDEX + property_value_count != end {
            Err(PacketError::ParseInvalidData("property value count disagrees with dmp layer length"))?;
        }
        if property_value_count - 1 > DMX_UNIVERSE_SIZE {
            Err(PacketError::TooManyDmxValues(property_value_count - 1))?;
        }

        Ok(SacnDataPacket {
            cid,
            source_name,
            priority,
            synchronization_address,
            sequence_number,
            preview_data,
            stream_terminated,
            universe,
            start_code: buf[START_CODE_INDEX],
            values: &buf[SLOTS_INDEX..end],
        })
    }
}

#[cfg(test)]
mod test_sacn_packet {
    use super::*;

    fn packet(values: &[u8]) -> SacnDataPacket<'_> {
        SacnDataPacket {
            cid: Uuid::from_bytes([0xab; 16]),
            source_name: SourceName::new("Test Source").unwrap(),
            priority: Priority::new(150).unwrap(),
            synchronization_address: 0,
            sequence_number: 7,
            preview_data: false,
            stream_terminated: false,
            universe: 0x1234,
            start_code: DMX_NULL_START_CODE,
            values,
        }
    }

    #[test]
    fn test_field_offsets() {
        let values = [1u8; DMX_UNIVERSE_SIZE];
        let mut buf = [0u8; E131_MAX_DATA_PACKET_SIZE];
        let len = packet(&values).pack(&mut buf).unwrap();

        assert_eq!(len, E131_MAX_DATA_PACKET_SIZE);
        assert_eq!(&buf[4..16], &E131_ACN_PACKET_IDENTIFIER);
        // root layer length: 638 - 16 = 622 = 0x26e
        assert_eq!(&buf[16..18], &[0x72, 0x6e]);
        assert_eq!(&buf[22..38], &[0xab; 16]);
        assert_eq!(&buf[44..55], b"Test Source");
        assert_eq!(buf[108], 150);
        assert_eq!(buf[111], 7);
        assert_eq!(&buf[113..115], &[0x12, 0x34]);
        assert_eq!(buf[117], VECTOR_DMP_SET_PROPERTY);
        // property value count: 513
        assert_eq!(&buf[123..125], &[0x02, 0x01]);
        assert_eq!(buf[125], 0);
        assert_eq!(buf[126], 1);
    }

    #[test]
    fn test_parse_packed_options() {
        let mut terminated = packet(&[9, 8, 7]);
        terminated.stream_terminated = true;
        terminated.preview_data = true;

        let mut buf = [0u8; E131_MAX_DATA_PACKET_SIZE];
        let len = terminated.pack(&mut buf).unwrap();
        assert_eq!(buf[OPTIONS_FIELD_INDEX], 0b1100_0000);

        let parsed = SacnDataPacket::parse(&buf[..len]).unwrap();
        assert!(parsed.stream_terminated);
        assert!(parsed.preview_data);
        assert_eq!(parsed.values, &[9, 8, 7]);
    }

    #[test]
    fn test_parse_rejects_truncated_packet() {
        let mut buf = [0u8; E131_MAX_DATA_PACKET_SIZE];
        let len = packet(&[0; 10]).pack(&mut buf).unwrap();

        assert!(matches!(SacnDataPacket::parse(&buf[..len - 1]), Err(PacketError::ParseInsufficientData(_))));
        assert!(matches!(SacnDataPacket::parse(&buf[..100]), Err(PacketError::ParseInsufficientData(_))));
    }

    #[test]
    fn test_parse_rejects_foreign_packets() {
        let mut buf = [0u8; E131_MAX_DATA_PACKET_SIZE];
        let len = packet(&[0; 10]).pack(&mut buf).unwrap();

        let mut extended = buf;
        NetworkEndian::write_u32(&mut extended[ROOT_VECTOR_INDEX..CID_INDEX], VECTOR_ROOT_E131_EXTENDED);
        assert_eq!(SacnDataPacket::parse(&extended[..len]), Err(PacketError::PduInvalidVector(VECTOR_ROOT_E131_EXTENDED)));

        let mut artnet = buf;
        artnet[..8].copy_from_slice(&ARTNET_ID);
        assert!(matches!(SacnDataPacket::parse(&artnet[..len]), Err(PacketError::ParseInvalidData(_))));
    }

    #[test]
    fn test_pack_rejects_invalid_universe() {
        let mut buf = [0u8; E131_MAX_DATA_PACKET_SIZE];
        let mut invalid = packet(&[]);
        invalid.universe = 0;
        assert_eq!(invalid.pack(&mut buf), Err(PacketError::InvalidUniverse(0)));
        invalid.universe = 64000;
        assert_eq!(invalid.pack(&mut buf), Err(PacketError::InvalidUniverse(64000)));
    }

    #[test]
    fn test_pack_rejects_small_buffer() {
        let mut buf = [0u8; 100];
        assert_eq!(
            packet(&[0; 3]).pack(&mut buf),
            Err(PacketError::PackBufferInsufficient { need: 129, have: 100 })
        );
    }

    #[test]
    fn test_multicast_addr() {
        assert_eq!(universe_to_ipv4_multicast_addr(1), Ipv4Addr::new(239, 255, 0, 1));
        assert_eq!(universe_to_ipv4_multicast_addr(63999), Ipv4Addr::new(239, 255, 249, 255));
    }
}
