// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Protocol constants shared by the sACN (ANSI E1.31-2018) and Art-Net 4 implementations.

use core::time::Duration;

/// The number of channels (slots) in one DMX512 universe, not counting the start code.
pub const DMX_UNIVERSE_SIZE: usize = 512;

/// The null start code that prefixes dimmer data as per ANSI E1.11.
pub const DMX_NULL_START_CODE: u8 = 0x00;

// --- sACN / ANSI E1.31-2018 ---

/// The port used for sACN traffic, multicast and unicast, as per ANSI E1.31-2018 Section 9.3.
pub const ACN_SDT_MULTICAST_PORT: u16 = 5568;

/// Lowest universe usable for sACN data as per ANSI E1.31-2018 Section 9.1.1.
pub const E131_MIN_UNIVERSE: i32 = 1;

/// Highest universe usable for sACN data as per ANSI E1.31-2018 Section 9.1.1.
pub const E131_MAX_UNIVERSE: i32 = 63999;

/// Value of the highest byte of the IPV4 multicast address as specified in section 9.3.1 of ANSI E1.31-2018.
pub const E131_MULTICAST_IPV4_HIGHEST_BYTE: u8 = 239;

/// Value of the second highest byte of the IPV4 multicast address as specified in section 9.3.1 of ANSI E1.31-2018.
pub const E131_MULTICAST_IPV4_SECOND_BYTE: u8 = 255;

/// The exclusive lower bound on the difference between the received and the last seen sequence number within which a
/// packet is discarded. Outside of (E131_SEQ_DIFF_DISCARD_LOWER_BOUND, E131_SEQ_DIFF_DISCARD_UPPER_BOUND] the packet is kept.
///
/// Value as specified in ANSI E1.31-2018 Section 6.7.2 Sequence Numbering.
pub const E131_SEQ_DIFF_DISCARD_LOWER_BOUND: isize = -20;

/// The inclusive upper bound on the difference between the received and the last seen sequence number within which a
/// packet is discarded. See [E131_SEQ_DIFF_DISCARD_LOWER_BOUND].
pub const E131_SEQ_DIFF_DISCARD_UPPER_BOUND: isize = 0;

/// The bit mask used to get the preview-data option within the packet option field as per ANSI E1.31-2018 Section 6.2.6
pub const E131_PREVIEW_DATA_OPTION_BIT_MASK: u8 = 0b1000_0000;

/// The bit mask used to get the stream-termination option within the packet option field as per ANSI E1.31-2018 Section 6.2.6
pub const E131_STREAM_TERMINATION_OPTION_BIT_MASK: u8 = 0b0100_0000;

/// The number of stream terminated packets sent when a source stops sending data to a universe.
/// As per ANSI E1.31-2018 Section 6.2.6.
pub const E131_TERMINATE_STREAM_PACKET_COUNT: usize = 3;

/// The timeout after which a source is considered lost, ANSI E1.31-2018 Section 6.7.1.
pub const E131_NETWORK_DATA_LOSS_TIMEOUT: Duration = Duration::from_millis(2500);

/// Interval after which the latest data of an idle universe is sent again.
/// Must stay well below [E131_NETWORK_DATA_LOSS_TIMEOUT], ANSI E1.31-2018 Appendix B.
pub const E131_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(1000);

/// The length in bytes of the flags and length field of every PDU.
pub const E131_PDU_LENGTH_FLAGS_LENGTH: usize = 2;

/// The PDU flags, stored in the top 4 bits of the flags and length field, ANSI E1.31-2018 Section 4 Table 4-1.
pub const E131_PDU_FLAGS: u8 = 0x70;

/// Size of the RLP preamble, ANSI E1.31-2018 Section 5.1.
pub const E131_PREAMBLE_SIZE: u16 = 0x0010;

/// Size of the RLP postamble, ANSI E1.31-2018 Section 5.2.
pub const E131_POSTAMBLE_SIZE: u16 = 0x0000;

/// The ACN packet identifier, ANSI E1.31-2018 Section 5.3.
pub const E131_ACN_PACKET_IDENTIFIER: [u8; 12] = [0x41, 0x53, 0x43, 0x2d, 0x45, 0x31, 0x2e, 0x31, 0x37, 0x00, 0x00, 0x00];

/// Length of the preamble size field.
pub const E131_PREAMBLE_SIZE_FIELD_LENGTH: usize = 2;

/// Length of the postamble size field.
pub const E131_POSTAMBLE_SIZE_FIELD_LENGTH: usize = 2;

/// Length of the root layer vector field.
pub const E131_ROOT_LAYER_VECTOR_LENGTH: usize = 4;

/// Length of the CID field.
pub const E131_CID_FIELD_LENGTH: usize = 16;

/// Length of the framing layer vector field.
pub const E131_FRAMING_LAYER_VECTOR_LENGTH: usize = 4;

/// Length of the source name field, ANSI E1.31-2018 Section 6.2.2.
pub const E131_SOURCE_NAME_FIELD_LENGTH: usize = 64;

/// Length of the priority field.
pub const E131_PRIORITY_FIELD_LENGTH: usize = 1;

/// Length of the synchronization address field.
pub const E131_SYNC_ADDR_FIELD_LENGTH: usize = 2;

/// Length of the sequence number field.
pub const E131_SEQ_NUM_FIELD_LENGTH: usize = 1;

/// Length of the options field.
pub const E131_OPTIONS_FIELD_LENGTH: usize = 1;

/// Length of the universe field.
pub const E131_UNIVERSE_FIELD_LENGTH: usize = 2;

/// Length of the DMP layer vector field.
pub const E131_DMP_LAYER_VECTOR_FIELD_LENGTH: usize = 1;

/// Length of the DMP layer address type and data type field.
pub const E131_DMP_LAYER_ADDRESS_DATA_FIELD_LENGTH: usize = 1;

/// Length of the DMP layer first property address field.
pub const E131_DMP_LAYER_FIRST_PROPERTY_ADDRESS_FIELD_LENGTH: usize = 2;

/// Length of the DMP layer address increment field.
pub const E131_DMP_LAYER_ADDRESS_INCREMENT_FIELD_LENGTH: usize = 2;

/// Length of the DMP layer property value count field.
pub const E131_DMP_LAYER_PROPERTY_VALUE_COUNT_FIELD_LENGTH: usize = 2;

/// Value of the DMP layer address type and data type field, ANSI E1.31-2018 Section 7.2.
pub const E131_DMP_LAYER_ADDRESS_DATA_FIELD: u8 = 0xa1;

/// Value of the DMP layer first property address field, ANSI E1.31-2018 Section 7.4.
pub const E131_DMP_LAYER_FIRST_PROPERTY_ADDRESS: u16 = 0x0000;

/// Value of the DMP layer address increment field, ANSI E1.31-2018 Section 7.5.
pub const E131_DMP_LAYER_ADDRESS_INCREMENT: u16 = 0x0001;

/// Root layer vector of a data packet, ANSI E1.31-2018 Appendix A.
pub const VECTOR_ROOT_E131_DATA: u32 = 0x0000_0004;

/// Root layer vector of synchronization and discovery packets, ANSI E1.31-2018 Appendix A.
pub const VECTOR_ROOT_E131_EXTENDED: u32 = 0x0000_0008;

/// Framing layer vector of a data packet, ANSI E1.31-2018 Appendix A.
pub const VECTOR_E131_DATA_PACKET: u32 = 0x0000_0002;

/// DMP layer vector of a data packet, ANSI E1.31-2018 Appendix A.
pub const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;

/// Largest sACN data packet: 125 bytes of headers, the start code and 512 slots.
pub const E131_MAX_DATA_PACKET_SIZE: usize = 638;

// --- Art-Net 4 ---

/// The UDP port used for all Art-Net traffic.
pub const ARTNET_PORT: u16 = 6454;

/// Lowest Art-Net port address.
pub const ARTNET_MIN_UNIVERSE: i32 = 0;

/// Highest Art-Net port address (15 bit: net, sub-net and universe).
pub const ARTNET_MAX_UNIVERSE: i32 = 32767;

/// The packet identifier at the start of every Art-Net packet.
pub const ARTNET_ID: [u8; 8] = *b"Art-Net\0";

/// OpCode of an ArtDmx packet, transmitted little endian.
pub const ARTNET_OP_DMX: u16 = 0x5000;

/// Art-Net protocol revision, transmitted big endian.
pub const ARTNET_PROTOCOL_VERSION: u16 = 14;

/// Length of the ArtDmx header before the data field.
pub const ARTNET_DMX_HEADER_LENGTH: usize = 18;

/// Largest ArtDmx packet.
pub const ARTNET_MAX_DMX_PACKET_SIZE: usize = ARTNET_DMX_HEADER_LENGTH + DMX_UNIVERSE_SIZE;

/// Interval after which the latest data of an idle Art-Net universe is sent again.
pub const ARTNET_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(4);
