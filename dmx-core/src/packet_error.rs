// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The errors related to parsing and packing packets received/sent on the network.

use crate::{definitions::DMX_UNIVERSE_SIZE, priority::PriorityError, source_name::SourceNameError};

/// Errors of the sACN and Art-Net packet codecs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// When parsing packet invalid data encountered.
    ///
    /// # Arguments
    /// msg: A message providing further details (if any) as to what data was invalid.
    #[error("Error when parsing data into packet, msg: {0}")]
    ParseInvalidData(&'static str),

    /// Supplied buffer does not contain enough data.
    ///
    /// # Arguments
    /// msg: Which part of the packet was cut short.
    #[error("Supplied buffer does not contain enough data, msg: {0}")]
    ParseInsufficientData(&'static str),

    /// Supplied buffer is not large enough to pack packet into.
    ///
    /// # Arguments
    /// need: Bytes the packet needs
    ///
    /// have: Bytes the buffer has
    #[error("Supplied buffer is not large enough to pack packet into, need {need} bytes but got {have}")]
    PackBufferInsufficient {
        /// Bytes the packet needs
        need: usize,
        /// Bytes the buffer has
        have: usize,
    },

    /// Received PDU flags are invalid for parsing.
    ///
    /// # Arguments
    /// flags: The flags that were found which are invalid.
    #[error("PDU Flags {0:#b} are invalid for parsing")]
    ParsePduInvalidFlags(u8),

    /// Received PDU length is invalid.
    ///
    /// # Arguments
    /// len: The length provided in the Pdu which is invalid.
    #[error("PDU Length {0} is invalid")]
    PduInvalidLength(usize),

    /// Received PDU vector is invalid/unsupported.
    ///
    /// # Arguments
    /// vec: The vector parsed which is invalid / cannot be used.
    #[error("Vector {0:#x} not supported")]
    PduInvalidVector(u32),

    /// The Art-Net OpCode is not ArtDmx.
    ///
    /// # Arguments
    /// 0: The OpCode found in the packet
    #[error("Art-Net OpCode {0:#06x} not supported")]
    UnsupportedOpCode(u16),

    /// Too many values in a dmx data packet
    ///
    /// # Arguments
    /// 0: Number of values
    #[error("Too many DMX values. Maximum amount is {}, got {}", DMX_UNIVERSE_SIZE, .0)]
    TooManyDmxValues(usize),

    /// The universe can't be expressed by the protocol.
    ///
    /// # Arguments
    /// 0: The universe
    #[error("Universe {0} is out of range for the protocol")]
    InvalidUniverse(i32),

    /// Attempted to parse a priority value that is outwith the allowed range of [0, 200].
    /// As per ANSI E1.31-2018 Section 6.2.3
    #[error("Attempted to parse a priority value that is outwith the allowed range of [0, 200], msg: {0}")]
    ParseInvalidPriority(#[from] PriorityError),

    /// The source name is invalid.
    #[error("Invalid source name: {0}")]
    SourceName(#[from] SourceNameError),
}
