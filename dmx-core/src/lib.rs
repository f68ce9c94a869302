// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

//! Core types of the DMX port subsystem.
//!
//! Everything here is free of I/O: universe ranges and their local/extern mapping, priorities, the sACN and Art-Net data
//! packet codecs, and (with the `std` feature) the [signal::DmxSignal] that ports and listeners share.

pub mod artnet_packet;
pub mod communication_type;
pub mod definitions;
pub mod packet_error;
pub mod priority;
pub mod sacn_packet;
#[cfg(feature = "std")]
pub mod signal;
pub mod source_name;
#[cfg(feature = "std")]
pub mod timestamp;
pub mod universe;
pub mod universe_set;
