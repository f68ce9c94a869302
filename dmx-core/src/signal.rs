// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! One universe of DMX channel data plus the metadata it was produced with.
//!
//! Signals are created by whoever produces them (a receiver on packet arrival, an output port when sending) and are then
//! shared as `Arc<DmxSignal>` between ports, listeners and senders. A producer that updates its cached signal in place does
//! so through [`std::sync::Arc::make_mut`], so every consumer holding a clone keeps observing the value it was handed.
//!
//! # Examples
//!
//! ```
//! use dmx_core::signal::DmxSignal;
//! use dmx_core::priority::Priority;
//!
//! let mut signal = DmxSignal::new(7, Priority::DEFAULT);
//! signal.write_channel(1, 255).unwrap();
//! signal.write_channel(512, 10).unwrap();
//! assert!(signal.write_channel(513, 1).is_err());
//!
//! assert_eq!(signal.read_channel(1), Some(255));
//! assert_eq!(signal.channel_data()[511], 10);
//! ```

use core::fmt;

use crate::{definitions::DMX_UNIVERSE_SIZE, priority::Priority, timestamp::Timestamp};

/// A single universe's worth of channel data.
///
/// The channel data is always exactly [DMX_UNIVERSE_SIZE] bytes. Channels are addressed 1-based, like DMX addresses.
#[derive(Clone)]
pub struct DmxSignal {
    extern_universe_id: i32,
    channel_data: [u8; DMX_UNIVERSE_SIZE],
    sequence: u32,
    timestamp: Timestamp,
    priority: Priority,
}

impl DmxSignal {
    /// Creates a signal with all channels at zero, sequence 0 and a fresh timestamp
    pub fn new(extern_universe_id: i32, priority: Priority) -> Self {
        Self {
            extern_universe_id,
            channel_data: [0; DMX_UNIVERSE_SIZE],
            sequence: 0,
            timestamp: Timestamp::now(),
            priority,
        }
    }

    /// Creates a signal from received slot values. Fewer than [DMX_UNIVERSE_SIZE] values imply trailing zeros.
    ///
    /// # Errors
    /// TooManyValues: More than [DMX_UNIVERSE_SIZE] values were given.
    pub fn from_slice(extern_universe_id: i32, values: &[u8], sequence: u32, priority: Priority) -> Result<Self, SignalError> {
        if values.len() > DMX_UNIVERSE_SIZE {
            return Err(SignalError::TooManyValues(values.len()));
        }

        let mut channel_data = [0; DMX_UNIVERSE_SIZE];
        channel_data[..values.len()].copy_from_slice(values);

        Ok(Self {
            extern_universe_id,
            channel_data,
            sequence,
            timestamp: Timestamp::now(),
            priority,
        })
    }

    /// The universe in the protocol's address space
    pub const fn extern_universe_id(&self) -> i32 {
        self.extern_universe_id
    }

    /// All 512 channel values, index 0 holds channel 1
    pub const fn channel_data(&self) -> &[u8; DMX_UNIVERSE_SIZE] {
        &self.channel_data
    }

    /// Sequence number assigned by the producer, increases with every signal the producer emits for the universe
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    /// When the signal was captured or last updated
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Priority the signal was sent or received with
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the value of a 1-based channel, or None if the channel is outside 1..=512
    pub fn read_channel(&self, channel: u16) -> Option<u8> {
        Self::channel_index(channel).map(|idx| self.channel_data[idx])
    }

    /// Writes a 1-based channel.
    ///
    /// # Errors
    /// ChannelOutOfRange: The channel is outside 1..=512, the signal is left untouched.
    pub fn write_channel(&mut self, channel: u16, value: u8) -> Result<(), SignalError> {
        let idx = Self::channel_index(channel).ok_or(SignalError::ChannelOutOfRange(channel))?;
        self.channel_data[idx] = value;
        Ok(())
    }

    /// Overwrites all channel values. Fewer than [DMX_UNIVERSE_SIZE] values leave the remaining channels untouched.
    ///
    /// # Errors
    /// TooManyValues: More than [DMX_UNIVERSE_SIZE] values were given, the signal is left untouched.
    pub fn write_channels(&mut self, values: &[u8]) -> Result<(), SignalError> {
        if values.len() > DMX_UNIVERSE_SIZE {
            return Err(SignalError::TooManyValues(values.len()));
        }

        self.channel_data[..values.len()].copy_from_slice(values);
        Ok(())
    }

    /// Marks the signal as produced anew: sets the sequence number and takes a fresh timestamp
    pub fn stamp(&mut self, sequence: u32) {
        self.sequence = sequence;
        self.timestamp = Timestamp::now();
    }

    /// Sets the priority
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Moves the signal to another extern universe
    pub fn set_extern_universe_id(&mut self, extern_universe_id: i32) {
        self.extern_universe_id = extern_universe_id;
    }

    /// Returns true if 1 <= channel <= 512
    pub const fn is_valid_channel(channel: u16) -> bool {
        channel >= 1 && channel as usize <= DMX_UNIVERSE_SIZE
    }

    fn channel_index(channel: u16) -> Option<usize> {
        if Self::is_valid_channel(channel) { Some(channel as usize - 1) } else { None }
    }
}

impl fmt::Debug for DmxSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The channel data is left out, 512 values drown everything else
        f.debug_struct("DmxSignal")
            .field("extern_universe_id", &self.extern_universe_id)
            .field("sequence", &self.sequence)
            .field("priority", &self.priority)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Signals compare by universe and data only, like two captures of the same DMX frame.
impl PartialEq for DmxSignal {
    fn eq(&self, other: &Self) -> bool {
        self.extern_universe_id == other.extern_universe_id && self.channel_data == other.channel_data
    }
}

impl Eq for DmxSignal {}

/// Errors when reading or writing signal data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// A channel outside 1..=512 was addressed.
    ///
    /// # Arguments
    /// 0: The channel
    #[error("DMX channel {0} is out of range, channels are 1 to {DMX_UNIVERSE_SIZE}")]
    ChannelOutOfRange(u16),

    /// More values than a universe holds were given.
    ///
    /// # Arguments
    /// 0: Number of values
    #[error("Too many DMX values, maximum is {DMX_UNIVERSE_SIZE}, got {0}")]
    TooManyValues(usize),
}

#[cfg(test)]
mod test_signal {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_channels_are_one_based() {
        let mut signal = DmxSignal::new(1, Priority::DEFAULT);
        signal.write_channel(1, 11).unwrap();
        signal.write_channel(512, 22).unwrap();

        assert_eq!(signal.channel_data()[0], 11);
        assert_eq!(signal.channel_data()[511], 22);
        assert_eq!(signal.read_channel(0), None);
        assert_eq!(signal.read_channel(513), None);
    }

    #[test]
    fn test_out_of_range_write_is_rejected() {
        let mut signal = DmxSignal::new(1, Priority::DEFAULT);
        assert_eq!(signal.write_channel(0, 1), Err(SignalError::ChannelOutOfRange(0)));
        assert_eq!(signal.write_channel(513, 1), Err(SignalError::ChannelOutOfRange(513)));
        assert!(signal.channel_data().iter().all(|v| *v == 0));
    }

    #[test]
    fn test_from_short_slice_pads_with_zero() {
        let signal = DmxSignal::from_slice(3, &[1, 2, 3], 9, Priority::MAX).unwrap();
        assert_eq!(signal.channel_data().len(), DMX_UNIVERSE_SIZE);
        assert_eq!(&signal.channel_data()[..4], &[1, 2, 3, 0]);
        assert_eq!(signal.sequence(), 9);

        assert_eq!(
            DmxSignal::from_slice(3, &[0; DMX_UNIVERSE_SIZE + 1], 0, Priority::MAX),
            Err(SignalError::TooManyValues(DMX_UNIVERSE_SIZE + 1))
        );
    }

    #[test]
    fn test_shared_signal_is_copied_on_write() {
        let mut cached = Arc::new(DmxSignal::new(1, Priority::DEFAULT));
        let handed_out = Arc::clone(&cached);

        Arc::make_mut(&mut cached).write_channel(5, 200).unwrap();

        assert_eq!(handed_out.read_channel(5), Some(0));
        assert_eq!(cached.read_channel(5), Some(200));
    }
}
