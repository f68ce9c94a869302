// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Universe ranges of a port and the universe bounds of a protocol.
//!
//! A port addresses its universes twice: the application talks in *local* universes, the wire protocol in *extern* universes.
//! Both ranges have the same size and are shifted by a fixed offset, `extern = local + (extern_start - local_start)`.

use core::fmt::Display;

use crate::definitions::{ARTNET_MAX_UNIVERSE, ARTNET_MIN_UNIVERSE, E131_MAX_UNIVERSE, E131_MIN_UNIVERSE};

/// The inclusive range of universe IDs a protocol can address on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct UniverseBounds {
    min: i32,
    max: i32,
}

impl UniverseBounds {
    /// Universes usable for sACN data, ANSI E1.31-2018 Section 9.1.1.
    pub const SACN: Self = Self {
        min: E131_MIN_UNIVERSE,
        max: E131_MAX_UNIVERSE,
    };

    /// Art-Net port addresses.
    pub const ARTNET: Self = Self {
        min: ARTNET_MIN_UNIVERSE,
        max: ARTNET_MAX_UNIVERSE,
    };

    /// Creates new bounds, `min` and `max` are inclusive.
    pub const fn new(min: i32, max: i32) -> Result<Self, UniverseError> {
        if min > max {
            return Err(UniverseError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Lowest universe ID
    pub const fn min(&self) -> i32 {
        self.min
    }

    /// Highest universe ID
    pub const fn max(&self) -> i32 {
        self.max
    }

    /// Returns true if the universe lies within the bounds
    pub const fn contains(&self, universe: i32) -> bool {
        self.min <= universe && universe <= self.max
    }
}

impl Display for UniverseBounds {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Maps a contiguous range of local universes onto an equally sized range of extern universes.
///
/// The offset between the ranges is computed once on construction, conversions are a single addition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct UniverseMapping {
    local_universe_start: i32,
    num_universes: i32,
    extern_universe_start: i32,
    extern_universe_offset: i32,
}

impl Default for UniverseMapping {
    fn default() -> Self {
        Self {
            local_universe_start: 1,
            num_universes: 1,
            extern_universe_start: 1,
            extern_universe_offset: 0,
        }
    }
}

impl UniverseMapping {
    /// Creates a new mapping.
    ///
    /// # Errors
    /// InvalidNumUniverses: `num_universes` is less than 1.
    ///
    /// RangeOverflow: One of the ranges or the offset between them does not fit into an `i32`.
    pub const fn new(local_universe_start: i32, num_universes: i32, extern_universe_start: i32) -> Result<Self, UniverseError> {
        if num_universes < 1 {
            return Err(UniverseError::InvalidNumUniverses(num_universes));
        }

        if local_universe_start.checked_add(num_universes - 1).is_none() || extern_universe_start.checked_add(num_universes - 1).is_none() {
            return Err(UniverseError::RangeOverflow {
                start: local_universe_start,
                num_universes,
            });
        }

        let Some(extern_universe_offset) = extern_universe_start.checked_sub(local_universe_start) else {
            return Err(UniverseError::RangeOverflow {
                start: extern_universe_start,
                num_universes,
            });
        };

        Ok(Self {
            local_universe_start,
            num_universes,
            extern_universe_start,
            extern_universe_offset,
        })
    }

    /// First local universe
    pub const fn local_universe_start(&self) -> i32 {
        self.local_universe_start
    }

    /// Last local universe, inclusive
    pub const fn local_universe_end(&self) -> i32 {
        self.local_universe_start + self.num_universes - 1
    }

    /// Number of universes in either range
    pub const fn num_universes(&self) -> i32 {
        self.num_universes
    }

    /// First extern universe
    pub const fn extern_universe_start(&self) -> i32 {
        self.extern_universe_start
    }

    /// Last extern universe, inclusive
    pub const fn extern_universe_end(&self) -> i32 {
        self.extern_universe_start + self.num_universes - 1
    }

    /// The value added to a local universe to get the extern universe
    pub const fn extern_universe_offset(&self) -> i32 {
        self.extern_universe_offset
    }

    /// Returns true if `local_universe_start <= universe <= local_universe_start + num_universes - 1`
    pub const fn is_local_universe_in_range(&self, universe: i32) -> bool {
        self.local_universe_start <= universe && universe <= self.local_universe_end()
    }

    /// Returns true if `extern_universe_start <= universe <= extern_universe_start + num_universes - 1`
    pub const fn is_extern_universe_in_range(&self, universe: i32) -> bool {
        self.extern_universe_start <= universe && universe <= self.extern_universe_end()
    }

    /// Converts a local universe to the extern universe. The universe is not range checked.
    pub const fn local_to_extern(&self, local_universe: i32) -> i32 {
        local_universe.wrapping_add(self.extern_universe_offset)
    }

    /// Converts an extern universe to the local universe. The universe is not range checked.
    pub const fn extern_to_local(&self, extern_universe: i32) -> i32 {
        extern_universe.wrapping_sub(self.extern_universe_offset)
    }

    /// Returns true if the complete extern range lies within the bounds of a protocol
    pub const fn fits_within(&self, bounds: &UniverseBounds) -> bool {
        bounds.contains(self.extern_universe_start) && bounds.contains(self.extern_universe_end())
    }

    /// Iterates the extern universes of the mapping in ascending order
    pub fn extern_universes(&self) -> core::ops::RangeInclusive<i32> {
        self.extern_universe_start..=self.extern_universe_end()
    }
}

impl Display for UniverseMapping {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "local [{}, {}] -> extern [{}, {}]",
            self.local_universe_start,
            self.local_universe_end(),
            self.extern_universe_start,
            self.extern_universe_end()
        )
    }
}

/// Errors for creation of [UniverseMapping] and [UniverseBounds]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    /// A mapping needs at least one universe.
    ///
    /// # Arguments
    /// 0: The number of universes that was given
    #[error("Number of universes must be at least 1, got {0}")]
    InvalidNumUniverses(i32),

    /// The last universe of a range does not fit into an i32.
    #[error("Universe range starting at {start} with {num_universes} universes overflows")]
    RangeOverflow {
        /// First universe of the range
        start: i32,
        /// Number of universes in the range
        num_universes: i32,
    },

    /// The lower bound is larger than the upper bound.
    #[error("Invalid universe bounds [{min}, {max}]")]
    InvalidBounds {
        /// Lower bound
        min: i32,
        /// Upper bound
        max: i32,
    },
}

#[cfg(test)]
mod test_universe_mapping {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_four_universes_shifted_to_100() {
        let mapping = UniverseMapping::new(1, 4, 100).unwrap();

        assert_eq!(mapping.extern_universe_offset(), 99);
        assert_eq!(mapping.local_to_extern(2), 101);
        assert_eq!(mapping.extern_to_local(103), 4);

        assert!(mapping.is_local_universe_in_range(1));
        assert!(mapping.is_local_universe_in_range(4));
        assert!(!mapping.is_local_universe_in_range(5));
        assert!(!mapping.is_local_universe_in_range(0));

        assert!(mapping.is_extern_universe_in_range(100));
        assert!(mapping.is_extern_universe_in_range(103));
        assert!(!mapping.is_extern_universe_in_range(104));
        assert!(!mapping.is_extern_universe_in_range(99));
    }

    #[test]
    fn test_invalid_num_universes() {
        assert_eq!(UniverseMapping::new(1, 0, 1), Err(UniverseError::InvalidNumUniverses(0)));
        assert_eq!(UniverseMapping::new(1, -3, 1), Err(UniverseError::InvalidNumUniverses(-3)));
    }

    #[test]
    fn test_overflowing_range() {
        assert!(matches!(UniverseMapping::new(i32::MAX, 2, 1), Err(UniverseError::RangeOverflow { .. })));
        assert!(matches!(UniverseMapping::new(1, 2, i32::MAX), Err(UniverseError::RangeOverflow { .. })));
        assert!(matches!(UniverseMapping::new(i32::MIN, 1, i32::MAX), Err(UniverseError::RangeOverflow { .. })));
    }

    #[test]
    fn test_fits_within_protocol_bounds() {
        assert!(UniverseMapping::new(1, 10, 1).unwrap().fits_within(&UniverseBounds::SACN));
        assert!(!UniverseMapping::new(1, 10, 0).unwrap().fits_within(&UniverseBounds::SACN));
        assert!(UniverseMapping::new(1, 10, 0).unwrap().fits_within(&UniverseBounds::ARTNET));
        assert!(!UniverseMapping::new(1, 2, 63999).unwrap().fits_within(&UniverseBounds::SACN));
        assert!(UniverseMapping::new(1, 1, 63999).unwrap().fits_within(&UniverseBounds::SACN));
        assert!(!UniverseMapping::new(1, 1, 32768).unwrap().fits_within(&UniverseBounds::ARTNET));
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(UniverseBounds::new(5, 4).is_err());
        assert_eq!(UniverseBounds::new(4, 4).unwrap().min(), 4);
    }

    #[test]
    fn test_extern_universes_iter() {
        let mapping = UniverseMapping::new(10, 3, 20).unwrap();
        let mut iter = mapping.extern_universes();
        assert_eq!(iter.next(), Some(20));
        assert_eq!(iter.next(), Some(21));
        assert_eq!(iter.next(), Some(22));
        assert_eq!(iter.next(), None);
    }

    proptest! {
        #[test]
        fn test_extern_local_round_trip(
            local_start in -100_000i32..100_000,
            num_universes in 1i32..2_000,
            extern_start in -100_000i32..100_000,
            pick in 0i32..2_000,
        ) {
            let mapping = UniverseMapping::new(local_start, num_universes, extern_start).unwrap();
            let universe = extern_start + pick % num_universes;

            prop_assert!(mapping.is_extern_universe_in_range(universe));
            prop_assert_eq!(mapping.local_to_extern(mapping.extern_to_local(universe)), universe);
            prop_assert!(mapping.is_local_universe_in_range(mapping.extern_to_local(universe)));
        }

        #[test]
        fn test_local_range_check(
            local_start in -100_000i32..100_000,
            num_universes in 1i32..2_000,
            universe in -110_000i32..110_000,
        ) {
            let mapping = UniverseMapping::new(local_start, num_universes, 0).unwrap();
            let expected = universe >= local_start && universe < local_start + num_universes;

            prop_assert_eq!(mapping.is_local_universe_in_range(universe), expected);
        }
    }
}
