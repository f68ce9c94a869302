// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt::Display;

/// Compact set of extern universe IDs.
///
/// Receivers check every inbound packet against the universes of their assigned ports. Storing 65_536 possible
/// universes as bit flags takes 8 KiB and turns that check into a single mask operation.
///
/// Universes outside of `0..=65535` can't be marked and are never contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseSet {
    inner: [u64; Self::CAPACITY],
}

impl UniverseSet {
    /// Number of 64 bit words: 65_536 / 64
    pub const CAPACITY: usize = 1_024;

    /// Highest universe that can be stored
    pub const MAX_UNIVERSE: i32 = (Self::CAPACITY * 64) as i32 - 1;

    /// Creates a new set with no marked universes
    pub const fn new() -> Self {
        Self { inner: [0; Self::CAPACITY] }
    }

    /// Unmarks all universes
    pub fn clear(&mut self) {
        self.inner.fill(0);
    }

    /// Marks a single universe. Returns false if the universe can't be stored.
    pub fn mark(&mut self, universe: i32) -> bool {
        match Self::universe_to_idx_and_mask(universe) {
            Some((idx, mask)) => {
                self.inner[idx] |= mask;
                true
            }
            None => false,
        }
    }

    /// Marks every universe of the range
    pub fn mark_range(&mut self, universes: core::ops::RangeInclusive<i32>) {
        for universe in universes {
            self.mark(universe);
        }
    }

    /// Unmarks a single universe
    pub fn unmark(&mut self, universe: i32) {
        if let Some((idx, mask)) = Self::universe_to_idx_and_mask(universe) {
            self.inner[idx] &= !mask;
        }
    }

    /// Check if a universe is marked. Return true if it is
    pub fn contains(&self, universe: i32) -> bool {
        Self::universe_to_idx_and_mask(universe).is_some_and(|(idx, mask)| self.inner[idx] & mask != 0)
    }

    /// Number of marked universes
    pub fn len(&self) -> usize {
        self.inner.iter().map(|entry| entry.count_ones() as usize).sum()
    }

    /// Returns true if no universe is marked
    pub fn is_empty(&self) -> bool {
        self.inner.iter().all(|entry| *entry == 0)
    }

    /// Calculates the word index and bit mask of a given universe
    fn universe_to_idx_and_mask(universe: i32) -> Option<(usize, u64)> {
        if !(0..=Self::MAX_UNIVERSE).contains(&universe) {
            return None;
        }

        let universe = universe as usize;
        Some((universe / 64, 0b_1 << (universe % 64)))
    }

    /// Creates an iterator over marked universes in ascending order
    pub fn iter(&self) -> UniverseSetIter<'_> {
        self.into_iter()
    }
}

impl Default for UniverseSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UniverseSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        write!(f, "{{")?;
        for universe in self {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{universe}")?;
            first = false;
        }
        write!(f, "}}")
    }
}

impl<'a> IntoIterator for &'a UniverseSet {
    type Item = i32;
    type IntoIter = UniverseSetIter<'a>;
    fn into_iter(self) -> Self::IntoIter {
        Self::IntoIter {
            words: &self.inner,
            word_idx: 0,
            value: self.inner[0],
        }
    }
}

/// Iterator over the marked universes of a [UniverseSet]
#[derive(Debug)]
pub struct UniverseSetIter<'a> {
    words: &'a [u64; UniverseSet::CAPACITY],
    word_idx: usize,
    value: u64,
}

impl Iterator for UniverseSetIter<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<Self::Item> {
        // find non-0 entry
        while self.value == 0 {
            if self.word_idx >= UniverseSet::CAPACITY - 1 {
                return None;
            }
            self.word_idx += 1;
            self.value = self.words[self.word_idx];
        }

        let bit = self.value.trailing_zeros() as usize;
        // erase 1-bit
        self.value ^= 1 << bit;

        Some((self.word_idx * 64 + bit) as i32)
    }
}

#[cfg(test)]
mod test_universe_set {
    use super::*;

    #[test]
    fn test_mark_and_unmark() {
        let mut set = UniverseSet::new();
        assert!(set.is_empty());

        assert!(set.mark(0));
        assert!(set.mark(63));
        assert!(set.mark(64));
        assert!(set.mark(UniverseSet::MAX_UNIVERSE));
        assert_eq!(set.len(), 4);
        assert!(set.contains(63));
        assert!(set.contains(64));
        assert!(!set.contains(65));

        set.unmark(63);
        assert!(!set.contains(63));
        assert_eq!(set.len(), 3);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_out_of_range_universes() {
        let mut set = UniverseSet::new();
        assert!(!set.mark(-1));
        assert!(!set.mark(UniverseSet::MAX_UNIVERSE + 1));
        assert!(!set.contains(-1));
        assert!(set.is_empty());

        // no-op
        set.unmark(i32::MAX);
    }

    #[test]
    fn test_iter_ascending() {
        let mut set = UniverseSet::new();
        set.mark_range(127..=129);
        set.mark(1);
        set.mark(63999);

        let mut iter = set.iter();
        assert_eq!(iter.next(), Some(1));
        assert_eq!(iter.next(), Some(127));
        assert_eq!(iter.next(), Some(128));
        assert_eq!(iter.next(), Some(129));
        assert_eq!(iter.next(), Some(63999));
        assert_eq!(iter.next(), None);
    }
}
