// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! This module contains `Priority` according to ANSI E1.31-2018, Section 6.2.3 and the strategies input ports use to filter
//! inbound signals by priority.

use core::fmt::Display;

use serde::{Deserialize, Serialize};

/// Priority value
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Priority {
    type Error = PriorityError;

    fn try_from(raw_priority: u8) -> Result<Self, Self::Error> {
        Self::new(raw_priority)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Priority {
    /// Minimum priority
    pub const MIN_RAW: u8 = 0;
    /// See [Self::MIN_RAW]
    pub const MIN: Self = Self(Self::MIN_RAW);

    /// The default priority used for the E1.31 packet priority field, as per ANSI E1.31-2018 Section 4.1 Table 4-1
    pub const DEFAULT_RAW: u8 = 100;
    /// See [Self::DEFAULT_RAW]
    pub const DEFAULT: Self = Self(Self::DEFAULT_RAW);

    /// The maximum allowed priority for a E1.31 packet, as per ANSI E1.31-2018 Section 6.2.3
    pub const MAX_RAW: u8 = 200;
    /// See [Self::MAX_RAW]
    pub const MAX: Self = Self(Self::MAX_RAW);

    /// Checks if the given priority is in a valid range
    ///
    /// # Errors
    /// InvalidValue: Returned if the priority is outside the allowed range.
    pub const fn in_range(raw_priority: u8) -> Result<(), PriorityError> {
        if raw_priority <= Self::MAX_RAW {
            return Ok(());
        }

        Err(PriorityError::InvalidValue(raw_priority))
    }

    /// Creates a new `Priority`
    pub const fn new(raw_priority: u8) -> Result<Self, PriorityError> {
        match Self::in_range(raw_priority) {
            Ok(()) => Ok(Self(raw_priority)),
            Err(e) => Err(e),
        }
    }

    /// Creates a new `Priority`, values above [Self::MAX] are clamped to it
    pub const fn clamped(raw_priority: u8) -> Self {
        if raw_priority > Self::MAX_RAW { Self::MAX } else { Self(raw_priority) }
    }

    /// Get the underlying value
    pub const fn get(&self) -> u8 {
        self.0
    }
}

/// Error for creation of [Priority]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriorityError {
    /// Attempted to use invalid value for Priority. Allowed values are:
    /// - Range from 0 to [`Priority::MAX`] inclusive
    ///
    /// # Arguments
    /// 0: Value of invalid Priority
    #[error("Invalid priority used. Must be in the range [0 - {}], Priority: {}", Priority::MAX_RAW, .0)]
    InvalidValue(u8),
}

/// How an input port filters inbound signals by their priority.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityStrategy {
    /// Every signal is accepted
    #[default]
    None,
    /// Only signals with the lowest priority seen so far are accepted
    Lowest,
    /// Only signals with the highest priority seen so far are accepted
    Highest,
    /// Only signals with exactly the port's priority are accepted
    Equal,
    /// Only signals with a priority above the port's priority are accepted
    HigherThan,
    /// Only signals with a priority below the port's priority are accepted
    LowerThan,
}

impl PriorityStrategy {
    /// Returns true if a signal with `received` priority passes the filter.
    ///
    /// `lowest_seen` and `highest_seen` are the extreme priorities observed so far, including `received`.
    pub const fn accepts(&self, port_priority: Priority, received: Priority, lowest_seen: Priority, highest_seen: Priority) -> bool {
        match self {
            Self::None => true,
            Self::Lowest => received.0 <= lowest_seen.0,
            Self::Highest => received.0 >= highest_seen.0,
            Self::Equal => received.0 == port_priority.0,
            Self::HigherThan => received.0 > port_priority.0,
            Self::LowerThan => received.0 < port_priority.0,
        }
    }
}

#[cfg(test)]
mod test_priority {
    use super::*;

    #[test]
    fn test_priority_range() {
        assert_eq!(Priority::new(200).unwrap(), Priority::MAX);
        assert_eq!(Priority::new(201), Err(PriorityError::InvalidValue(201)));
        assert_eq!(Priority::clamped(255), Priority::MAX);
        assert_eq!(Priority::clamped(42).get(), 42);
        assert_eq!(Priority::default(), Priority::DEFAULT);
    }

    #[test]
    fn test_strategy_against_port_priority() {
        let port = Priority::DEFAULT;
        let lower = Priority::new(50).unwrap();
        let higher = Priority::new(150).unwrap();

        assert!(PriorityStrategy::None.accepts(port, lower, lower, higher));
        assert!(PriorityStrategy::Equal.accepts(port, port, lower, higher));
        assert!(!PriorityStrategy::Equal.accepts(port, higher, lower, higher));
        assert!(PriorityStrategy::HigherThan.accepts(port, higher, lower, higher));
        assert!(!PriorityStrategy::HigherThan.accepts(port, port, lower, higher));
        assert!(PriorityStrategy::LowerThan.accepts(port, lower, lower, higher));
        assert!(!PriorityStrategy::LowerThan.accepts(port, higher, lower, higher));
    }

    #[test]
    fn test_strategy_against_seen_priorities() {
        let port = Priority::DEFAULT;
        let lower = Priority::new(50).unwrap();
        let higher = Priority::new(150).unwrap();

        assert!(PriorityStrategy::Highest.accepts(port, higher, lower, higher));
        assert!(!PriorityStrategy::Highest.accepts(port, port, lower, higher));
        assert!(PriorityStrategy::Lowest.accepts(port, lower, lower, higher));
        assert!(!PriorityStrategy::Lowest.accepts(port, port, lower, higher));
    }
}
