// Copyright 2020 sacn Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The user assigned name of an sACN source, ANSI E1.31-2018 Section 6.2.2.

use core::{
    fmt::{self, Display},
    str::FromStr,
};

use heapless::{String, Vec};

use crate::definitions::E131_SOURCE_NAME_FIELD_LENGTH;

/// The name of a source, at most [SourceName::CAPACITY] bytes of utf-8
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceName {
    inner: String<{ Self::CAPACITY }>,
}

impl Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl SourceName {
    /// Room for the name inside the source name field. The last byte of the field is reserved for the null terminator.
    pub const CAPACITY: usize = E131_SOURCE_NAME_FIELD_LENGTH - 1;

    /// Creates a new [SourceName]
    pub fn new<S: AsRef<str>>(s: S) -> Result<Self, SourceNameError> {
        let value = s.as_ref();

        let inner = String::from_str(value).map_err(|_| SourceNameError::SourceNameTooLong(value.len()))?;
        Ok(Self { inner })
    }

    /// Creates a new [SourceName], cutting the name at the last character boundary that fits
    pub fn truncated<S: AsRef<str>>(s: S) -> Self {
        let value = s.as_ref();
        let mut end = value.len().min(Self::CAPACITY);
        while !value.is_char_boundary(end) {
            end -= 1;
        }

        let mut inner = String::new();
        // cannot fail, end <= CAPACITY
        let _ = inner.push_str(&value[..end]);
        Self { inner }
    }

    /// Returns a [str] reference
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    /// Returns the length of the source name in bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true for an empty name
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the bytes this source name is made out of
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }
}

impl FromStr for SourceName {
    type Err = SourceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&[u8]> for SourceName {
    type Error = SourceNameError;

    /// Takes the given byte buffer (e.g. a c char array) and parses it into a [SourceName].
    ///
    /// # Errors
    /// MissingNullTermination: Returned if the source name is not null terminated as required by ANSI E1.31-2018 Section 6.2.2
    ///
    /// SourceNameTooLong: Returned if the source name is too long
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let first_null_pos = value.iter().position(|&b| b == 0).ok_or(SourceNameError::MissingNullTermination)?;

        let as_vec = Vec::from_slice(&value[..first_null_pos]).map_err(|_| SourceNameError::SourceNameTooLong(first_null_pos))?;
        let inner = String::from_utf8(as_vec)?;

        Ok(Self { inner })
    }
}

/// For any source name specific errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceNameError {
    /// A source name that's too long was encountered.
    /// Maximum length should be [`SourceName::CAPACITY`]
    ///
    /// # Arguments
    /// Length of too long source name
    #[error("Given source name is too long. Maximum is {} but current name is: {}", SourceName::CAPACITY, .0)]
    SourceNameTooLong(usize),

    /// A source name is invalid utf8
    #[error("Given source name is invalid utf-8 error: {0:?}")]
    Utf8(#[from] core::str::Utf8Error),

    /// Given source name is not null terminated
    #[error("Given source name is not null terminated")]
    MissingNullTermination,
}

#[cfg(test)]
mod test_source_name {
    use super::*;

    #[test]
    fn test_parse_null_terminated() {
        let mut field = [0u8; E131_SOURCE_NAME_FIELD_LENGTH];
        field[..7].copy_from_slice(b"console");
        assert_eq!(SourceName::try_from(&field[..]).unwrap().as_str(), "console");
    }

    #[test]
    fn test_missing_null_termination() {
        let field = [b'a'; E131_SOURCE_NAME_FIELD_LENGTH];
        assert_eq!(SourceName::try_from(&field[..]), Err(SourceNameError::MissingNullTermination));
    }

    #[test]
    fn test_truncated_respects_char_boundaries() {
        let long = "\u{00e9}".repeat(40);
        let name = SourceName::truncated(&long);
        assert_eq!(name.len(), 62);
        assert!(SourceName::new(&long).is_err());
    }
}
