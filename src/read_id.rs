//! Read identifier codec.
//!
//! Reference sequences share one 64-bit identifier space with ordinary
//! biological reads. Bit 63 tags an identifier as referring to a reference;
//! the remaining 63 bits are the logical index into the built
//! [`crate::ReferenceIndex`]. The tag leaves ordinary reads 63 bits of room,
//! an inherited constraint of the identifier space rather than a limit this
//! crate enforces.

use crate::{ReadError, Result};

const REFERENCE_BIT: u64 = 1 << 63;

/// A codec-tagged 64-bit read identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReadId(u64);

impl ReadId {
    /// Tags a logical reference index as a reference read id.
    ///
    /// Fails with an invalid-identifier error when the value already carries
    /// the tag; encoding twice would silently alias a different reference.
    pub fn for_reference(logical: u64) -> Result<Self> {
        if logical & REFERENCE_BIT != 0 {
            return Err(ReadError::FlagAlreadySet(logical).into());
        }
        Ok(Self(logical | REFERENCE_BIT))
    }

    /// Wraps a raw identifier as received from a caller.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value, tag included.
    #[must_use]
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Splits the identifier into its logical value and reference tag.
    #[must_use]
    pub fn decode(self) -> (u64, bool) {
        (self.0 & !REFERENCE_BIT, self.0 & REFERENCE_BIT != 0)
    }

    /// Whether the reference tag is set.
    #[must_use]
    pub fn is_reference(self) -> bool {
        self.0 & REFERENCE_BIT != 0
    }

    /// The logical reference index, failing when the tag is absent.
    pub fn reference_index(self) -> Result<u64> {
        let (logical, tagged) = self.decode();
        if !tagged {
            return Err(ReadError::NotAReference(self.0).into());
        }
        Ok(logical)
    }
}
