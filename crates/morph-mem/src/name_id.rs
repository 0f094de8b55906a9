//! Dense identifiers handed out by the [`NameIndex`](crate::NameIndex).

use std::fmt;

/// Index of an interned name.
///
/// Ids are dense and assigned in first-seen order starting at zero, so they
/// double as indices into side tables (source files, member names, subtype
/// names). `u32::MAX` is reserved as the [`NameId::INVALID`] sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameId(u32);

impl NameId {
    /// Sentinel that never resolves to a name.
    pub const INVALID: NameId = NameId(u32::MAX);

    /// Wraps a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the raw index as `usize`, for slice indexing.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns true for the [`NameId::INVALID`] sentinel.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for NameId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "#invalid")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

impl From<u32> for NameId {
    fn from(index: u32) -> Self {
        Self(index)
    }
}
