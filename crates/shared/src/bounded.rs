//! Range-checked numeric wrappers.
//!
//! Config limits are carried as `BoundedU32<MIN, MAX>` style values so the
//! engine never needs to re-check them.

use std::fmt;

/// Out-of-range error for bounded numeric wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("value {value} is outside [{min}, {max}]")]
pub struct BoundsError<T: fmt::Display + fmt::Debug> {
    /// Raw value provided.
    pub value: T,
    /// Inclusive minimum.
    pub min: T,
    /// Inclusive maximum.
    pub max: T,
}

macro_rules! bounded_int {
    ($(#[$meta:meta])* $name:ident, $int:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name<const MIN: $int, const MAX: $int>($int);

        impl<const MIN: $int, const MAX: $int> $name<MIN, MAX> {
            /// Create a bounded value when within the inclusive range.
            pub const fn new(value: $int) -> Option<Self> {
                if value < MIN || value > MAX {
                    None
                } else {
                    Some(Self(value))
                }
            }

            /// Create a bounded value or return a bounds error.
            pub const fn try_new(value: $int) -> Result<Self, BoundsError<$int>> {
                match Self::new(value) {
                    Some(bounded) => Ok(bounded),
                    None => Err(BoundsError {
                        value,
                        min: MIN,
                        max: MAX,
                    }),
                }
            }

            /// Return the wrapped value.
            pub const fn get(self) -> $int {
                self.0
            }
        }

        impl<const MIN: $int, const MAX: $int> fmt::Display for $name<MIN, MAX> {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

bounded_int!(
    /// Bounded `u32` with const generic limits.
    BoundedU32,
    u32
);
bounded_int!(
    /// Bounded `u64` with const generic limits.
    BoundedU64,
    u64
);
bounded_int!(
    /// Bounded `usize` with const generic limits.
    BoundedUsize,
    usize
);
