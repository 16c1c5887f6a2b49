//! Garment size variants.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a size label is not one the shop stocks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown size: {0}")]
pub struct SizeError(pub String);

/// Size variant of a cart line.
///
/// The cart page preselects [`Size::S`] when an item is added from the
/// suggestions strip, so that is the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Size {
    #[default]
    S,
    M,
    L,
    XL,
}

impl Size {
    /// All sizes in display order.
    pub const ALL: [Self; 4] = [Self::S, Self::M, Self::L, Self::XL];

    /// The size label as stored and shown.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::S => "S",
            Self::M => "M",
            Self::L => "L",
            Self::XL => "XL",
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Size {
    type Err = SizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S" => Ok(Self::S),
            "M" => Ok(Self::M),
            "L" => Ok(Self::L),
            "XL" => Ok(Self::XL),
            _ => Err(SizeError(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("xl".parse::<Size>(), Ok(Size::XL));
        assert_eq!(" m ".parse::<Size>(), Ok(Size::M));
        assert!("XXL".parse::<Size>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for size in Size::ALL {
            assert_eq!(size.to_string().parse::<Size>(), Ok(size));
        }
    }
}
