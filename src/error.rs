use std::error::Error;
use std::fmt;

/// Errors reported when setting up point insertion.
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorError {
    /// The world bounds handed to `init_insertion` are inverted or not
    /// finite on some axis, so no root box can be derived from them.
    InvalidBounds {
        min: [f64; 3],
        max: [f64; 3],
    },
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorError::InvalidBounds { min, max } => {
                write!(f, "invalid insertion bounds: min {min:?}, max {max:?}")
            }
        }
    }
}

impl Error for LocatorError {}
