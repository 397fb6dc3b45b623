//! Direction labels, class indices, and temporal split tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of direction classes (down, flat, up).
pub const NUM_CLASSES: usize = 3;

/// Per-class probabilities or a one-hot label, indexed by
/// [`Direction::class_index`].
pub type ClassProbs = [f64; NUM_CLASSES];

/// Three-way price direction over the label horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Down,
    Flat,
    Up,
}

impl Direction {
    /// All directions in class-index order.
    pub const ALL: [Direction; NUM_CLASSES] = [Direction::Down, Direction::Flat, Direction::Up];

    /// Class index: down = 0, flat = 1, up = 2.
    pub const fn class_index(self) -> usize {
        match self {
            Direction::Down => 0,
            Direction::Flat => 1,
            Direction::Up => 2,
        }
    }

    /// Inverse of [`class_index`](Self::class_index). Out-of-range indices map to `Flat`.
    pub const fn from_class(index: usize) -> Self {
        match index {
            0 => Direction::Down,
            2 => Direction::Up,
            _ => Direction::Flat,
        }
    }

    /// Signed direction: -1, 0, +1.
    pub const fn sign(self) -> i8 {
        match self {
            Direction::Down => -1,
            Direction::Flat => 0,
            Direction::Up => 1,
        }
    }

    /// One-hot encoding over the class indices.
    pub fn one_hot(self) -> ClassProbs {
        let mut v = [0.0; NUM_CLASSES];
        v[self.class_index()] = 1.0;
        v
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Down => write!(f, "down"),
            Direction::Flat => write!(f, "flat"),
            Direction::Up => write!(f, "up"),
        }
    }
}

/// Temporal split a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitTag {
    Train,
    Validation,
    Test,
}

impl fmt::Display for SplitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitTag::Train => write!(f, "train"),
            SplitTag::Validation => write!(f, "validation"),
            SplitTag::Test => write!(f, "test"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_index_roundtrip() {
        for dir in Direction::ALL {
            assert_eq!(Direction::from_class(dir.class_index()), dir);
        }
    }

    #[test]
    fn test_sign_matches_class_offset() {
        for dir in Direction::ALL {
            assert_eq!(dir.sign() as i64, dir.class_index() as i64 - 1);
        }
    }

    #[test]
    fn test_one_hot() {
        assert_eq!(Direction::Up.one_hot(), [0.0, 0.0, 1.0]);
        assert_eq!(Direction::Down.one_hot(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_split_tag_order() {
        assert!(SplitTag::Train < SplitTag::Validation);
        assert!(SplitTag::Validation < SplitTag::Test);
    }
}
