use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Exact ownership fraction in parts per million (1_000_000 = 100%).
///
/// Weights are summed across units, so an integer representation keeps
/// quorum arithmetic exact and the rendered percentages reproducible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fraction(u64);

impl Fraction {
    pub const PPM: u64 = 1_000_000;
    pub const ZERO: Fraction = Fraction(0);
    pub const ONE: Fraction = Fraction(Self::PPM);

    pub const fn from_ppm(ppm: u64) -> Self {
        Self(ppm)
    }

    pub const fn ppm(self) -> u64 {
        self.0
    }
}

impl Add for Fraction {
    type Output = Fraction;

    fn add(self, rhs: Fraction) -> Fraction {
        Fraction(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Fraction {
    fn sum<I: Iterator<Item = Fraction>>(iter: I) -> Fraction {
        iter.fold(Fraction::ZERO, Add::add)
    }
}

/// Renders as a percentage with four decimals, e.g. `12.5000%`.
impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04}%", self.0 / 10_000, self.0 % 10_000)
    }
}
