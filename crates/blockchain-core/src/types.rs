// blockchain-core/src/types.rs

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Block height. Signed so that window arithmetic below the first
/// interval stays well defined.
pub type BlockHeight = i64;

/// Timestamp in Unix epoch seconds
pub type Timestamp = i64;

/// Atoms per coin
pub const ATOMS_PER_COIN: u64 = 100_000_000;

/// Coin amount in atoms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_atoms(atoms: u64) -> Self {
        Self(atoms)
    }

    pub fn from_coins(coins: u64) -> Self {
        Self(coins.saturating_mul(ATOMS_PER_COIN))
    }

    pub fn atoms(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_sub(&self, other: &Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, other: Amount) -> Amount {
        Amount(self.0 + other.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, other: Amount) -> Amount {
        Amount(self.0 - other.0)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:08}", self.0 / ATOMS_PER_COIN, self.0 % ATOMS_PER_COIN)
    }
}
