//! Exchange identifier and the static per-venue defaults the rest of the
//! engine keys off (ordinal, default composite weight).

use serde::{Deserialize, Serialize};

/// Number of venues the engine streams. Stable, compile-time constant:
/// the ordinal below is the row index into the lattice.
pub const NUM_EXCHANGES: usize = 8;

/// Closed enumeration of the 8 venues, in stable ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExchangeId {
    Binance = 0,
    Bybit = 1,
    Coinbase = 2,
    Gateio = 3,
    Htx = 4,
    Kucoin = 5,
    Mexc = 6,
    Okx = 7,
}

impl ExchangeId {
    pub const ALL: [ExchangeId; NUM_EXCHANGES] = [
        ExchangeId::Binance,
        ExchangeId::Bybit,
        ExchangeId::Coinbase,
        ExchangeId::Gateio,
        ExchangeId::Htx,
        ExchangeId::Kucoin,
        ExchangeId::Mexc,
        ExchangeId::Okx,
    ];

    /// Row index into the lattice / weight matrix.
    #[inline]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    pub const fn from_ordinal(ord: usize) -> Option<Self> {
        match ord {
            0 => Some(Self::Binance),
            1 => Some(Self::Bybit),
            2 => Some(Self::Coinbase),
            3 => Some(Self::Gateio),
            4 => Some(Self::Htx),
            5 => Some(Self::Kucoin),
            6 => Some(Self::Mexc),
            7 => Some(Self::Okx),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Bybit => "bybit",
            Self::Coinbase => "coinbase",
            Self::Gateio => "gateio",
            Self::Htx => "htx",
            Self::Kucoin => "kucoin",
            Self::Mexc => "mexc",
            Self::Okx => "okx",
        }
    }

    /// Default composite weight profile (§3). Sums to ~1.0; the index
    /// only uses relative magnitude so exact normalization is not required.
    pub const fn default_weight(self) -> f64 {
        match self {
            Self::Binance => 0.40,
            Self::Bybit => 0.075,
            Self::Coinbase => 0.072,
            Self::Gateio => 0.074,
            Self::Htx => 0.068,
            Self::Kucoin => 0.070,
            Self::Mexc => 0.10,
            Self::Okx => 0.05,
        }
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_are_stable_and_roundtrip() {
        for (i, ex) in ExchangeId::ALL.iter().enumerate() {
            assert_eq!(ex.ordinal(), i);
            assert_eq!(ExchangeId::from_ordinal(i), Some(*ex));
        }
        assert_eq!(ExchangeId::from_ordinal(NUM_EXCHANGES), None);
    }

    #[test]
    fn default_weights_sum_close_to_one() {
        let sum: f64 = ExchangeId::ALL.iter().map(|e| e.default_weight()).sum();
        assert!((sum - 1.0).abs() < 0.01, "sum={sum}");
    }
}
