//! Symbol roster (§6): the per-exchange list of native spellings,
//! column-aligned across exchanges. Row 0 (Binance) is canonically the
//! normalized symbol name used for persistence (§9 open question).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::exchange::{ExchangeId, NUM_EXCHANGES};
use crate::lattice::MAX_SYMBOLS;

#[derive(Debug, Deserialize)]
struct RosterFile {
    symbols: Vec<Vec<String>>,
}

/// The loaded roster: `native[exchange_ordinal][slot]` and the canonical
/// (row 0) symbol name per slot.
#[derive(Debug, Clone)]
pub struct Roster {
    native: Vec<Vec<String>>,
    pub num_slots: usize,
}

impl Roster {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read roster file {}", path.display()))?;
        let parsed: RosterFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse roster file {}", path.display()))?;
        Self::from_rows(parsed.symbols)
    }

    pub fn from_rows(rows: Vec<Vec<String>>) -> Result<Self> {
        anyhow::ensure!(
            rows.len() == NUM_EXCHANGES,
            "roster must have exactly {NUM_EXCHANGES} rows, got {}",
            rows.len()
        );

        let num_slots = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        anyhow::ensure!(
            num_slots <= MAX_SYMBOLS,
            "roster has {num_slots} symbol columns, exceeds MAX_SYMBOLS={MAX_SYMBOLS}"
        );

        for (i, row) in rows.iter().enumerate() {
            if row.len() < num_slots {
                tracing::warn!(
                    exchange = ExchangeId::from_ordinal(i).map(|e| e.name()).unwrap_or("?"),
                    row_len = row.len(),
                    expected = num_slots,
                    "roster row shorter than widest row; treating missing columns as absent"
                );
            }
        }

        Ok(Self {
            native: rows,
            num_slots,
        })
    }

    /// Native spelling for `(exchange, slot)`, or `None` if absent
    /// (empty string or the row doesn't reach that column).
    pub fn native(&self, exchange: ExchangeId, slot: usize) -> Option<&str> {
        let row = self.native.get(exchange.ordinal())?;
        let entry = row.get(slot)?;
        if entry.is_empty() {
            None
        } else {
            Some(entry.as_str())
        }
    }

    /// All `(slot, native_spelling)` pairs this exchange lists.
    pub fn symbols_for(&self, exchange: ExchangeId) -> Vec<(usize, String)> {
        (0..self.num_slots)
            .filter_map(|slot| self.native(exchange, slot).map(|n| (slot, n.to_string())))
            .collect()
    }

    /// Whether this exchange has any listed symbols at all (§4.7 step 3:
    /// no session is started for an exchange with an empty roster row).
    pub fn has_any(&self, exchange: ExchangeId) -> bool {
        (0..self.num_slots).any(|slot| self.native(exchange, slot).is_some())
    }

    /// Row 0's spelling, authoritative for persistence symbol names (§9).
    pub fn canonical(&self, slot: usize) -> Option<&str> {
        self.native(ExchangeId::Binance, slot)
    }

    /// `native spelling -> slot` map for one exchange, used to resolve
    /// inbound ticker messages back to a lattice column (§4.3).
    pub fn slot_map(&self, exchange: ExchangeId) -> HashMap<String, usize> {
        self.symbols_for(exchange)
            .into_iter()
            .map(|(slot, native)| (native, slot))
            .collect()
    }
}
