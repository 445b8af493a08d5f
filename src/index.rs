//! Index engine (C5, §4.5): single consumer of the update channel,
//! recomputes the composite index for a symbol column from scratch on
//! every signal, and adapts the per-exchange weight matrix by EMA.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::exchange::{ExchangeId, NUM_EXCHANGES};
use crate::lattice::{PriceIndex, MAX_SYMBOLS};
use crate::shm::SharedRegion;

/// EMA smoothing constants for weight adaptation (§4.5, fixed).
const WEIGHT_DECAY: f64 = 0.99;
const WEIGHT_GAIN: f64 = 0.01;

/// `weight[slot][exchange_ordinal]`. Thread-local to the index engine —
/// no other component reads or writes it (§9).
pub struct WeightMatrix {
    rows: RwLock<Vec<[f64; NUM_EXCHANGES]>>,
}

impl WeightMatrix {
    /// Every symbol column starts from the same default profile (§9 open
    /// question: the spec preserves this verbatim, whether intentional
    /// or an artifact of the original's initialization).
    pub fn new_default(num_slots: usize) -> Self {
        let mut defaults = [0.0; NUM_EXCHANGES];
        for ex in ExchangeId::ALL {
            defaults[ex.ordinal()] = ex.default_weight();
        }
        Self {
            rows: RwLock::new(vec![defaults; num_slots]),
        }
    }

    pub fn row(&self, slot: usize) -> [f64; NUM_EXCHANGES] {
        self.rows.read()[slot]
    }

    fn set_row(&self, slot: usize, row: [f64; NUM_EXCHANGES]) {
        self.rows.write()[slot] = row;
    }
}

/// Single consumer of the update channel; recomputes `indices[slot]`
/// from the lattice column on every signal (§4.5).
pub struct IndexEngine {
    region: Arc<SharedRegion>,
    weights: Arc<WeightMatrix>,
    rx: mpsc::Receiver<usize>,
}

impl IndexEngine {
    pub fn new(
        region: Arc<SharedRegion>,
        weights: Arc<WeightMatrix>,
        rx: mpsc::Receiver<usize>,
    ) -> Self {
        Self {
            region,
            weights,
            rx,
        }
    }

    /// Runs until the update channel is closed (all sessions dropped
    /// their senders, i.e. clean shutdown).
    pub async fn run(mut self) {
        while let Some(slot) = self.rx.recv().await {
            self.recompute(slot);
        }
        debug!("index_engine_exiting: update channel closed");
    }

    /// Two-pass recompute for one symbol column (§4.5). Public so tests
    /// and the end-to-end scenarios in §8 can drive it synchronously.
    pub fn recompute(&self, slot: usize) {
        let mut weight_row = self.weights.row(slot);

        let mut weighted_mid = 0.0;
        let mut total_weight = 0.0;
        let mut bid_qty_total = 0.0;
        let mut ask_qty_total = 0.0;
        let mut bid_not_total = 0.0;
        let mut ask_not_total = 0.0;
        let mut qty_per_exch = [0.0_f64; NUM_EXCHANGES];
        let mut count: i32 = 0;

        // Pass 1 — accumulate.
        for ex in ExchangeId::ALL {
            let t = self.region.read_ticker(ex, slot);
            if !t.is_contributing() {
                continue;
            }
            let w = weight_row[ex.ordinal()];
            let mid = t.mid();

            weighted_mid += mid * w;
            total_weight += w;
            bid_qty_total += t.bid_qty;
            ask_qty_total += t.ask_qty;
            bid_not_total += t.bid_qty * t.bid;
            ask_not_total += t.ask_qty * t.ask;
            qty_per_exch[ex.ordinal()] = t.bid_qty + t.ask_qty;
            count += 1;
        }

        // Pass 2 — EMA weight adaptation.
        let total_qty = bid_qty_total + ask_qty_total;
        if total_qty > 0.0 {
            for ex in ExchangeId::ALL {
                let qty = qty_per_exch[ex.ordinal()];
                if qty > 0.0 {
                    let share = qty / total_qty;
                    let w = &mut weight_row[ex.ordinal()];
                    *w = WEIGHT_DECAY * *w + WEIGHT_GAIN * share;
                }
            }
            self.weights.set_row(slot, weight_row);
        }

        // Commit.
        let previous = self.region.read_index(slot);
        let new_index = if total_weight > 0.0 {
            debug_assert!(
                bid_qty_total > 0.0,
                "total_weight>0 implies at least one contributing row, hence bid_qty_total>0"
            );
            PriceIndex {
                val: weighted_mid / total_weight,
                count,
                bid_vwap: bid_not_total / bid_qty_total,
                ask_vwap: ask_not_total / ask_qty_total,
                bid_qty_total,
                ask_qty_total,
            }
        } else {
            // NaN branch: leave `count` unchanged from its previous value (§9).
            PriceIndex {
                val: f64::NAN,
                count: previous.count,
                ..previous
            }
        };

        self.region.write_index(slot, new_index);
    }
}
