//! Persistence sink (C6, §4.6): on a fixed tick, snapshots every valid
//! index row and writes it to the time-series store. Best-effort — a
//! write failure is logged and swallowed, never fatal (§7).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::roster::Roster;
use crate::shm::SharedRegion;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS price_index (
    time               timestamptz NOT NULL,
    symbol             text        NOT NULL,
    price_index        double precision NOT NULL,
    num_exchanges      integer     NOT NULL,
    bid_vwap           double precision NOT NULL,
    ask_vwap           double precision NOT NULL,
    bid_qty_total      double precision NOT NULL,
    ask_qty_total      double precision NOT NULL
)
"#;

/// A snapshotted row, ready for the insert (§6 table contract).
#[derive(Debug, Clone)]
pub struct PriceIndexRow {
    pub symbol: String,
    pub val: f64,
    pub count: i32,
    pub bid_vwap: f64,
    pub ask_vwap: f64,
    pub bid_qty_total: f64,
    pub ask_qty_total: f64,
}

pub struct PersistenceSink {
    region: Arc<SharedRegion>,
    roster: Arc<Roster>,
    pool: PgPool,
    period: Duration,
}

impl PersistenceSink {
    pub async fn connect(
        conn_str: &str,
        region: Arc<SharedRegion>,
        roster: Arc<Roster>,
        period: Duration,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(conn_str)
            .await?;
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self {
            region,
            roster,
            pool,
            period,
        })
    }

    /// Collects the rows eligible for this tick, without touching the
    /// database. Separated out so the snapshot logic is testable without
    /// a live Postgres connection (§8 scenario 6).
    pub fn snapshot(&self) -> Vec<PriceIndexRow> {
        snapshot_rows(&self.region, &self.roster)
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        loop {
            ticker.tick().await;
            let rows = self.snapshot();
            for row in rows {
                if let Err(e) = self.write_row(&row).await {
                    warn!(symbol = %row.symbol, error = %e, "persistence_write_failed");
                }
            }
        }
    }

    async fn write_row(&self, row: &PriceIndexRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO price_index \
             (time, symbol, price_index, num_exchanges, bid_vwap, ask_vwap, bid_qty_total, ask_qty_total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Utc::now())
        .bind(&row.symbol)
        .bind(row.val)
        .bind(row.count)
        .bind(row.bid_vwap)
        .bind(row.ask_vwap)
        .bind(row.bid_qty_total)
        .bind(row.ask_qty_total)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(|e| {
            error!(symbol = %row.symbol, error = %e, "insert_failed");
            e
        })
    }
}

/// Every slot with a finite index value and a non-empty canonical
/// (row 0) symbol name (§4.6, §9 open question on an empty row 0).
fn snapshot_rows(region: &SharedRegion, roster: &Roster) -> Vec<PriceIndexRow> {
    let mut rows = Vec::new();
    for slot in 0..roster.num_slots {
        let Some(symbol) = roster.canonical(slot) else {
            continue;
        };
        let idx = region.read_index(slot);
        if !idx.val.is_finite() {
            continue;
        }
        rows.push(PriceIndexRow {
            symbol: symbol.to_string(),
            val: idx.val,
            count: idx.count,
            bid_vwap: idx.bid_vwap,
            ask_vwap: idx.ask_vwap,
            bid_qty_total: idx.bid_qty_total,
            ask_qty_total: idx.ask_qty_total,
        });
    }
    info!(rows = rows.len(), "persistence_tick_snapshot");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeId;
    use crate::lattice::TickerData;

    fn sample_roster() -> Roster {
        Roster::from_rows(vec![
            vec!["BTCUSDT".into(), "ETHUSDT".into()],
            vec!["BTCUSDT".into(), "ETHUSDT".into()],
            vec!["BTC-USD".into(), "ETH-USD".into()],
            vec!["BTC_USDT".into(), "ETH_USDT".into()],
            vec!["btcusdt".into(), "ethusdt".into()],
            vec!["BTC-USDT".into(), "ETH-USDT".into()],
            vec!["BTCUSDT".into(), "ETHUSDT".into()],
            vec!["BTC-USDT".into(), "ETH-USDT".into()],
        ])
        .unwrap()
    }

    #[test]
    fn only_finite_slots_with_canonical_names_are_snapshotted() {
        let dir = tempfile::tempdir().unwrap();
        let region = SharedRegion::create(dir.path().join("shm.data")).unwrap();
        let roster = sample_roster();

        // Slot 0 (BTCUSDT) gets a contributing quote; slot 1 (ETHUSDT) stays NaN.
        region.write_ticker(
            ExchangeId::Binance,
            0,
            TickerData {
                bid: 60000.0,
                ask: 60001.0,
                bid_qty: 1.0,
                ask_qty: 1.0,
            },
        );
        let weights = crate::index::WeightMatrix::new_default(roster.num_slots);
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        let region = Arc::new(region);
        let engine = crate::index::IndexEngine::new(region.clone(), Arc::new(weights), rx);
        engine.recompute(0);
        engine.recompute(1);

        let rows = snapshot_rows(&region, &roster);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "BTCUSDT");
    }

    #[test]
    fn missing_row_zero_symbol_skips_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let region = SharedRegion::create(dir.path().join("shm.data")).unwrap();
        let mut rows = vec![
            vec!["".into(), "ETHUSDT".into()],
            vec!["BTCUSDT".into(), "ETHUSDT".into()],
            vec!["BTC-USD".into(), "ETH-USD".into()],
            vec!["BTC_USDT".into(), "ETH_USDT".into()],
            vec!["btcusdt".into(), "ethusdt".into()],
            vec!["BTC-USDT".into(), "ETH-USDT".into()],
            vec!["BTCUSDT".into(), "ETHUSDT".into()],
            vec!["BTC-USDT".into(), "ETH-USDT".into()],
        ];
        let _ = &mut rows;
        let roster = Roster::from_rows(rows).unwrap();

        // Force slot 0's index finite even though row 0 has no name for it.
        region.write_ticker(
            ExchangeId::Bybit,
            0,
            TickerData {
                bid: 1.0,
                ask: 1.1,
                bid_qty: 1.0,
                ask_qty: 1.0,
            },
        );
        let weights = crate::index::WeightMatrix::new_default(roster.num_slots);
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        let region = Arc::new(region);
        let engine = crate::index::IndexEngine::new(region.clone(), Arc::new(weights), rx);
        engine.recompute(0);

        let snapshot = snapshot_rows(&region, &roster);
        assert!(snapshot.is_empty(), "slot with empty row-0 name must be skipped");
    }
}
