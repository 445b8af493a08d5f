//! Supervisor (C7, §4.7): wires every component together at startup and
//! drives graceful shutdown.
//!
//! Startup sequence: parse config -> open/init SHM -> load roster ->
//! spawn one session per non-empty roster row (Bybit sharded into
//! 10-symbol connections) -> spawn the index engine -> spawn the
//! persistence sink if enabled -> install `ctrl_c` -> await shutdown ->
//! drain session tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{shm_path, Cli, DbConfig};
use crate::index::{IndexEngine, WeightMatrix};
use crate::persistence::PersistenceSink;
use crate::roster::Roster;
use crate::session::{self, binance, bybit, coinbase, gateio, htx, kucoin, mexc, okx};
use crate::session::common::SessionConfig;
use crate::exchange::ExchangeId;
use crate::shm::SharedRegion;

/// Bounded depth for the slot-index update channel (§4.4: "sender
/// blocks on full" — backpressure, not drop).
const UPDATE_CHANNEL_DEPTH: usize = 4096;

pub async fn run(cli: Cli) -> Result<()> {
    let region = Arc::new(
        SharedRegion::create(shm_path()).context("failed to open shared-memory region")?,
    );
    let roster = Arc::new(Roster::load(&cli.exchange_info).with_context(|| {
        format!("failed to load roster from {}", cli.exchange_info)
    })?);
    info!(slots = roster.num_slots, "roster_loaded");

    let weights = Arc::new(WeightMatrix::new_default(roster.num_slots));
    let (update_tx, update_rx) = mpsc::channel::<usize>(UPDATE_CHANNEL_DEPTH);
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    handles.extend(spawn_sessions(&roster, &region, &update_tx, &shutdown));

    let index_engine = IndexEngine::new(region.clone(), weights, update_rx);
    handles.push(tokio::spawn(index_engine.run()));

    if cli.save_db {
        match DbConfig::from_env() {
            Ok(db) => {
                let sink = PersistenceSink::connect(
                    &db.conn_str,
                    region.clone(),
                    roster.clone(),
                    Duration::from_millis(cli.save_period_ms),
                )
                .await
                .context("failed to connect persistence sink")?;
                handles.push(tokio::spawn(sink.run()));
                info!("persistence_sink_started");
            }
            Err(e) => {
                return Err(e.context(
                    "database configuration required because --save-db is set (pass --save-db=false to run without persistence)",
                ));
            }
        }
    } else {
        info!("persistence_sink_disabled (--save-db=false)");
    }

    drop(update_tx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to install ctrl_c handler")?;
    info!("shutdown_signal_received");
    shutdown.store(true, Ordering::Relaxed);

    drain(handles).await;
    info!("supervisor_exited");
    Ok(())
}

/// Awaits every session/engine task with a bounded grace period so a
/// wedged socket read can't hang process shutdown forever (§9).
async fn drain(handles: Vec<JoinHandle<()>>) {
    const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
    let all = futures_util::future::join_all(handles);
    if tokio::time::timeout(DRAIN_TIMEOUT, all).await.is_err() {
        warn!("drain_timeout_exceeded; exiting without waiting for every task");
    }
}

fn spawn_sessions(
    roster: &Arc<Roster>,
    region: &Arc<SharedRegion>,
    update_tx: &mpsc::Sender<usize>,
    shutdown: &Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for exchange in ExchangeId::ALL {
        if !roster.has_any(exchange) {
            info!(exchange = exchange.name(), "no_symbols_listed; session not started");
            continue;
        }

        if exchange == ExchangeId::Bybit {
            handles.extend(spawn_bybit_shards(roster, region, update_tx, shutdown));
            continue;
        }

        let symbols = roster.symbols_for(exchange);
        let slot_map: Arc<HashMap<String, usize>> = Arc::new(
            symbols.iter().map(|(slot, native)| (native.clone(), *slot)).collect(),
        );
        let natives: Vec<String> = symbols.into_iter().map(|(_, n)| n).collect();
        let connector = connector_for(exchange);
        let config = SessionConfig::from_env(&exchange.name().to_uppercase());

        handles.push(tokio::spawn(session::run_session(
            connector,
            natives,
            slot_map,
            region.clone(),
            update_tx.clone(),
            shutdown.clone(),
            config,
        )));
    }

    handles
}

/// Bybit caps a connection at 10 symbols; shard the roster row into
/// groups of 10, each run as its own session with a slot map restricted
/// to that shard (§4.4, §8 scenario 5).
fn spawn_bybit_shards(
    roster: &Arc<Roster>,
    region: &Arc<SharedRegion>,
    update_tx: &mpsc::Sender<usize>,
    shutdown: &Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    let symbols = roster.symbols_for(ExchangeId::Bybit);
    let shards = session::shard_for_bybit(&symbols, bybit::MAX_SYMBOLS_PER_CONNECTION);
    info!(shards = shards.len(), "bybit_sharded");

    shards
        .into_iter()
        .map(|shard| {
            let slot_map: Arc<HashMap<String, usize>> =
                Arc::new(shard.iter().map(|(slot, n)| (n.clone(), *slot)).collect());
            let natives: Vec<String> = shard.into_iter().map(|(_, n)| n).collect();
            let config = SessionConfig::from_env("BYBIT");

            tokio::spawn(session::run_session(
                Arc::new(bybit::BybitConnector),
                natives,
                slot_map,
                region.clone(),
                update_tx.clone(),
                shutdown.clone(),
                config,
            ))
        })
        .collect()
}

fn connector_for(exchange: ExchangeId) -> Arc<dyn session::ExchangeConnector> {
    match exchange {
        ExchangeId::Binance => Arc::new(binance::BinanceConnector),
        ExchangeId::Bybit => Arc::new(bybit::BybitConnector),
        ExchangeId::Coinbase => Arc::new(coinbase::CoinbaseConnector),
        ExchangeId::Gateio => Arc::new(gateio::GateioConnector),
        ExchangeId::Htx => Arc::new(htx::HtxConnector),
        ExchangeId::Kucoin => Arc::new(kucoin::KucoinConnector::default()),
        ExchangeId::Mexc => Arc::new(mexc::MexcConnector),
        ExchangeId::Okx => Arc::new(okx::OkxConnector),
    }
}
